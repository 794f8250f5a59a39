//! What to draw for each query face. Pixel rendering lives with the caller.

use crate::types::{FaceDetection, FaceRect, IdentifiedFace, MatchResult};
use serde::Serialize;

/// Vertical gap between a label's anchor and the top edge of its box.
pub const LABEL_OFFSET: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxStyle {
    /// Drawn around every detected face.
    Outline,
    /// Drawn over the outline of a recognised face.
    Highlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DrawInstruction {
    Box { rect: FaceRect, style: BoxStyle },
    Label { text: String, anchor: (i32, i32) },
}

/// Lazy instruction stream returned by [`plan_annotations`].
///
/// Detections and results are paired positionally; extra items on either
/// side are ignored.
pub struct Annotations<'a> {
    pairs: std::iter::Zip<std::slice::Iter<'a, FaceDetection>, std::slice::Iter<'a, MatchResult>>,
    pending: [Option<DrawInstruction>; 2],
}

impl Iterator for Annotations<'_> {
    type Item = DrawInstruction;

    fn next(&mut self) -> Option<DrawInstruction> {
        for slot in self.pending.iter_mut() {
            if let Some(instruction) = slot.take() {
                return Some(instruction);
            }
        }

        let (detection, result) = self.pairs.next()?;
        let rect = detection.rect;
        if let Some(label) = &result.label {
            self.pending = [
                Some(DrawInstruction::Box { rect, style: BoxStyle::Highlight }),
                Some(DrawInstruction::Label {
                    text: label.clone(),
                    anchor: (rect.left, rect.top - LABEL_OFFSET),
                }),
            ];
        }
        Some(DrawInstruction::Box { rect, style: BoxStyle::Outline })
    }
}

/// Plan the drawing for each face, in input order: an outline for every face,
/// then a highlight and a label above the box for recognised ones.
pub fn plan_annotations<'a>(
    detections: &'a [FaceDetection],
    results: &'a [MatchResult],
) -> Annotations<'a> {
    Annotations {
        pairs: detections.iter().zip(results.iter()),
        pending: [None, None],
    }
}

/// [`plan_annotations`] over pipeline output.
pub fn plan_for(faces: &[IdentifiedFace]) -> Vec<DrawInstruction> {
    let (detections, results): (Vec<_>, Vec<_>) = faces
        .iter()
        .map(|f| (f.detection.clone(), f.result.clone()))
        .unzip();
    plan_annotations(&detections, &results).collect()
}
