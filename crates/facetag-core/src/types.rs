use serde::{Deserialize, Serialize};

use crate::matcher::MatchError;

/// Axis-aligned face rectangle in pixel coordinates of the source image.
///
/// Invariant: `right > left` and `bottom > top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FaceRect {
    /// Build a rectangle, returning `None` for an empty or inverted box.
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Option<Self> {
        (right > left && bottom > top).then_some(Self { left, top, right, bottom })
    }

    /// Round a float `x, y, width, height` box (detector output) to pixels.
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Option<Self> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            return None;
        }
        Self::new(
            x.round() as i32,
            y.round() as i32,
            (x + width).round() as i32,
            (y + height).round() as i32,
        )
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top) as u32
    }
}

/// A face located in an image, plus the landmarks the embedder aligns with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDetection {
    pub rect: FaceRect,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings of the same dimension.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f32, MatchError> {
        if self.values.len() != other.values.len() {
            return Err(MatchError::EmbeddingDimensionMismatch {
                expected: other.values.len(),
                actual: self.values.len(),
            });
        }
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }
}

/// Outcome of matching one query embedding against the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Winning identity, `None` when every gallery entry was rejected.
    pub label: Option<String>,
    /// Distance to the winner, or the threshold itself when rejected.
    pub distance: f32,
}

impl MatchResult {
    pub fn rejected(threshold: f32) -> Self {
        Self { label: None, distance: threshold }
    }

    pub fn is_match(&self) -> bool {
        self.label.is_some()
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("none")
    }
}

/// A query face after detection, embedding and matching.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifiedFace {
    pub detection: FaceDetection,
    #[serde(skip)]
    pub embedding: Embedding,
    pub result: MatchResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_345() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.25, -0.5, 1.0]);
        assert_eq!(a.euclidean_distance(&a.clone()).unwrap(), 0.0);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        match a.euclidean_distance(&b) {
            Err(MatchError::EmbeddingDimensionMismatch { expected, actual }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected dimension mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_face_rect_rejects_degenerate() {
        assert!(FaceRect::new(10, 10, 10, 20).is_none());
        assert!(FaceRect::new(10, 20, 30, 5).is_none());
        let r = FaceRect::new(10, 20, 40, 60).unwrap();
        assert_eq!((r.width(), r.height()), (30, 40));
    }

    #[test]
    fn test_face_rect_from_xywh_rounds() {
        let r = FaceRect::from_xywh(10.4, 19.6, 30.2, 40.0).unwrap();
        assert_eq!(r, FaceRect { left: 10, top: 20, right: 41, bottom: 60 });
        assert!(FaceRect::from_xywh(f32::NAN, 0.0, 1.0, 1.0).is_none());
    }

    #[test]
    fn test_rejected_result_reports_threshold() {
        let r = MatchResult::rejected(0.6);
        assert!(!r.is_match());
        assert_eq!(r.distance, 0.6);
        assert_eq!(r.display_label(), "none");
    }
}
