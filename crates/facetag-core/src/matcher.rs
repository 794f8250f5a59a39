//! Nearest-neighbour identification with a rejection threshold.

use crate::gallery::Gallery;
use crate::types::{Embedding, MatchResult};
use thiserror::Error;

/// Default Euclidean distance below which a gallery entry counts as a match.
///
/// Providers calibrate their own operating point; see
/// [`OnnxProvider::RECOMMENDED_THRESHOLD`](crate::OnnxProvider::RECOMMENDED_THRESHOLD).
pub const DEFAULT_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },
    #[error("embedding model mismatch: expected {expected:?}, got {actual:?}")]
    ModelVersionMismatch {
        expected: Option<String>,
        actual: Option<String>,
    },
}

/// Fails unless `probe` comes from the same model as the gallery entries.
pub(crate) fn check_compatible(probe: &Embedding, gallery: &Gallery) -> Result<(), MatchError> {
    let Some((_, reference)) = gallery.iter().next() else {
        return Ok(());
    };
    if probe.dimension() != reference.dimension() {
        return Err(MatchError::EmbeddingDimensionMismatch {
            expected: reference.dimension(),
            actual: probe.dimension(),
        });
    }
    if probe.model_version != reference.model_version {
        return Err(MatchError::ModelVersionMismatch {
            expected: reference.model_version.clone(),
            actual: probe.model_version.clone(),
        });
    }
    Ok(())
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        threshold: f32,
    ) -> Result<MatchResult, MatchError>;
}

/// Euclidean nearest-neighbour matcher.
///
/// The search starts from a virtual `(threshold, none)` candidate and only
/// replaces the running best on a strictly smaller distance. Consequently a
/// distance equal to the threshold is rejected, and among equal distances the
/// entry that comes first in gallery order wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &Gallery,
        threshold: f32,
    ) -> Result<MatchResult, MatchError> {
        check_compatible(probe, gallery)?;

        let mut best_distance = threshold;
        let mut best_label: Option<&str> = None;

        for (label, reference) in gallery.iter() {
            let distance = probe.euclidean_distance(reference)?;
            if distance < best_distance {
                best_distance = distance;
                best_label = Some(label);
            }
        }

        tracing::debug!(
            label = best_label.unwrap_or("none"),
            distance = best_distance,
            threshold,
            candidates = gallery.len(),
            "match decided"
        );

        Ok(MatchResult {
            label: best_label.map(str::to_string),
            distance: best_distance,
        })
    }
}
