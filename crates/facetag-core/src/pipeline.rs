use crate::gallery::Gallery;
use crate::matcher::{MatchError, Matcher};
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::types::IdentifiedFace;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("no face detected in query image")]
    NoFaceDetected,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// Detect every face in `image`, embed it and match it against `gallery`.
///
/// Faces come back in detection order.
pub fn recognize<P, M>(
    provider: &mut P,
    image: &RgbImage,
    gallery: &Gallery,
    matcher: &M,
    threshold: f32,
) -> Result<Vec<IdentifiedFace>, RecognizeError>
where
    P: EmbeddingProvider + ?Sized,
    M: Matcher + ?Sized,
{
    let detections = provider.detect_faces(image)?;
    if detections.is_empty() {
        return Err(RecognizeError::NoFaceDetected);
    }
    tracing::info!(faces = detections.len(), "query faces detected");

    detections
        .into_iter()
        .map(|detection| -> Result<IdentifiedFace, RecognizeError> {
            let embedding = provider.extract_embedding(image, &detection)?;
            let result = matcher.compare(&embedding, gallery, threshold)?;
            tracing::info!(
                label = result.display_label(),
                distance = result.distance,
                left = detection.rect.left,
                top = detection.rect.top,
                "query face matched"
            );
            Ok(IdentifiedFace { detection, embedding, result })
        })
        .collect()
}
