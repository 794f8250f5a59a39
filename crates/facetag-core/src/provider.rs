//! Detection + embedding seam, and the ONNX-backed implementation.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, FaceDetection};
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_DETECTOR_MODEL: &str = "det_10g.onnx";
const DEFAULT_RECOGNIZER_MODEL: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Locates faces in an image and turns one face into a comparable embedding.
///
/// Gallery and query embeddings are only comparable when they come from the
/// same provider configuration.
pub trait EmbeddingProvider {
    /// Detected faces in provider-defined order.
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>, ProviderError>;

    fn extract_embedding(
        &mut self,
        image: &RgbImage,
        face: &FaceDetection,
    ) -> Result<Embedding, ProviderError>;

    fn model_version(&self) -> &str;
}

/// Model locations and runtime knobs for [`OnnxProvider`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub model_dir: PathBuf,
    pub detector_model: String,
    pub recognizer_model: String,
    pub intra_threads: usize,
    /// Minimum SCRFD score for a detection to be kept.
    pub detector_confidence: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model_dir: crate::default_model_dir(),
            detector_model: DEFAULT_DETECTOR_MODEL.to_string(),
            recognizer_model: DEFAULT_RECOGNIZER_MODEL.to_string(),
            intra_threads: 2,
            detector_confidence: crate::detector::DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ProviderConfig {
    pub fn detector_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    pub fn recognizer_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_model)
    }
}

/// SCRFD detection + ArcFace embedding, loaded once per run.
pub struct OnnxProvider {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxProvider {
    /// Euclidean operating point for L2-normalized ArcFace embeddings.
    ///
    /// Equal to cosine similarity 0.40, since `d = sqrt(2 - 2 * cos)` on the
    /// unit sphere.
    pub const RECOMMENDED_THRESHOLD: f32 = 1.095;

    pub fn load(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let detector = FaceDetector::load(
            &config.detector_path(),
            config.intra_threads,
            config.detector_confidence,
        )?;
        let recognizer = FaceRecognizer::load(&config.recognizer_path(), config.intra_threads)?;
        Ok(Self { detector, recognizer })
    }
}

impl EmbeddingProvider for OnnxProvider {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>, ProviderError> {
        Ok(self.detector.detect(image)?)
    }

    fn extract_embedding(
        &mut self,
        image: &RgbImage,
        face: &FaceDetection,
    ) -> Result<Embedding, ProviderError> {
        Ok(self.recognizer.extract(image, face)?)
    }

    fn model_version(&self) -> &str {
        self.recognizer.model_version()
    }
}
