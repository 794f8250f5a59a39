//! facetag-core — identify enrolled people in a photograph.
//!
//! A gallery of reference embeddings is built from a flat directory of
//! `<label>.<ext>` photos; each face in a query photo is matched to its nearest
//! gallery entry under an exclusive Euclidean distance threshold. Detection
//! (SCRFD) and embedding (ArcFace) run via ONNX Runtime behind the
//! [`EmbeddingProvider`] trait.

pub mod alignment;
pub mod annotate;
pub mod detector;
pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod provider;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use annotate::{plan_annotations, plan_for, BoxStyle, DrawInstruction};
pub use gallery::{build_gallery, BuildError, FileFailure, Gallery, GalleryBuild, GalleryError};
pub use matcher::{EuclideanMatcher, MatchError, Matcher, DEFAULT_THRESHOLD};
pub use pipeline::{recognize, RecognizeError};
pub use provider::{EmbeddingProvider, OnnxProvider, ProviderConfig, ProviderError};
pub use types::{Embedding, FaceDetection, FaceRect, IdentifiedFace, MatchResult};

/// `$XDG_DATA_HOME/facetag/models`, falling back to `~/.local/share/facetag/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facetag")
        .join("models")
}
