//! Reference gallery: one embedding per identity, built from a flat directory
//! of `<label>.<ext>` photos.
//!
//! Entries keep insertion order. [`build_gallery`] inserts in lexicographic
//! file name order, which is the order the matcher breaks ties in.

use crate::matcher::{self, MatchError};
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::types::Embedding;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelError {
    #[error("empty label derived from file name {0:?}")]
    Empty(String),
    #[error("label must not be empty")]
    Blank,
    #[error("file name is not valid UTF-8: {0:?}")]
    NotUtf8(PathBuf),
    #[error("label {0:?} is already enrolled")]
    Duplicate(String),
}

/// Why one reference image did not make it into the gallery.
#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("invalid label: {0}")]
    InvalidLabel(#[from] LabelError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Incompatible(#[from] MatchError),
}

/// Failure that stops the whole build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("cannot list gallery directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("gallery path {0} is not a directory")]
    NotADirectory(PathBuf),
}

#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: GalleryError,
}

/// Gallery plus the reference files that were skipped.
#[derive(Debug)]
pub struct GalleryBuild {
    pub gallery: Gallery,
    pub failures: Vec<FileFailure>,
}

/// Identity label -> reference embedding, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<(String, Embedding)>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identity. Duplicate labels, and embeddings whose dimension or
    /// model version differs from the existing entries, are refused.
    pub fn insert(&mut self, label: String, embedding: Embedding) -> Result<(), GalleryError> {
        if label.is_empty() {
            return Err(LabelError::Blank.into());
        }
        if self.get(&label).is_some() {
            return Err(LabelError::Duplicate(label).into());
        }
        matcher::check_compatible(&embedding, self)?;
        self.entries.push((label, embedding));
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Embedding> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, e)| e)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.entries.iter().map(|(l, e)| (l.as_str(), e))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared embedding dimension, `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|(_, e)| e.dimension())
    }

    /// Model version shared by every entry.
    pub fn model_version(&self) -> Option<&str> {
        self.entries.first().and_then(|(_, e)| e.model_version.as_deref())
    }
}

/// Identity label for a reference file: everything before the first `.`.
pub fn label_from_file_name(name: &str) -> Result<String, LabelError> {
    let stem = name.split('.').next().unwrap_or_default();
    if stem.is_empty() {
        return Err(LabelError::Empty(name.to_string()));
    }
    Ok(stem.to_string())
}

/// Embedding of the single face expected in a reference image.
///
/// When the provider finds several faces the first one (provider order) is
/// used; this is a known precision limitation of one-face-per-file enrollment.
pub fn enroll_image<P: EmbeddingProvider + ?Sized>(
    provider: &mut P,
    image: &RgbImage,
) -> Result<Embedding, GalleryError> {
    let faces = provider.detect_faces(image)?;
    let face = faces.first().ok_or(GalleryError::NoFaceDetected)?;
    if faces.len() > 1 {
        tracing::warn!(
            faces = faces.len(),
            confidence = face.confidence,
            "reference image has several faces; using the first"
        );
    }
    Ok(provider.extract_embedding(image, face)?)
}

/// Build the gallery from every regular file in `directory`.
///
/// Only an unreadable directory is fatal. Each entry that cannot be enrolled,
/// including one the directory walk itself fails on, is reported in
/// [`GalleryBuild::failures`] and the build moves on.
pub fn build_gallery<P: EmbeddingProvider + ?Sized>(
    provider: &mut P,
    directory: &Path,
) -> Result<GalleryBuild, BuildError> {
    if directory.is_file() {
        return Err(BuildError::NotADirectory(directory.to_path_buf()));
    }
    tracing::info!(
        directory = %directory.display(),
        model = provider.model_version(),
        "building gallery"
    );

    let mut gallery = Gallery::new();
    let mut failures = Vec::new();

    // Symlinked reference photos are followed and enrolled like regular files.
    let entries = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 => {
                return Err(BuildError::ReadDir {
                    path: directory.to_path_buf(),
                    source,
                });
            }
            Err(error) => {
                let path = error.path().unwrap_or(directory).to_path_buf();
                tracing::warn!(path = %path.display(), %error, "skipping unreadable gallery entry");
                failures.push(FileFailure {
                    path,
                    error: GalleryError::Io(error.into()),
                });
                continue;
            }
        };

        let path = entry.into_path();
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "skipping non-file gallery entry");
            continue;
        }

        let enrolled = enroll_file(provider, &path, &gallery).and_then(|(label, embedding)| {
            gallery.insert(label.clone(), embedding)?;
            Ok(label)
        });
        match enrolled {
            Ok(label) => {
                tracing::info!(%label, path = %path.display(), "enrolled reference face");
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping reference image");
                failures.push(FileFailure { path, error });
            }
        }
    }

    tracing::info!(
        directory = %directory.display(),
        enrolled = gallery.len(),
        failed = failures.len(),
        "gallery built"
    );

    Ok(GalleryBuild { gallery, failures })
}

fn enroll_file<P: EmbeddingProvider + ?Sized>(
    provider: &mut P,
    path: &Path,
    gallery: &Gallery,
) -> Result<(String, Embedding), GalleryError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LabelError::NotUtf8(path.to_path_buf()))?;
    let label = label_from_file_name(name)?;
    // Checked up front so a colliding file costs no inference.
    if gallery.get(&label).is_some() {
        return Err(LabelError::Duplicate(label).into());
    }

    let bytes = std::fs::read(path)?;
    let image = image::load_from_memory(&bytes)?.to_rgb8();
    let embedding = enroll_image(provider, &image)?;
    Ok((label, embedding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::RecognizerError;
    use crate::types::{FaceDetection, FaceRect};
    use image::Rgb;

    /// Fake provider: the top-left pixel encodes the number of faces (red)
    /// and the embedding is the mean colour of the image.
    struct PixelProvider {
        extract_calls: usize,
        fail_extract: bool,
    }

    impl PixelProvider {
        fn new() -> Self {
            Self { extract_calls: 0, fail_extract: false }
        }
    }

    fn face_at(left: i32) -> FaceDetection {
        FaceDetection {
            rect: FaceRect::new(left, 0, left + 2, 2).unwrap(),
            confidence: 0.9,
            landmarks: None,
        }
    }

    fn expected_embedding(image: &RgbImage) -> Embedding {
        let p = image.get_pixel(1, 1);
        Embedding::new(p.0.iter().map(|&c| c as f32 / 255.0).collect())
            .with_model_version("pixel-test")
    }

    impl EmbeddingProvider for PixelProvider {
        fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>, ProviderError> {
            let count = image.get_pixel(0, 0)[0] as i32;
            Ok((0..count).map(|i| face_at(i * 3)).collect())
        }

        fn extract_embedding(
            &mut self,
            image: &RgbImage,
            _face: &FaceDetection,
        ) -> Result<Embedding, ProviderError> {
            self.extract_calls += 1;
            if self.fail_extract {
                return Err(RecognizerError::NoLandmarks.into());
            }
            Ok(expected_embedding(image))
        }

        fn model_version(&self) -> &str {
            "pixel-test"
        }
    }

    fn reference(faces: u8, color: [u8; 3]) -> RgbImage {
        let mut img = RgbImage::from_pixel(4, 4, Rgb(color));
        img.put_pixel(0, 0, Rgb([faces, 0, 0]));
        img
    }

    fn write(dir: &Path, name: &str, image: &RgbImage) {
        image.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_label_from_file_name() {
        assert_eq!(label_from_file_name("alice.jpg").unwrap(), "alice");
        assert_eq!(label_from_file_name("bob.face.png").unwrap(), "bob");
        assert_eq!(label_from_file_name("carol").unwrap(), "carol");
        assert_eq!(
            label_from_file_name(".hidden.png"),
            Err(LabelError::Empty(".hidden.png".to_string()))
        );
    }

    #[test]
    fn test_gallery_insert_rejects_duplicate_and_mismatch() {
        let mut g = Gallery::new();
        g.insert("alice".into(), Embedding::new(vec![0.0, 1.0])).unwrap();
        assert!(matches!(
            g.insert("alice".into(), Embedding::new(vec![1.0, 0.0])),
            Err(GalleryError::InvalidLabel(LabelError::Duplicate(_)))
        ));
        assert!(matches!(
            g.insert("bob".into(), Embedding::new(vec![1.0, 0.0, 0.0])),
            Err(GalleryError::Incompatible(MatchError::EmbeddingDimensionMismatch { .. }))
        ));
        assert_eq!(g.len(), 1);
        assert_eq!(g.get("alice").unwrap().values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_gallery_insert_rejects_blank_label() {
        let mut g = Gallery::new();
        let err = g.insert(String::new(), Embedding::new(vec![0.0])).unwrap_err();
        assert!(matches!(err, GalleryError::InvalidLabel(LabelError::Blank)));
        assert_eq!(err.to_string(), "invalid label: label must not be empty");
    }

    #[test]
    fn test_gallery_insert_rejects_other_model() {
        let mut g = Gallery::new();
        g.insert("alice".into(), Embedding::new(vec![0.0, 1.0]).with_model_version("w600k_r50"))
            .unwrap();
        let other = Embedding::new(vec![1.0, 0.0]).with_model_version("glintr100");
        assert!(matches!(
            g.insert("bob".into(), other),
            Err(GalleryError::Incompatible(MatchError::ModelVersionMismatch { .. }))
        ));
        assert_eq!(g.model_version(), Some("w600k_r50"));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_build_gallery_two_identities() {
        let dir = tempfile::tempdir().unwrap();
        let alice = reference(1, [200, 10, 10]);
        let bob = reference(1, [10, 200, 10]);
        write(dir.path(), "alice.png", &alice);
        write(dir.path(), "bob.png", &bob);

        let build = build_gallery(&mut PixelProvider::new(), dir.path()).unwrap();
        assert!(build.failures.is_empty(), "{:?}", build.failures);
        assert_eq!(build.gallery.labels().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert_eq!(build.gallery.get("alice"), Some(&expected_embedding(&alice)));
        assert_eq!(build.gallery.get("bob"), Some(&expected_embedding(&bob)));
        assert_eq!(build.gallery.model_version(), Some("pixel-test"));
    }

    #[test]
    fn test_build_gallery_orders_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zed.png", "amy.png", "mia.png"] {
            write(dir.path(), name, &reference(1, [50, 50, 50]));
        }
        let build = build_gallery(&mut PixelProvider::new(), dir.path()).unwrap();
        assert_eq!(build.gallery.labels().collect::<Vec<_>>(), vec!["amy", "mia", "zed"]);
    }

    #[test]
    fn test_build_gallery_skips_faceless_image() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "alice.png", &reference(1, [200, 10, 10]));
        write(dir.path(), "empty.png", &reference(0, [10, 10, 10]));

        let build = build_gallery(&mut PixelProvider::new(), dir.path()).unwrap();
        assert_eq!(build.gallery.labels().collect::<Vec<_>>(), vec!["alice"]);
        assert_eq!(build.failures.len(), 1);
        assert!(build.failures[0].path.ends_with("empty.png"));
        assert!(matches!(build.failures[0].error, GalleryError::NoFaceDetected));
    }

    #[test]
    fn test_build_gallery_reports_label_collision() {
        let dir = tempfile::tempdir().unwrap();
        let first = reference(1, [200, 10, 10]);
        write(dir.path(), "alice.jpg.png", &first);
        write(dir.path(), "alice.png", &reference(1, [10, 10, 200]));

        let mut provider = PixelProvider::new();
        let build = build_gallery(&mut provider, dir.path()).unwrap();
        assert_eq!(build.gallery.len(), 1);
        assert_eq!(build.gallery.get("alice"), Some(&expected_embedding(&first)));
        assert_eq!(build.failures.len(), 1);
        assert!(build.failures[0].path.ends_with("alice.png"));
        assert!(matches!(
            &build.failures[0].error,
            GalleryError::InvalidLabel(LabelError::Duplicate(l)) if l == "alice"
        ));
        assert_eq!(provider.extract_calls, 1);
    }

    #[test]
    fn test_build_gallery_reports_undecodable_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"junk").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write(dir.path(), "bob.png", &reference(1, [10, 200, 10]));

        let build = build_gallery(&mut PixelProvider::new(), dir.path()).unwrap();
        assert_eq!(build.gallery.labels().collect::<Vec<_>>(), vec!["bob"]);
        assert_eq!(build.failures.len(), 2);
        assert!(build.failures.iter().any(|f| matches!(f.error, GalleryError::Decode(_))));
        assert!(build
            .failures
            .iter()
            .any(|f| matches!(f.error, GalleryError::InvalidLabel(LabelError::Empty(_)))));
    }

    #[test]
    fn test_build_gallery_uses_first_of_many_faces() {
        let dir = tempfile::tempdir().unwrap();
        let group = reference(3, [90, 90, 90]);
        write(dir.path(), "group.png", &group);
        let build = build_gallery(&mut PixelProvider::new(), dir.path()).unwrap();
        assert_eq!(build.gallery.get("group"), Some(&expected_embedding(&group)));
    }

    #[test]
    fn test_build_gallery_provider_failure_is_per_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "alice.png", &reference(1, [200, 10, 10]));
        let mut provider = PixelProvider { extract_calls: 0, fail_extract: true };
        let build = build_gallery(&mut provider, dir.path()).unwrap();
        assert!(build.gallery.is_empty());
        assert!(matches!(build.failures[0].error, GalleryError::Provider(_)));
    }

    #[test]
    fn test_build_gallery_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(matches!(
            build_gallery(&mut PixelProvider::new(), &missing),
            Err(BuildError::ReadDir { .. })
        ));
    }

    #[test]
    fn test_build_gallery_rejects_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("alice.png");
        write(dir.path(), "alice.png", &reference(1, [200, 10, 10]));
        assert!(matches!(
            build_gallery(&mut PixelProvider::new(), &file),
            Err(BuildError::NotADirectory(p)) if p == file
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_gallery_broken_entry_is_per_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "alice.png", &reference(1, [200, 10, 10]));
        std::os::unix::fs::symlink(dir.path().join("missing.png"), dir.path().join("bob.png"))
            .unwrap();
        write(dir.path(), "carol.png", &reference(1, [10, 10, 200]));

        let build = build_gallery(&mut PixelProvider::new(), dir.path()).unwrap();
        assert_eq!(build.gallery.labels().collect::<Vec<_>>(), vec!["alice", "carol"]);
        assert_eq!(build.failures.len(), 1);
        assert!(build.failures[0].path.ends_with("bob.png"));
        assert!(matches!(build.failures[0].error, GalleryError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_gallery_follows_symlinked_photo() {
        let dir = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let dana = reference(1, [30, 60, 90]);
        write(elsewhere.path(), "portrait.png", &dana);
        let target = elsewhere.path().join("portrait.png");
        std::os::unix::fs::symlink(target, dir.path().join("dana.png")).unwrap();

        let build = build_gallery(&mut PixelProvider::new(), dir.path()).unwrap();
        assert!(build.failures.is_empty(), "{:?}", build.failures);
        assert_eq!(build.gallery.get("dana"), Some(&expected_embedding(&dana)));
    }

    #[test]
    fn test_build_gallery_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let build = build_gallery(&mut PixelProvider::new(), dir.path()).unwrap();
        assert!(build.gallery.is_empty());
        assert!(build.failures.is_empty());
        assert_eq!(build.gallery.dimension(), None);
    }
}
