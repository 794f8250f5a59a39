use anyhow::{bail, Context, Result};
use facetag_core::{OnnxProvider, ProviderConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Run configuration: defaults, then an optional TOML file, then `FACETAG_*`
/// environment variables. Command-line flags are applied last by `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Flat directory of `<label>.<ext>` reference photos.
    pub gallery_dir: PathBuf,
    /// Directory containing the SCRFD and ArcFace ONNX files.
    pub model_dir: PathBuf,
    pub detector_model: String,
    pub recognizer_model: String,
    /// Euclidean distance a match must stay strictly below. Defaults to the
    /// ArcFace operating point of the bundled provider.
    pub threshold: f32,
    pub detector_confidence: f32,
    pub intra_threads: usize,
    /// TTF/OTF font for label text; labels are not drawn without one.
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub outline_color: [u8; 3],
    pub highlight_color: [u8; 3],
}

impl Default for Config {
    fn default() -> Self {
        let provider = ProviderConfig::default();
        Self {
            gallery_dir: PathBuf::from("database"),
            model_dir: provider.model_dir,
            detector_model: provider.detector_model,
            recognizer_model: provider.recognizer_model,
            threshold: OnnxProvider::RECOMMENDED_THRESHOLD,
            detector_confidence: provider.detector_confidence,
            intra_threads: provider.intra_threads,
            font_path: None,
            font_size: 24.0,
            outline_color: [0, 0, 255],
            highlight_color: [255, 0, 0],
        }
    }
}

impl Config {
    /// Load from `file` (or `FACETAG_CONFIG`) and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let env_file = std::env::var_os("FACETAG_CONFIG").map(PathBuf::from);
        let mut config = match file.or(env_file.as_deref()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Override fields from `FACETAG_*` variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACETAG_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETAG_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETAG_FONT_PATH") {
            self.font_path = Some(PathBuf::from(v));
        }
        env_parse(&lookup, "FACETAG_THRESHOLD", &mut self.threshold);
        env_parse(&lookup, "FACETAG_DETECTOR_CONFIDENCE", &mut self.detector_confidence);
        env_parse(&lookup, "FACETAG_INTRA_THREADS", &mut self.intra_threads);
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            bail!("threshold must be a non-negative number, got {}", self.threshold);
        }
        if !(0.0..=1.0).contains(&self.detector_confidence) {
            bail!("detector_confidence must be within [0, 1], got {}", self.detector_confidence);
        }
        if self.intra_threads == 0 {
            bail!("intra_threads must be at least 1");
        }
        Ok(())
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            model_dir: self.model_dir.clone(),
            detector_model: self.detector_model.clone(),
            recognizer_model: self.recognizer_model.clone(),
            intra_threads: self.intra_threads,
            detector_confidence: self.detector_confidence,
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}
