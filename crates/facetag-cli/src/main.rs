use anyhow::{Context, Result};
use clap::Parser;
use facetag_core::{
    build_gallery, plan_for, recognize, EuclideanMatcher, GalleryBuild, IdentifiedFace,
    OnnxProvider,
};
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::Config;
use render::Renderer;

#[derive(Parser)]
#[command(name = "facetag", about = "Identify enrolled people in a photo", version)]
struct Cli {
    /// Photo to identify faces in
    image: PathBuf,
    /// Directory of `<label>.<ext>` reference photos, one face each
    #[arg(short, long)]
    gallery: Option<PathBuf>,
    /// Maximum (exclusive) embedding distance for a match
    #[arg(short, long)]
    threshold: Option<f32>,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long)]
    models: Option<PathBuf>,
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Where to write the annotated photo [default: <image stem>.annotated.png]
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
    /// Exit without waiting for Enter
    #[arg(long)]
    no_wait: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    image: &'a Path,
    output: &'a Path,
    enrolled: Vec<&'a str>,
    gallery_failures: Vec<GalleryFailureSummary>,
    faces: &'a [IdentifiedFace],
}

#[derive(Serialize)]
struct GalleryFailureSummary {
    path: PathBuf,
    error: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    config.validate()?;

    let renderer = Renderer::from_config(&config)?;
    let mut provider = OnnxProvider::load(&config.provider_config())
        .context("loading face detection and recognition models")?;

    let build = build_gallery(&mut provider, &config.gallery_dir)?;
    for failure in &build.failures {
        tracing::warn!(
            path = %failure.path.display(),
            error = %failure.error,
            "reference image not enrolled"
        );
    }
    if build.gallery.is_empty() {
        tracing::warn!(
            dir = %config.gallery_dir.display(),
            "gallery is empty; every face will be unmatched"
        );
    }

    let mut image = image::open(&cli.image)
        .with_context(|| format!("opening {}", cli.image.display()))?
        .to_rgb8();

    let faces = recognize(
        &mut provider,
        &image,
        &build.gallery,
        &EuclideanMatcher,
        config.threshold,
    )
    .with_context(|| format!("identifying faces in {}", cli.image.display()))?;

    let skipped_labels = renderer.render(&mut image, plan_for(&faces));
    if skipped_labels > 0 {
        tracing::warn!(
            skipped_labels,
            "no font configured (font_path / FACETAG_FONT_PATH); labels not drawn"
        );
    }

    let output = cli.output.clone().unwrap_or_else(|| default_output_path(&cli.image));
    image
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;

    print_summary(&cli, &output, &build, &faces)?;

    if !cli.no_wait {
        wait_for_enter()?;
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    apply_flags(cli, &mut config);
    Ok(config)
}

/// Command-line flags win over every other configuration layer.
fn apply_flags(cli: &Cli, config: &mut Config) {
    if let Some(dir) = &cli.gallery {
        config.gallery_dir = dir.clone();
    }
    if let Some(dir) = &cli.models {
        config.model_dir = dir.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
}

/// `photos/party.jpg` -> `photos/party.annotated.png`
fn default_output_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    image.with_file_name(format!("{stem}.annotated.png"))
}

fn print_summary(
    cli: &Cli,
    output: &Path,
    build: &GalleryBuild,
    faces: &[IdentifiedFace],
) -> Result<()> {
    if cli.json {
        let summary = Summary {
            image: &cli.image,
            output,
            enrolled: build.gallery.labels().collect(),
            gallery_failures: build
                .failures
                .iter()
                .map(|f| GalleryFailureSummary {
                    path: f.path.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
            faces,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{} face(s) in {} ({} enrolled identities)",
        faces.len(),
        cli.image.display(),
        build.gallery.len()
    );
    for (i, face) in faces.iter().enumerate() {
        let r = face.detection.rect;
        println!(
            "  #{i}: [{}, {}, {}, {}] -> {} (distance {:.4})",
            r.left,
            r.top,
            r.right,
            r.bottom,
            face.result.display_label(),
            face.result.distance
        );
    }
    println!("annotated image written to {}", output.display());
    Ok(())
}

fn wait_for_enter() -> Result<()> {
    println!("\nPress Enter to continue");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_requires_exactly_one_image() {
        assert!(Cli::try_parse_from(["facetag"]).is_err());
        assert!(Cli::try_parse_from(["facetag", "a.jpg", "b.jpg"]).is_err());
        let cli = Cli::try_parse_from(["facetag", "a.jpg"]).unwrap();
        assert_eq!(cli.image, PathBuf::from("a.jpg"));
        assert!(!cli.no_wait);
    }

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::try_parse_from([
            "facetag", "q.jpg", "--gallery", "/faces", "--threshold", "0.4", "--models", "/m",
        ])
        .unwrap();
        let mut config = Config::default();
        config.apply_env(|key: &str| (key == "FACETAG_GALLERY_DIR").then(|| "/env".to_string()));
        apply_flags(&cli, &mut config);
        assert_eq!(config.gallery_dir, PathBuf::from("/faces"));
        assert_eq!(config.model_dir, PathBuf::from("/m"));
        assert_eq!(config.threshold, 0.4);
    }

    #[test]
    fn test_cli_without_flags_keeps_config() {
        let cli = Cli::try_parse_from(["facetag", "q.jpg"]).unwrap();
        let mut config = Config::default();
        config.apply_env(|_: &str| None);
        apply_flags(&cli, &mut config);
        let defaults = Config::default();
        assert_eq!(config.gallery_dir, defaults.gallery_dir);
        assert_eq!(config.threshold, defaults.threshold);
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("photos/party.jpg")),
            PathBuf::from("photos/party.annotated.png")
        );
        assert_eq!(default_output_path(Path::new("me.png")), PathBuf::from("me.annotated.png"));
    }
}
