use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use upright_core::{FaceDetector, TargetSize};

mod batch;
mod config;
mod report;

use config::Config;

#[derive(Parser)]
#[command(
    name = "upright",
    version,
    about = "Rotate face photos upright, optionally onto a blurred canvas"
)]
struct Cli {
    /// Folder containing .jpg/.jpeg/.png photos
    input_folder: PathBuf,

    /// Folder that receives the corrected photos (created if missing)
    output_folder: PathBuf,

    /// Canvas width; composites each photo over a blurred copy of itself
    #[arg(requires = "height", value_parser = clap::value_parser!(u32).range(1..))]
    width: Option<u32>,

    /// Canvas height
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    height: Option<u32>,

    /// SCRFD model file (default: $UPRIGHT_MODEL_DIR/det_10g.onnx)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Gaussian blur sigma for the canvas background
    #[arg(long, value_name = "SIGMA")]
    blur_radius: Option<f32>,

    /// Square detector input size, a multiple of 32
    #[arg(long, value_name = "N")]
    det_size: Option<usize>,

    /// Minimum face detection confidence
    #[arg(long)]
    threshold: Option<f32>,

    /// Write a JSON report of every processed file
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

impl Cli {
    fn apply_to(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model_path = Some(model.clone());
        }
        if let Some(sigma) = self.blur_radius {
            config.blur_sigma = sigma;
        }
        if let Some(size) = self.det_size {
            config.detector.input_size = size;
        }
        if let Some(threshold) = self.threshold {
            config.detector.confidence_threshold = threshold;
        }
    }

    fn target_size(&self) -> Option<TargetSize> {
        TargetSize::new(self.width?, self.height?)
    }
}

/// Blur only matters when compositing; reject bad values before any image is touched.
fn validate_blur(sigma: f32) -> Result<()> {
    anyhow::ensure!(
        sigma.is_finite() && sigma >= 0.0,
        "blur radius must be a non-negative number, got {sigma}"
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply_to(&mut config);

    let target = cli.target_size();
    if target.is_some() {
        validate_blur(config.blur_sigma)?;
    }
    tracing::info!(
        input = %cli.input_folder.display(),
        output = %cli.output_folder.display(),
        canvas = ?target.map(|t| t.to_string()),
        "rotating faces"
    );
    if target.is_some() {
        tracing::info!(blur_sigma = config.blur_sigma, "creating composite images with blurred backgrounds");
    }

    let model_path = config.scrfd_model_path();
    let mut detector = FaceDetector::load(&model_path, config.detector)
        .with_context(|| format!("loading face detector from {}", model_path.display()))?;

    let options = batch::BatchOptions {
        target,
        blur_sigma: config.blur_sigma,
    };
    let report = batch::run(&cli.input_folder, &cli.output_folder, &mut detector, &options)?;

    if let Some(path) = &cli.report {
        report.write_json(path)?;
        tracing::info!(path = %path.display(), "wrote run report");
    }

    Ok(())
}
