use crate::report::{ImageOutcome, ImageStatus, RunReport};
use anyhow::{Context, Result};
use image::{ImageReader, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use upright_core::{classify_orientation, compose_blurred, rotate, LandmarkDetector, Rotation, TargetSize};

/// File extensions picked up from the input folder (compared case-insensitively).
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to read image: {0}")]
    Unreadable(#[source] image::ImageError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detected face has no landmarks")]
    NoLandmarks,
    #[error("detector error: {0}")]
    Detector(#[from] upright_core::DetectorError),
    #[error("compose error: {0}")]
    Compose(#[from] upright_core::ComposeError),
    #[error("failed to save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl ProcessError {
    fn status(&self) -> ImageStatus {
        match self {
            ProcessError::Unreadable(_) => ImageStatus::Unreadable,
            ProcessError::NoFaceDetected | ProcessError::NoLandmarks => ImageStatus::NoFace,
            ProcessError::Detector(_) | ProcessError::Compose(_) | ProcessError::Save { .. } => {
                ImageStatus::Failed
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Composite onto a blurred canvas of this size; plain rotated output when `None`.
    pub target: Option<TargetSize>,
    pub blur_sigma: f32,
}

/// A successfully written image.
struct Processed {
    rotation: Rotation,
    confidence: f32,
    composited: bool,
}

/// Whether `path` has one of the accepted image extensions.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Image files directly inside `dir`, sorted by file name.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading input folder {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("listing input folder {}", dir.display()))?
            .path();
        if path.is_file() && is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Decode by content rather than extension, then flatten to 8-bit RGB.
fn load_rgb(path: &Path) -> Result<RgbImage, image::ImageError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader.decode()?.to_rgb8())
}

/// Rotate every face photo in `input` upright and write it under the same name in `output`.
///
/// Per-image failures are logged and recorded; only folder-level I/O errors abort the run.
pub fn run(
    input: &Path,
    output: &Path,
    detector: &mut dyn LandmarkDetector,
    options: &BatchOptions,
) -> Result<RunReport> {
    fs::create_dir_all(output)
        .with_context(|| format!("creating output folder {}", output.display()))?;

    let images = list_images(input)?;
    tracing::info!(input = %input.display(), count = images.len(), "found images");

    let mut report = RunReport::default();

    for in_path in &images {
        // list_images only yields paths with a file name
        let Some(file_name) = in_path.file_name() else {
            continue;
        };
        let out_path = output.join(file_name);
        let file = file_name.to_string_lossy().into_owned();

        let outcome = match process_image(in_path, &out_path, detector, options) {
            Ok(done) => {
                tracing::info!(
                    path = %out_path.display(),
                    rotation = done.rotation.degrees(),
                    confidence = done.confidence,
                    composited = done.composited,
                    "saved upright image"
                );
                ImageOutcome {
                    file,
                    status: ImageStatus::Saved,
                    rotation: Some(done.rotation.degrees()),
                    confidence: Some(done.confidence),
                    composited: done.composited,
                    error: None,
                }
            }
            Err(err) => {
                let status = err.status();
                match status {
                    ImageStatus::Failed => {
                        tracing::error!(path = %in_path.display(), error = %err, "processing failed")
                    }
                    _ => tracing::warn!(path = %in_path.display(), error = %err, "skipping image"),
                }
                ImageOutcome {
                    file,
                    status,
                    rotation: None,
                    confidence: None,
                    composited: false,
                    error: Some(err.to_string()),
                }
            }
        };
        report.record(outcome);
    }

    let summary = report.summary;
    tracing::info!(
        saved = summary.saved,
        skipped = summary.skipped(),
        failed = summary.failed,
        "batch complete"
    );

    Ok(report)
}

fn process_image(
    in_path: &Path,
    out_path: &Path,
    detector: &mut dyn LandmarkDetector,
    options: &BatchOptions,
) -> Result<Processed, ProcessError> {
    let image = load_rgb(in_path).map_err(ProcessError::Unreadable)?;

    let faces = detector.detect(&image)?;
    let face = faces.first().ok_or(ProcessError::NoFaceDetected)?;
    let landmarks = face.landmarks.as_ref().ok_or(ProcessError::NoLandmarks)?;

    let rotation = classify_orientation(landmarks);
    tracing::debug!(
        path = %in_path.display(),
        faces = faces.len(),
        confidence = face.confidence,
        eye_angle = upright_core::eye_line_angle(landmarks),
        %rotation,
        "orientation classified"
    );

    let rotated = rotate(&image, rotation);
    let (result, composited) = match options.target {
        Some(target) => (compose_blurred(&rotated, target, options.blur_sigma)?, true),
        None => (rotated, false),
    };

    result.save(out_path).map_err(|source| ProcessError::Save {
        path: out_path.to_path_buf(),
        source,
    })?;

    Ok(Processed {
        rotation,
        confidence: face.confidence,
        composited,
    })
}
