//! upright-core: face-driven orientation correction.
//!
//! Uses SCRFD for five-point facial landmark detection via ONNX Runtime,
//! infers the upright orientation from landmark geometry, and fits the
//! corrected image onto a blurred-background canvas.

pub mod compose;
pub mod detector;
pub mod orientation;
pub mod types;

use std::path::PathBuf;

pub use compose::{compose_blurred, cover_background, fit_to_size, ComposeError, FitMode};
pub use detector::{DetectorConfig, DetectorError, FaceDetector, LandmarkDetector};
pub use orientation::{classify_orientation, eye_line_angle, rotate};
pub use types::{BoundingBox, Landmarks, Rotation, TargetSize};

/// File name of the SCRFD detector inside the InsightFace `buffalo_l` pack.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// Directory where InsightFace unpacks `buffalo_l` (`~/.insightface/models/buffalo_l`).
pub fn default_model_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".insightface/models/buffalo_l")
}
