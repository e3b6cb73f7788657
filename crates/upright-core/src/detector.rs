//! SCRFD face and landmark detector via ONNX Runtime.
//!
//! Runs the `det_10g` SCRFD model from the InsightFace `buffalo_l` pack with
//! 3-stride anchor-free decoding and NMS post-processing. Every detection
//! carries the five facial keypoints used for orientation inference.

use crate::types::{BoundingBox, Landmarks};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_NUM_OUTPUTS: usize = 9;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download the insightface buffalo_l pack and point --model at det_10g.onnx")]
    ModelNotFound(String),
    #[error("invalid detector config: {0}")]
    InvalidConfig(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Tunables for [`FaceDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Side of the square network input; a positive multiple of 32.
    pub input_size: usize,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
            intra_threads: 2,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), DetectorError> {
        let largest_stride = SCRFD_STRIDES[SCRFD_STRIDES.len() - 1];
        if self.input_size == 0 || self.input_size % largest_stride != 0 {
            return Err(DetectorError::InvalidConfig(format!(
                "input size must be a positive multiple of {largest_stride}, got {}",
                self.input_size
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(DetectorError::InvalidConfig(format!(
                "confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(DetectorError::InvalidConfig(format!(
                "NMS threshold must be within [0, 1], got {}",
                self.nms_threshold
            )));
        }
        if self.intra_threads == 0 {
            return Err(DetectorError::InvalidConfig(
                "intra-op thread count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Anything that finds faces with five-point landmarks in an RGB image.
///
/// Implementations return detections sorted by descending confidence.
pub trait LandmarkDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    fn compute(width: u32, height: u32, input_size: usize) -> (Self, u32, u32) {
        let scale_w = input_size as f32 / width as f32;
        let scale_h = input_size as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = ((width as f32 * scale).round() as u32).clamp(1, input_size as u32);
        let new_h = ((height as f32 * scale).round() as u32).clamp(1, input_size as u32);
        let pad_x = ((input_size as u32 - new_w) / 2) as f32;
        let pad_y = ((input_size as u32 - new_h) / 2) as f32;

        (Self { scale, pad_x, pad_y }, new_w, new_h)
    }

    /// Map a point from network input space back to source image space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor indices for one stride: (score_idx, bbox_idx, kps_idx).
type StrideOutputIndices = (usize, usize, usize);

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    config: DetectorConfig,
    /// Per-stride output indices [(score, bbox, kps)] for strides [8, 16, 32].
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path, config: DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < SCRFD_NUM_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model with landmarks requires {SCRFD_NUM_OUTPUTS} outputs (3 strides × score/bbox/kps), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            config,
            stride_indices,
        })
    }

    /// Letterbox an RGB image into a normalised NCHW tensor.
    ///
    /// Padding stays at 0.0, which is exactly where the mean pixel normalises to.
    fn preprocess(image: &RgbImage, input_size: usize) -> (Array4<f32>, LetterboxInfo) {
        let (letterbox, new_w, new_h) = LetterboxInfo::compute(image.width(), image.height(), input_size);
        let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

        let x0 = letterbox.pad_x as usize;
        let y0 = letterbox.pad_y as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, input_size, input_size));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (tx, ty) = (x0 + x as usize, y0 + y as usize);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (pixel[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (tensor, letterbox)
    }
}

impl LandmarkDetector for FaceDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let input_size = self.config.input_size;
        let (input, letterbox) = Self::preprocess(image, input_size);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut all_detections = Vec::new();

        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            let grid = StrideGrid { stride, input_size };
            all_detections.extend(decode_stride(
                scores,
                bboxes,
                kps,
                grid,
                &letterbox,
                self.config.confidence_threshold,
            ));
        }

        let result = nms(all_detections, self.config.nms_threshold);
        tracing::trace!(faces = result.len(), "SCRFD detections after NMS");
        Ok(result)
    }
}

/// Discover output tensor ordering by name.
///
/// SCRFD exports either name their tensors ("score_8", "bbox_16", "kps_32", ...)
/// or use generic numeric names. Falls back to the standard positional ordering:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
///   [6-8] = kps    (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?, find("kps", stride)?)))
        .collect();

    match named {
        Some(v) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [v[0], v[1], v[2]]
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes, [6-8]=kps"
            );
            [(0, 3, 6), (1, 4, 7), (2, 5, 8)]
        }
    }
}

/// Anchor grid geometry for one stride level.
#[derive(Debug, Clone, Copy)]
struct StrideGrid {
    stride: usize,
    input_size: usize,
}

/// Decode detections for a single stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    kps: &[f32],
    grid: StrideGrid,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<BoundingBox> {
    let cells = grid.input_size / grid.stride;
    let num_anchors = cells * cells * SCRFD_ANCHORS_PER_CELL;
    let stride = grid.stride as f32;

    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score < threshold {
            continue;
        }

        let anchor_idx = idx / SCRFD_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % cells) as f32 * stride;
        let anchor_cy = (anchor_idx / cells) as f32 * stride;

        // Distances to [left, top, right, bottom] in stride units
        let Some(dist) = bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };
        let (x1, y1) = letterbox.unmap(anchor_cx - dist[0] * stride, anchor_cy - dist[1] * stride);
        let (x2, y2) = letterbox.unmap(anchor_cx + dist[2] * stride, anchor_cy + dist[3] * stride);

        let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|offsets| {
            let mut lms: Landmarks = [(0.0, 0.0); 5];
            for (i, lm) in lms.iter_mut().enumerate() {
                *lm = letterbox.unmap(
                    anchor_cx + offsets[i * 2] * stride,
                    anchor_cy + offsets[i * 2 + 1] * stride,
                );
            }
            lms
        });

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }

    detections
}

/// Non-Maximum Suppression: keep the most confident of each overlapping cluster.
///
/// Output is sorted by descending confidence.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BoundingBox> = Vec::new();
    for det in detections {
        if keep.iter().all(|kept| iou(kept, &det) <= iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

/// Compute Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: conf, landmarks: None,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_bbox(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial() {
        let a = make_bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_bbox(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap: 5x10 = 50, union: 100+100-50 = 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping_and_sorts() {
        let detections = vec![
            make_bbox(200.0, 200.0, 50.0, 50.0, 0.7),
            make_bbox(5.0, 5.0, 100.0, 100.0, 0.8),
            make_bbox(0.0, 0.0, 100.0, 100.0, 0.9),
        ];
        let result = nms(detections, 0.4);
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_landscape_pads_vertically() {
        let (lb, new_w, new_h) = LetterboxInfo::compute(1280, 720, 640);
        assert_eq!((new_w, new_h), (640, 360));
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);
        assert!((lb.scale - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let (lb, _, _) = LetterboxInfo::compute(320, 240, 640);
        let (ox, oy) = (100.0f32, 50.0f32);
        let (rx, ry) = lb.unmap(ox * lb.scale + lb.pad_x, oy * lb.scale + lb.pad_y);
        assert!((rx - ox).abs() < 0.1, "x: {rx} vs {ox}");
        assert!((ry - oy).abs() < 0.1, "y: {ry} vs {oy}");
    }

    #[test]
    fn test_letterbox_extreme_aspect_keeps_one_pixel() {
        let (_, new_w, new_h) = LetterboxInfo::compute(10_000, 1, 640);
        assert_eq!((new_w, new_h), (640, 1));
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let image = RgbImage::from_pixel(64, 32, image::Rgb([255, 0, 128]));
        let (tensor, lb) = FaceDetector::preprocess(&image, 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(lb.pad_y, 16.0);

        // Padding rows normalise to zero
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        // Image rows carry the RGB channels in order
        let r = tensor[[0, 0, 32, 32]];
        let g = tensor[[0, 1, 32, 32]];
        assert!((r - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-6);
        assert!((g - (0.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stride_maps_anchor_and_landmarks() {
        // 64px input, stride 32: a 2x2 grid with 2 anchors per cell = 8 anchors.
        let grid = StrideGrid { stride: 32, input_size: 64 };
        let lb = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };

        let mut scores = vec![0.0f32; 8];
        scores[3] = 0.9; // anchor 3 -> cell 1 -> (cx=32, cy=0)
        let mut bboxes = vec![0.0f32; 32];
        bboxes[12..16].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);
        let mut kps = vec![0.0f32; 80];
        kps[30..40].copy_from_slice(&[-0.25, 0.25, 0.25, 0.25, 0.0, 0.5, -0.25, 0.75, 0.25, 0.75]);

        let dets = decode_stride(&scores, &bboxes, &kps, grid, &lb, 0.5);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!((d.x, d.y, d.width, d.height), (16.0, 0.0, 32.0, 32.0));
        let lms = d.landmarks.unwrap();
        assert_eq!(lms[0], (24.0, 8.0));
        assert_eq!(lms[1], (40.0, 8.0));
        assert_eq!(lms[2], (32.0, 16.0));
    }

    #[test]
    fn test_decode_stride_missing_kps_yields_no_landmarks() {
        let grid = StrideGrid { stride: 32, input_size: 64 };
        let lb = LetterboxInfo { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let scores = vec![0.9f32; 8];
        let bboxes = vec![0.5f32; 32];
        let dets = decode_stride(&scores, &bboxes, &[], grid, &lb, 0.5);
        assert_eq!(dets.len(), 8);
        assert!(dets.iter().all(|d| d.landmarks.is_none()));
    }

    #[test]
    fn test_discover_output_indices_named() {
        let names: Vec<String> = [
            "score_8", "score_16", "score_32",
            "bbox_8",  "bbox_16",  "bbox_32",
            "kps_8",   "kps_16",   "kps_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_discover_output_indices_shuffled_named() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ].iter().map(|s| s.to_string()).collect();

        assert_eq!(discover_output_indices(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let names: Vec<String> = (0..9).map(|i: usize| (448 + i).to_string()).collect();
        assert_eq!(discover_output_indices(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_config_validation() {
        assert!(DetectorConfig::default().validate().is_ok());
        let bad_size = DetectorConfig { input_size: 100, ..Default::default() };
        assert!(matches!(bad_size.validate(), Err(DetectorError::InvalidConfig(_))));
        let bad_threshold = DetectorConfig { confidence_threshold: 1.5, ..Default::default() };
        assert!(bad_threshold.validate().is_err());
        let no_threads = DetectorConfig { intra_threads: 0, ..Default::default() };
        assert!(no_threads.validate().is_err());
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceDetector::load(Path::new("/nonexistent/det_10g.onnx"), DetectorConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
    }
}
