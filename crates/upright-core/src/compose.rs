//! Blurred-canvas compositing.
//!
//! The background is the photo scaled to *cover* the canvas, centre-cropped
//! and Gaussian-blurred. The foreground is the same photo scaled to be
//! *contained* by the canvas, pasted sharp in the centre.

use crate::types::TargetSize;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Blur sigma applied to the cover background unless overridden.
pub const DEFAULT_BLUR_SIGMA: f32 = 10.0;

const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("source image is empty ({width}x{height})")]
    EmptySource { width: u32, height: u32 },
    #[error("blur sigma must be finite and non-negative, got {0}")]
    InvalidBlur(f32),
}

/// How a foreground is fitted into the target canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Scale uniformly to fit inside the canvas; never crops.
    #[default]
    Contain,
    /// Resize to exactly the canvas size, ignoring aspect ratio.
    Stretch,
}

fn check_source(image: &RgbImage) -> Result<(), ComposeError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ComposeError::EmptySource { width, height });
    }
    Ok(())
}

/// Source-space rectangle `(left, top, width, height)` that covers `target`
/// once scaled by `max(tw/sw, th/sh)`.
///
/// Centred and clamped to the source, so only the visible region is ever resized.
fn cover_crop(src: (u32, u32), target: TargetSize) -> (u32, u32, u32, u32) {
    let scale_x = target.width as f64 / src.0 as f64;
    let scale_y = target.height as f64 / src.1 as f64;
    let scale = scale_x.max(scale_y);

    let w = ((target.width as f64 / scale).round() as u32).clamp(1, src.0);
    let h = ((target.height as f64 / scale).round() as u32).clamp(1, src.1);
    ((src.0 - w) / 2, (src.1 - h) / 2, w, h)
}

/// Dimensions of `src` scaled by `min(tw/sw, th/sh)`, within the target and at least 1px.
fn contain_dimensions(src: (u32, u32), target: TargetSize) -> (u32, u32) {
    let scale_x = target.width as f64 / src.0 as f64;
    let scale_y = target.height as f64 / src.1 as f64;
    let scale = scale_x.min(scale_y);

    let w = (src.0 as f64 * scale).round() as u32;
    let h = (src.1 as f64 * scale).round() as u32;
    (w.clamp(1, target.width), h.clamp(1, target.height))
}

fn resize_to(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if (width, height) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, width, height, RESIZE_FILTER)
}

/// Scale to cover `target`, centre-crop to exactly `target`, then blur.
pub fn cover_background(
    image: &RgbImage,
    target: TargetSize,
    blur_sigma: f32,
) -> Result<RgbImage, ComposeError> {
    check_source(image)?;
    if !blur_sigma.is_finite() || blur_sigma < 0.0 {
        return Err(ComposeError::InvalidBlur(blur_sigma));
    }

    let (left, top, w, h) = cover_crop(image.dimensions(), target);
    let region = imageops::crop_imm(image, left, top, w, h).to_image();
    let covered = resize_to(&region, target.width, target.height);

    if blur_sigma == 0.0 {
        return Ok(covered);
    }
    Ok(imageops::blur(&covered, blur_sigma))
}

/// Fit `image` into `target` according to `mode`.
pub fn fit_to_size(
    image: &RgbImage,
    target: TargetSize,
    mode: FitMode,
) -> Result<RgbImage, ComposeError> {
    check_source(image)?;

    let (new_w, new_h) = match mode {
        FitMode::Contain => contain_dimensions(image.dimensions(), target),
        FitMode::Stretch => (target.width, target.height),
    };

    Ok(resize_to(image, new_w, new_h))
}

/// Composite a sharp contained foreground over a blurred cover background.
///
/// The result is always exactly `target` in size.
pub fn compose_blurred(
    image: &RgbImage,
    target: TargetSize,
    blur_sigma: f32,
) -> Result<RgbImage, ComposeError> {
    tracing::debug!(
        source = ?image.dimensions(),
        canvas = %target,
        blur_sigma,
        "composing blurred canvas"
    );

    let mut canvas = cover_background(image, target, blur_sigma)?;
    let foreground = fit_to_size(image, target, FitMode::Contain)?;

    let fg_x = (target.width - foreground.width()) / 2;
    let fg_y = (target.height - foreground.height()) / 2;
    imageops::replace(&mut canvas, &foreground, fg_x as i64, fg_y as i64);

    tracing::debug!(
        foreground = ?foreground.dimensions(),
        offset = ?(fg_x, fg_y),
        "foreground centred"
    );

    Ok(canvas)
}
