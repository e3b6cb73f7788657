//! Orientation inference from five-point landmarks, and the matching rotation.
//!
//! The eye line of an upright face is roughly horizontal with the eyes above
//! the nose and mouth. Its angle tells which quarter turn the photo needs.

use crate::types::{Landmarks, Rotation, EYE_0, EYE_1, MOUTH_0, MOUTH_1, NOSE};
use image::{imageops, RgbImage};

const NEAR_HORIZONTAL_DEG: f32 = 45.0;
const NEAR_VERTICAL_MAX_DEG: f32 = 135.0;

/// Angle of the line from eye 0 to eye 1, in degrees within [-180, 180].
///
/// Image Y grows downward, so a positive angle means eye 1 is lower.
pub fn eye_line_angle(landmarks: &Landmarks) -> f32 {
    let (x0, y0) = landmarks[EYE_0];
    let (x1, y1) = landmarks[EYE_1];
    (y1 - y0).atan2(x1 - x0).to_degrees()
}

/// Pick the rotation that brings the face described by `landmarks` upright.
///
/// Non-finite landmarks fall through every range check and yield a half turn.
pub fn classify_orientation(landmarks: &Landmarks) -> Rotation {
    let angle = eye_line_angle(landmarks);

    if angle.abs() < NEAR_HORIZONTAL_DEG {
        let eye_y = (landmarks[EYE_0].1 + landmarks[EYE_1].1) / 2.0;
        let mouth_y = (landmarks[MOUTH_0].1 + landmarks[MOUTH_1].1) / 2.0;
        let nose_y = landmarks[NOSE].1;

        if eye_y < mouth_y && eye_y < nose_y {
            Rotation::None
        } else {
            Rotation::Half
        }
    } else if (NEAR_HORIZONTAL_DEG..=NEAR_VERTICAL_MAX_DEG).contains(&angle) {
        // Eye line points down the image: face lies on its side, rotated left.
        Rotation::CounterClockwise90
    } else if (-NEAR_VERTICAL_MAX_DEG..=-NEAR_HORIZONTAL_DEG).contains(&angle) {
        Rotation::Clockwise90
    } else {
        Rotation::Half
    }
}

/// Apply one of the four lossless rotations.
pub fn rotate(image: &RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::None => image.clone(),
        Rotation::Clockwise90 => imageops::rotate90(image),
        Rotation::CounterClockwise90 => imageops::rotate270(image),
        Rotation::Half => imageops::rotate180(image),
    }
}
