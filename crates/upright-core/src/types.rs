use serde::{Deserialize, Serialize};
use std::fmt;

/// Five-point facial landmarks in image pixel coordinates.
///
/// Ordered as SCRFD emits them: `[eye, eye, nose, mouth corner, mouth corner]`,
/// where index 0 of each pair sits on the image-left of an upright face.
pub type Landmarks = [(f32, f32); 5];

pub const EYE_0: usize = 0;
pub const EYE_1: usize = 1;
pub const NOSE: usize = 2;
pub const MOUTH_0: usize = 3;
pub const MOUTH_1: usize = 4;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub landmarks: Option<Landmarks>,
}

/// One of the four lossless rotations that bring a photo upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Already upright.
    None,
    /// Quarter turn clockwise (+90°).
    Clockwise90,
    /// Quarter turn counter-clockwise (-90°).
    CounterClockwise90,
    /// Half turn (180°).
    Half,
}

impl Rotation {
    /// Signed rotation in degrees: one of `0`, `90`, `-90`, `180`.
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::CounterClockwise90 => -90,
            Rotation::Half => 180,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Output canvas size for composited images. Both sides are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    /// Returns `None` when either side is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_degrees() {
        assert_eq!(Rotation::None.degrees(), 0);
        assert_eq!(Rotation::Clockwise90.degrees(), 90);
        assert_eq!(Rotation::CounterClockwise90.degrees(), -90);
        assert_eq!(Rotation::Half.degrees(), 180);
    }

    #[test]
    fn test_rotation_display() {
        assert_eq!(Rotation::CounterClockwise90.to_string(), "-90°");
    }

    #[test]
    fn test_target_size_rejects_zero() {
        assert!(TargetSize::new(0, 10).is_none());
        assert!(TargetSize::new(10, 0).is_none());
        assert_eq!(
            TargetSize::new(1920, 1080),
            Some(TargetSize { width: 1920, height: 1080 })
        );
    }
}
