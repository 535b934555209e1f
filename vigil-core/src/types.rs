//! Detection data model

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest confidence threshold the settings accept.
pub const THRESHOLD_MIN: f32 = 0.1;
/// Highest confidence threshold the settings accept.
pub const THRESHOLD_MAX: f32 = 1.0;
/// Slider granularity for the confidence threshold.
pub const THRESHOLD_STEP: f32 = 0.05;
/// Fewest detections a single inference may request.
pub const MAX_DETECTIONS_MIN: u32 = 1;
/// Most detections a single inference may request.
pub const MAX_DETECTIONS_MAX: u32 = 20;

/// Axis-aligned rectangle in pixel units: origin plus extent.
///
/// Serialized as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Multiply origin and extent per axis.
    pub fn scale(&self, scale_x: f32, scale_y: f32) -> Self {
        Self {
            x: self.x * scale_x,
            y: self.y * scale_y,
            width: self.width * scale_x,
            height: self.height * scale_y,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// One detected object, in source-frame pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    #[serde(rename = "class", alias = "label")]
    pub label: String,
    pub score: f32,
}

impl Detection {
    /// Build a detection, clamping the score into `[0, 1]`.
    ///
    /// A non-finite score becomes 0.
    pub fn new(bbox: BoundingBox, label: impl Into<String>, score: f32) -> Self {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            bbox,
            label: label.into(),
            score,
        }
    }
}

/// User-tunable inference settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Whether the live feed is requested.
    pub active: bool,
    /// Inclusive lower bound on kept scores.
    pub confidence_threshold: f32,
    /// Upper bound on detections requested from the model per call.
    pub max_detections: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            active: false,
            confidence_threshold: 0.5,
            max_detections: 10,
        }
    }
}

impl DetectionSettings {
    /// Check the settings against the slider ranges.
    pub fn validate(&self) -> Result<()> {
        let t = self.confidence_threshold;
        if !t.is_finite() || !(THRESHOLD_MIN..=THRESHOLD_MAX).contains(&t) {
            return Err(Error::InvalidSettings(format!(
                "confidence threshold must be between {} and {}, got {}",
                THRESHOLD_MIN, THRESHOLD_MAX, t
            )));
        }

        if !(MAX_DETECTIONS_MIN..=MAX_DETECTIONS_MAX).contains(&self.max_detections) {
            return Err(Error::InvalidSettings(format!(
                "max detections must be between {} and {}, got {}",
                MAX_DETECTIONS_MIN, MAX_DETECTIONS_MAX, self.max_detections
            )));
        }

        Ok(())
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_max_detections(mut self, max: u32) -> Self {
        self.max_detections = max;
        self
    }
}

/// Which frame source feeds detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Live camera feed with a polling loop
    #[default]
    Webcam,
    /// Uploaded still image, one inference per selection
    Image,
}

impl fmt::Display for DetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMode::Webcam => write!(f, "webcam"),
            DetectionMode::Image => write!(f, "image"),
        }
    }
}

impl FromStr for DetectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webcam" | "camera" => Ok(DetectionMode::Webcam),
            "image" => Ok(DetectionMode::Image),
            other => Err(Error::UnknownMode(other.to_string())),
        }
    }
}

/// Pixel dimensions of a source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// On-screen size that boxes are rescaled into.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerSize {
    pub width: f32,
    pub height: f32,
}

impl ContainerSize {
    pub fn new(width: f32, height: f32) -> Result<Self> {
        if !width.is_finite() || !height.is_finite() || width < 0.0 || height < 0.0 {
            return Err(Error::InvalidDimensions(format!(
                "container size must be finite and non-negative, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl From<FrameSize> for ContainerSize {
    fn from(size: FrameSize) -> Self {
        Self {
            width: size.width as f32,
            height: size.height as f32,
        }
    }
}
