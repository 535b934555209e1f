//! Maps detections from frame pixels to container pixels for display

use serde::Serialize;
use vigil_core::{BoundingBox, ContainerSize, Detection, FrameSize};

/// Lowest score rendered as high confidence.
pub const HIGH_CONFIDENCE: f32 = 0.8;
/// Lowest score rendered as medium confidence.
pub const MEDIUM_CONFIDENCE: f32 = 0.6;

/// Visual treatment bucket for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f32) -> Self {
        if score >= HIGH_CONFIDENCE {
            ConfidenceTier::High
        } else if score >= MEDIUM_CONFIDENCE {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}

/// Independent per-axis scale; aspect ratio is not preserved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleFactors {
    pub x: f32,
    pub y: f32,
}

impl ScaleFactors {
    /// `None` when the frame has no area.
    pub fn between(frame: FrameSize, container: ContainerSize) -> Option<Self> {
        if frame.is_empty() {
            return None;
        }
        Some(Self {
            x: container.width / frame.width as f32,
            y: container.height / frame.height as f32,
        })
    }

    pub fn apply(&self, bbox: &BoundingBox) -> BoundingBox {
        bbox.scale(self.x, self.y)
    }
}

/// A detection ready to draw over the container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub bbox: BoundingBox,
    pub label: String,
    pub score: f32,
    pub tier: ConfidenceTier,
    /// e.g. `cat (90%)`
    pub caption: String,
}

impl OverlayBox {
    pub fn new(detection: &Detection, scale: &ScaleFactors) -> Self {
        Self {
            bbox: scale.apply(&detection.bbox),
            label: detection.label.clone(),
            score: detection.score,
            tier: ConfidenceTier::from_score(detection.score),
            caption: format!(
                "{} ({}%)",
                detection.label,
                (detection.score * 100.0).round() as u32
            ),
        }
    }
}

/// Rescale every detection into container space.
pub fn map_detections(
    detections: &[Detection],
    frame: FrameSize,
    container: ContainerSize,
) -> Vec<OverlayBox> {
    match ScaleFactors::between(frame, container) {
        Some(scale) => detections.iter().map(|d| OverlayBox::new(d, &scale)).collect(),
        None => Vec::new(),
    }
}
