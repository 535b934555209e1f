//! Confidence filtering of raw model output

use vigil_core::{Detection, DetectionSettings};

/// Keep detections scoring at or above the threshold.
///
/// Order is preserved. The result never exceeds `settings.max_detections`.
pub fn filter_detections(raw: Vec<Detection>, settings: &DetectionSettings) -> Vec<Detection> {
    let threshold = settings.confidence_threshold;
    raw.into_iter()
        .filter(|d| d.score >= threshold)
        .take(settings.max_detections as usize)
        .collect()
}
