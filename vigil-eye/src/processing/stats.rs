//! Summary statistics over a detection set

use serde::Serialize;
use vigil_core::Detection;

/// Count and best score for one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSummary {
    pub label: String,
    pub count: usize,
    pub best_confidence: f32,
}

/// Statistics derived on demand from the current detections.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DetectionStats {
    pub count: usize,
    /// Mean score; 0 for an empty set
    pub average_confidence: f32,
    pub distinct_labels: usize,
    /// Most frequent label first; ties keep first-seen order
    pub per_label: Vec<LabelSummary>,
}

impl DetectionStats {
    pub fn from_detections(detections: &[Detection]) -> Self {
        if detections.is_empty() {
            return Self::default();
        }

        let mut per_label: Vec<LabelSummary> = Vec::new();
        let mut total = 0.0f64;
        for d in detections {
            total += d.score as f64;
            match per_label.iter_mut().find(|s| s.label == d.label) {
                Some(summary) => {
                    summary.count += 1;
                    summary.best_confidence = summary.best_confidence.max(d.score);
                }
                None => per_label.push(LabelSummary {
                    label: d.label.clone(),
                    count: 1,
                    best_confidence: d.score,
                }),
            }
        }

        // sort_by is stable
        per_label.sort_by(|a, b| b.count.cmp(&a.count));

        Self {
            count: detections.len(),
            average_confidence: (total / detections.len() as f64) as f32,
            distinct_labels: per_label.len(),
            per_label,
        }
    }

    pub fn label(&self, label: &str) -> Option<&LabelSummary> {
        self.per_label.iter().find(|s| s.label == label)
    }

    /// Mean confidence as a whole percentage.
    pub fn average_percent(&self) -> u32 {
        (self.average_confidence * 100.0).round() as u32
    }
}
