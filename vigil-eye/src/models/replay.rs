//! Scripted detector that replays recorded detections

use crate::error::VisionError;
use crate::frame::Frame;
use crate::models::gateway::ObjectDetector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use vigil_core::Detection;

/// Detections to replay, one list per call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayScript {
    pub frames: Vec<Vec<Detection>>,
    pub fail_load: bool,
    pub load_delay_ms: u64,
    pub detect_delay_ms: u64,
}

impl ReplayScript {
    pub fn from_json(json: &str) -> Result<Self, VisionError> {
        serde_json::from_str(json)
            .map_err(|e| VisionError::Config(format!("Invalid replay script: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// Detector that cycles through a script instead of running a network.
///
/// Each call returns the next scripted list, highest scores first, cut to
/// `max_results`.
pub struct ReplayDetector {
    script: ReplayScript,
    cursor: AtomicUsize,
}

impl ReplayDetector {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of detect calls served so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ObjectDetector for ReplayDetector {
    fn name(&self) -> &str {
        "replay"
    }

    async fn load(&self) -> Result<(), VisionError> {
        if self.script.load_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.script.load_delay_ms)).await;
        }
        if self.script.fail_load {
            return Err(VisionError::ModelLoad("replay script requested load failure".to_string()));
        }
        info!("Replay detector loaded with {} scripted frames", self.script.frames.len());
        Ok(())
    }

    async fn detect(&self, frame: &Frame, max_results: usize) -> Result<Vec<Detection>, VisionError> {
        if self.script.detect_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.script.detect_delay_ms)).await;
        }

        let call = self.cursor.fetch_add(1, Ordering::Relaxed);
        if self.script.frames.is_empty() {
            return Ok(Vec::new());
        }

        let mut detections = self.script.frames[call % self.script.frames.len()].clone();
        detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        detections.truncate(max_results);
        debug!("Replayed {} detections for {} frame", detections.len(), frame.size());
        Ok(detections)
    }
}
