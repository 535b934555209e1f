//! Model gateway: owns the detector's lifecycle and the single inference entry point

use crate::error::VisionError;
use crate::frame::Frame;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vigil_core::{Detection, DetectionSettings};

/// Opaque pretrained detector supplied by the host.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Detector identifier for logs.
    fn name(&self) -> &str;

    /// Load weights. Called at most once per gateway.
    async fn load(&self) -> Result<(), VisionError>;

    /// Detect up to `max_results` objects in `frame`.
    async fn detect(&self, frame: &Frame, max_results: usize) -> Result<Vec<Detection>, VisionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed(String),
}

/// Model gateway
pub struct ModelGateway {
    detector: Arc<dyn ObjectDetector>,
    state: RwLock<ModelState>,
}

impl ModelGateway {
    pub fn new(detector: Arc<dyn ObjectDetector>) -> Self {
        Self {
            detector,
            state: RwLock::new(ModelState::Unloaded),
        }
    }

    /// Load the model once.
    ///
    /// A failed load is permanent for this gateway; calling again returns the
    /// same failure without touching the detector.
    pub async fn load(&self) -> Result<(), VisionError> {
        {
            let mut state = self.state.write();
            match state.clone() {
                ModelState::Ready => return Ok(()),
                ModelState::Loading => {
                    return Err(VisionError::ModelLoad("load already in progress".to_string()))
                }
                ModelState::Failed(reason) => return Err(VisionError::ModelLoad(reason)),
                ModelState::Unloaded => *state = ModelState::Loading,
            }
        }

        info!("Loading detection model {}", self.detector.name());
        match self.detector.load().await {
            Ok(()) => {
                *self.state.write() = ModelState::Ready;
                info!("Detection model {} ready", self.detector.name());
                Ok(())
            }
            Err(e) => {
                error!("Error loading model {}: {}", self.detector.name(), e);
                let reason = e.to_string();
                *self.state.write() = ModelState::Failed(reason.clone());
                Err(VisionError::ModelLoad(reason))
            }
        }
    }

    pub fn state(&self) -> ModelState {
        self.state.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.read() == ModelState::Ready
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Run the detector on one frame.
    ///
    /// Returns at most `settings.max_detections` raw detections with scores in
    /// `[0, 1]`; the confidence threshold is not applied here. A zero-area
    /// frame yields an empty list without reaching the detector.
    pub async fn infer(
        &self,
        frame: &Frame,
        settings: &DetectionSettings,
    ) -> Result<Vec<Detection>, VisionError> {
        if !self.is_ready() {
            return Err(VisionError::ModelNotReady);
        }

        if frame.is_empty() {
            debug!("Skipping inference on empty frame");
            return Ok(Vec::new());
        }

        let max = settings.max_detections as usize;
        let raw = self.detector.detect(frame, max).await.map_err(|e| match e {
            VisionError::Inference(_) => e,
            other => VisionError::Inference(other.to_string()),
        })?;

        let received = raw.len();
        let mut detections: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.score.is_finite())
            .map(|d| Detection::new(d.bbox, d.label, d.score))
            .collect();
        if detections.len() != received {
            warn!("Dropped {} detections with non-finite scores", received - detections.len());
        }
        if detections.len() > max {
            warn!(
                "Detector {} returned {} detections, truncating to {}",
                self.detector.name(),
                detections.len(),
                max
            );
            detections.truncate(max);
        }

        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::BoundingBox;

    struct CountingDetector {
        fail_load: bool,
        output: Vec<Detection>,
        loads: AtomicUsize,
        detects: AtomicUsize,
    }

    impl CountingDetector {
        fn new(output: Vec<Detection>) -> Self {
            Self {
                fail_load: false,
                output,
                loads: AtomicUsize::new(0),
                detects: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ObjectDetector for CountingDetector {
        fn name(&self) -> &str {
            "counting"
        }

        async fn load(&self) -> Result<(), VisionError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                Err(VisionError::ModelLoad("weights missing".to_string()))
            } else {
                Ok(())
            }
        }

        async fn detect(&self, _frame: &Frame, _max: usize) -> Result<Vec<Detection>, VisionError> {
            self.detects.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    fn det(label: &str, score: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            label: label.to_string(),
            score,
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(RgbImage::new(8, 8))
    }

    #[tokio::test]
    async fn test_infer_requires_ready_model() {
        let gateway = ModelGateway::new(Arc::new(CountingDetector::new(vec![])));
        let err = gateway.infer(&frame(), &DetectionSettings::default()).await.unwrap_err();
        assert!(matches!(err, VisionError::ModelNotReady));
    }

    #[tokio::test]
    async fn test_load_failure_is_permanent() {
        let detector = Arc::new(CountingDetector {
            fail_load: true,
            ..CountingDetector::new(vec![])
        });
        let gateway = ModelGateway::new(detector.clone());

        assert!(gateway.load().await.is_err());
        assert!(matches!(gateway.state(), ModelState::Failed(_)));
        assert!(gateway.load().await.is_err());
        assert_eq!(detector.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_is_once() {
        let detector = Arc::new(CountingDetector::new(vec![]));
        let gateway = ModelGateway::new(detector.clone());
        gateway.load().await.unwrap();
        gateway.load().await.unwrap();
        assert!(gateway.is_ready());
        assert_eq!(detector.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_infer_truncates_and_sanitizes() {
        let output = vec![
            det("a", 0.9),
            det("b", f32::NAN),
            det("c", 1.5),
            det("d", 0.2),
            det("e", 0.1),
        ];
        let gateway = ModelGateway::new(Arc::new(CountingDetector::new(output)));
        gateway.load().await.unwrap();

        let settings = DetectionSettings::default().with_max_detections(3);
        let result = gateway.infer(&frame(), &settings).await.unwrap();
        let labels: Vec<&str> = result.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "c", "d"]);
        assert_eq!(result[1].score, 1.0);
    }

    #[tokio::test]
    async fn test_empty_frame_skips_detector() {
        let detector = Arc::new(CountingDetector::new(vec![det("a", 0.9)]));
        let gateway = ModelGateway::new(detector.clone());
        gateway.load().await.unwrap();

        let result = gateway.infer(&Frame::empty(), &DetectionSettings::default()).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(detector.detects.load(Ordering::SeqCst), 0);
    }
}
