//! One inference per image selection

use crate::error::{ErrorKind, ErrorState, VisionError};
use crate::frame::Frame;
use crate::models::ModelGateway;
use crate::processing::filter_detections;
use crate::store::DetectionStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vigil_core::DetectionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    /// Published this many detections
    Applied(usize),
    /// A later request was issued before this one finished
    Superseded,
}

/// Single-shot inference path for still images.
///
/// No timer and no throttle. Every call takes a fresh ticket from the store,
/// so when two calls overlap only the most recently issued one publishes.
pub struct SingleShot {
    gateway: Arc<ModelGateway>,
    store: Arc<DetectionStore>,
    settings: Arc<RwLock<DetectionSettings>>,
    errors: Arc<ErrorState>,
}

impl SingleShot {
    pub fn new(
        gateway: Arc<ModelGateway>,
        store: Arc<DetectionStore>,
        settings: Arc<RwLock<DetectionSettings>>,
        errors: Arc<ErrorState>,
    ) -> Self {
        Self {
            gateway,
            store,
            settings,
            errors,
        }
    }

    /// Run inference on `frame` and replace the detection set with the result.
    ///
    /// An unready model or a failed call publishes an empty set; the failure
    /// is also recorded as an inference error.
    pub async fn detect(&self, frame: &Frame) -> ShotOutcome {
        let ticket = self.store.begin_request();
        let settings = *self.settings.read();

        let mut succeeded = false;
        let detections = if !self.gateway.is_ready() {
            debug!("Model not ready, publishing empty detections");
            Vec::new()
        } else {
            match self.gateway.infer(frame, &settings).await {
                Ok(raw) => {
                    succeeded = true;
                    filter_detections(raw, &settings)
                }
                Err(VisionError::ModelNotReady) => Vec::new(),
                Err(e) => {
                    warn!("Detection error: {}", e);
                    self.errors.report(ErrorKind::Inference, &e);
                    Vec::new()
                }
            }
        };

        let count = detections.len();
        if self.store.publish(ticket, detections) {
            if succeeded {
                self.errors.clear_kind(ErrorKind::Inference);
            }
            info!("Image detection complete: {} objects", count);
            ShotOutcome::Applied(count)
        } else {
            debug!("Image detection superseded by a newer request");
            ShotOutcome::Superseded
        }
    }

    /// Clear the detection set by running over a blank frame.
    pub async fn clear(&self) -> ShotOutcome {
        self.detect(&Frame::empty()).await
    }
}
