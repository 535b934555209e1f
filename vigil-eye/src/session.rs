//! Detection session: ties the model, camera, loop and image path together

use crate::camera::{CameraManager, CameraState, CaptureDevice};
use crate::config::VisionConfig;
use crate::detection_loop::DetectionLoop;
use crate::error::{ErrorKind, ErrorState, SessionError, VisionError};
use crate::frame::{FrameSource, StillImage};
use crate::models::{ModelGateway, ModelState, ObjectDetector};
use crate::processing::{map_detections, DetectionStats, OverlayBox};
use crate::single_shot::{ShotOutcome, SingleShot};
use crate::store::{DetectionSnapshot, DetectionStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use vigil_core::{ContainerSize, Detection, DetectionMode, DetectionSettings, FrameSize};

/// Everything a presentation layer needs to render the session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub mode: DetectionMode,
    pub model: ModelState,
    pub camera: CameraState,
    pub detecting: bool,
    pub can_toggle_detection: bool,
    pub settings: DetectionSettings,
    pub error: Option<SessionError>,
    pub detection_count: usize,
    pub published_at: Option<DateTime<Utc>>,
    pub frame: FrameSize,
    pub container: ContainerSize,
}

/// One user-facing detection session.
///
/// Owns the shared state (settings, detection set, error slot) and routes
/// user actions to the loop controller or the single-shot path depending on
/// the current mode.
pub struct DetectionSession {
    id: Uuid,
    config: VisionConfig,
    gateway: Arc<ModelGateway>,
    store: Arc<DetectionStore>,
    settings: Arc<RwLock<DetectionSettings>>,
    errors: Arc<ErrorState>,
    camera: Arc<CameraManager>,
    detection_loop: DetectionLoop,
    single_shot: SingleShot,
    mode: RwLock<DetectionMode>,
    image: RwLock<Option<StillImage>>,
    container: RwLock<ContainerSize>,
}

impl DetectionSession {
    pub fn new(
        config: VisionConfig,
        detector: Arc<dyn ObjectDetector>,
        device: Arc<dyn CaptureDevice>,
    ) -> Result<Self, VisionError> {
        config.validate()?;

        let mut initial = config.default_settings;
        initial.active = config.initial_mode == DetectionMode::Webcam;

        let gateway = Arc::new(ModelGateway::new(detector));
        let store = Arc::new(DetectionStore::new());
        let settings = Arc::new(RwLock::new(initial));
        let errors = Arc::new(ErrorState::new());
        let camera = Arc::new(CameraManager::new(config.camera.clone(), device));

        let detection_loop = DetectionLoop::new(
            gateway.clone(),
            store.clone(),
            settings.clone(),
            errors.clone(),
            config.poll_interval(),
        );
        let single_shot = SingleShot::new(
            gateway.clone(),
            store.clone(),
            settings.clone(),
            errors.clone(),
        );

        Ok(Self {
            id: Uuid::new_v4(),
            mode: RwLock::new(config.initial_mode),
            image: RwLock::new(None),
            container: RwLock::new(config.initial_container),
            config,
            gateway,
            store,
            settings,
            errors,
            camera,
            detection_loop,
            single_shot,
        })
    }

    /// Load the model and enter the initial mode.
    ///
    /// A model load failure is recorded as the fatal session error and
    /// returned; the camera is still acquired so the feed can be shown.
    /// A camera failure alone is recorded but does not fail the call.
    pub async fn open(&self) -> Result<(), VisionError> {
        info!(
            "Opening detection session {} (model {})",
            self.id, self.config.model_base
        );

        let loaded = self.gateway.load().await;
        if let Err(e) = &loaded {
            error!("Session {} cannot detect: {}", self.id, e);
            self.errors.report(ErrorKind::ModelLoad, e);
        }

        if self.mode() == DetectionMode::Webcam {
            // Recorded in the error slot; retry_camera() is the way out
            let _ = self.acquire_camera().await;
        }

        loaded
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    pub fn mode(&self) -> DetectionMode {
        *self.mode.read()
    }

    /// Switch between webcam and image mode.
    ///
    /// Stops the loop, clears the detection set and any recoverable error,
    /// and moves the camera or selected image out of the way. Entering webcam
    /// mode acquires the camera; an acquisition failure is recorded and
    /// returned, but the mode change itself stands.
    pub async fn set_mode(&self, mode: DetectionMode) -> Result<(), VisionError> {
        let previous = self.mode();
        if previous == mode {
            return Ok(());
        }

        // The loop must be down before any of the new mode's state lands
        self.detection_loop.stop();
        self.store.invalidate();
        *self.mode.write() = mode;
        self.errors.clear_recoverable();
        self.settings.write().active = mode == DetectionMode::Webcam;
        info!("Detection mode changed: {} -> {}", previous, mode);

        match mode {
            DetectionMode::Image => {
                self.camera.release();
                Ok(())
            }
            DetectionMode::Webcam => {
                *self.image.write() = None;
                self.acquire_camera().await
            }
        }
    }

    async fn acquire_camera(&self) -> Result<(), VisionError> {
        match self.camera.acquire().await {
            Ok(()) => {
                self.errors.clear_kind(ErrorKind::Camera);
                Ok(())
            }
            Err(e) => {
                let err = VisionError::Camera(e);
                self.errors.report(ErrorKind::Camera, &err);
                Err(err)
            }
        }
    }

    /// Clear the camera error and try to acquire the camera again.
    pub async fn retry_camera(&self) -> Result<(), VisionError> {
        if self.mode() != DetectionMode::Webcam {
            return Err(VisionError::InvalidState(
                "camera retry is only available in webcam mode".to_string(),
            ));
        }
        self.errors.clear_kind(ErrorKind::Camera);
        info!("Retrying camera for session {}", self.id);
        self.acquire_camera().await
    }

    /// The detection toggle is live only in webcam mode with a ready model.
    pub fn can_toggle_detection(&self) -> bool {
        self.mode() == DetectionMode::Webcam && self.gateway.is_ready()
    }

    pub fn is_detecting(&self) -> bool {
        self.detection_loop.is_running()
    }

    /// Start the detection loop over the live camera.
    ///
    /// Returns `Ok(false)` if it was already running.
    pub fn start_detection(&self) -> Result<bool, VisionError> {
        if self.mode() != DetectionMode::Webcam {
            return Err(VisionError::InvalidState(
                "live detection is only available in webcam mode".to_string(),
            ));
        }
        if !self.gateway.is_ready() {
            return Err(VisionError::ModelNotReady);
        }
        if !self.camera.is_live() {
            return Err(VisionError::InvalidState("camera is not live".to_string()));
        }
        if self.detection_loop.is_running() {
            return Ok(false);
        }

        let source: Arc<dyn FrameSource> = self.camera.clone();
        Ok(self.detection_loop.start(source))
    }

    /// Stop the detection loop and clear the detection set.
    pub fn stop_detection(&self) -> bool {
        self.detection_loop.stop()
    }

    /// Flip the detection loop; returns whether it is now running.
    pub fn toggle_detection(&self) -> Result<bool, VisionError> {
        if self.detection_loop.is_running() {
            self.stop_detection();
            Ok(false)
        } else {
            self.start_detection()?;
            Ok(self.detection_loop.is_running())
        }
    }

    pub fn settings(&self) -> DetectionSettings {
        *self.settings.read()
    }

    /// Replace threshold and max detections. `active` follows the mode.
    ///
    /// Out-of-range values are rejected and the current settings kept.
    pub fn update_settings(&self, new: DetectionSettings) -> Result<(), VisionError> {
        new.validate()?;
        let mut settings = self.settings.write();
        settings.confidence_threshold = new.confidence_threshold;
        settings.max_detections = new.max_detections;
        info!(
            "Settings updated: threshold {:.2}, max detections {}",
            settings.confidence_threshold, settings.max_detections
        );
        Ok(())
    }

    pub fn set_confidence_threshold(&self, threshold: f32) -> Result<(), VisionError> {
        self.update_settings(self.settings().with_threshold(threshold))
    }

    pub fn set_max_detections(&self, max: u32) -> Result<(), VisionError> {
        self.update_settings(self.settings().with_max_detections(max))
    }

    /// Decode a selected file and run one inference over it.
    ///
    /// Invalid media is returned to the caller and changes nothing.
    pub async fn select_image(
        &self,
        bytes: &[u8],
        media_type: Option<&str>,
    ) -> Result<ShotOutcome, VisionError> {
        if self.mode() != DetectionMode::Image {
            return Err(VisionError::InvalidState(
                "image selection is only available in image mode".to_string(),
            ));
        }

        let image = StillImage::decode(bytes, media_type).map_err(|e| {
            warn!("Rejected image selection: {}", e);
            e
        })?;
        let frame = image.frame().clone();
        info!("Image selected: {:?} {}", image.format(), frame.size());
        *self.image.write() = Some(image);

        Ok(self.single_shot.detect(&frame).await)
    }

    /// Drop the selected image and empty the detection set.
    pub async fn clear_image(&self) -> Result<ShotOutcome, VisionError> {
        if self.mode() != DetectionMode::Image {
            return Err(VisionError::InvalidState(
                "clearing an image is only available in image mode".to_string(),
            ));
        }

        *self.image.write() = None;
        info!("Image cleared");
        Ok(self.single_shot.clear().await)
    }

    pub fn has_image(&self) -> bool {
        self.image.read().is_some()
    }

    /// Record new display container dimensions.
    pub fn resize_container(&self, width: f32, height: f32) -> Result<(), VisionError> {
        let size = ContainerSize::new(width, height)?;
        *self.container.write() = size;
        Ok(())
    }

    pub fn container(&self) -> ContainerSize {
        *self.container.read()
    }

    /// Pixel size of the current source, or the configured fallback.
    pub fn frame_size(&self) -> FrameSize {
        let reported = match self.mode() {
            DetectionMode::Webcam => self.camera.dimensions(),
            DetectionMode::Image => self.image.read().as_ref().and_then(|i| i.dimensions()),
        };
        reported
            .filter(|size| !size.is_empty())
            .unwrap_or(self.config.fallback_frame)
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.store.detections()
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        self.store.snapshot()
    }

    pub fn statistics(&self) -> DetectionStats {
        DetectionStats::from_detections(&self.store.snapshot().detections)
    }

    /// Current detections mapped into container space.
    pub fn overlay(&self) -> Vec<OverlayBox> {
        let snapshot = self.store.snapshot();
        map_detections(&snapshot.detections, self.frame_size(), self.container())
    }

    pub fn error(&self) -> Option<SessionError> {
        self.errors.current()
    }

    pub fn model_state(&self) -> ModelState {
        self.gateway.state()
    }

    pub fn camera_state(&self) -> CameraState {
        self.camera.state()
    }

    pub fn status(&self) -> SessionStatus {
        let snapshot = self.store.snapshot();
        SessionStatus {
            session_id: self.id,
            mode: self.mode(),
            model: self.gateway.state(),
            camera: self.camera.state(),
            detecting: self.detection_loop.is_running(),
            can_toggle_detection: self.can_toggle_detection(),
            settings: self.settings(),
            error: self.errors.current(),
            detection_count: snapshot.len(),
            published_at: snapshot.published_at,
            frame: self.frame_size(),
            container: self.container(),
        }
    }

    /// Stop detection and release the camera.
    pub fn shutdown(&self) {
        self.detection_loop.stop();
        self.camera.release();
        info!("Detection session {} shut down", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::TestPatternCamera;
    use crate::models::{ReplayDetector, ReplayScript};

    fn session(mode: DetectionMode) -> DetectionSession {
        let config = VisionConfig {
            initial_mode: mode,
            ..VisionConfig::default()
        };
        DetectionSession::new(
            config,
            Arc::new(ReplayDetector::new(ReplayScript::default())),
            Arc::new(TestPatternCamera::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_in_webcam_mode() {
        let session = session(DetectionMode::Webcam);
        session.open().await.unwrap();

        assert_eq!(session.model_state(), ModelState::Ready);
        assert_eq!(session.camera_state(), CameraState::Live);
        assert!(session.settings().active);
        assert!(session.can_toggle_detection());
        assert!(!session.is_detecting());
        assert_eq!(session.frame_size(), FrameSize::new(640, 480));
    }

    #[tokio::test]
    async fn test_toggle_unavailable_in_image_mode() {
        let session = session(DetectionMode::Image);
        session.open().await.unwrap();

        assert!(!session.settings().active);
        assert!(!session.can_toggle_detection());
        assert!(matches!(
            session.toggle_detection(),
            Err(VisionError::InvalidState(_))
        ));
        assert_eq!(session.camera_state(), CameraState::Released);
    }

    #[tokio::test]
    async fn test_update_settings_rejects_out_of_range() {
        let session = session(DetectionMode::Webcam);
        assert!(session.set_confidence_threshold(0.05).is_err());
        assert!(session.set_max_detections(21).is_err());
        assert_eq!(session.settings().confidence_threshold, 0.5);
        assert_eq!(session.settings().max_detections, 10);

        session.set_confidence_threshold(0.75).unwrap();
        assert_eq!(session.settings().confidence_threshold, 0.75);
        assert!(session.settings().active);
    }

    #[test]
    fn test_frame_size_falls_back() {
        let session = session(DetectionMode::Image);
        assert_eq!(session.frame_size(), FrameSize::new(640, 480));
    }

    #[test]
    fn test_status_serializes() {
        let session = session(DetectionMode::Webcam);
        let json = serde_json::to_value(session.status()).unwrap();
        assert_eq!(json["mode"], "webcam");
        assert_eq!(json["model"]["state"], "unloaded");
        assert_eq!(json["detecting"], false);
    }
}
