//! Camera acquisition lifecycle

use crate::config::CameraConstraints;
use crate::error::VisionError;
use crate::frame::{Frame, FrameSource};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use vigil_core::FrameSize;

/// Why a camera could not be acquired. `Display` is the user-facing text.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CameraError {
    #[error("Camera access denied. Please allow camera permissions and try again.")]
    PermissionDenied,

    #[error("No camera found. Please connect a camera and try again.")]
    NotFound,

    #[error("Camera is already in use by another application.")]
    Busy,

    #[error("Camera error: {0}")]
    Other(String),
}

/// Capture capability provided by the host (media devices, V4L2, a test double).
#[async_trait]
pub trait CaptureDevice: FrameSource {
    /// Ask for access to the device and start streaming.
    async fn acquire(&self, constraints: &CameraConstraints) -> Result<(), CameraError>;

    /// Stop streaming and give the device back.
    fn release(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "error")]
pub enum CameraState {
    Released,
    Acquiring,
    Live,
    Failed(CameraError),
}

/// Camera manager wrapping an injected capture device
pub struct CameraManager {
    constraints: CameraConstraints,
    device: Arc<dyn CaptureDevice>,
    state: RwLock<CameraState>,
}

impl CameraManager {
    /// Create a new camera manager
    pub fn new(constraints: CameraConstraints, device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            constraints,
            device,
            state: RwLock::new(CameraState::Released),
        }
    }

    /// Acquire the device. Already live is a no-op.
    pub async fn acquire(&self) -> Result<(), CameraError> {
        {
            let mut state = self.state.write();
            match *state {
                CameraState::Live => return Ok(()),
                CameraState::Acquiring => {
                    return Err(CameraError::Other(
                        "acquisition already in progress".to_string(),
                    ))
                }
                CameraState::Released | CameraState::Failed(_) => {
                    *state = CameraState::Acquiring;
                }
            }
        }

        info!(
            "Acquiring camera at {}x{} ({:?})",
            self.constraints.width, self.constraints.height, self.constraints.facing_mode
        );
        let result = self.device.acquire(&self.constraints).await;

        let mut state = self.state.write();
        if *state != CameraState::Acquiring {
            // Released while the grant was pending
            drop(state);
            if result.is_ok() {
                self.device.release();
            }
            return Err(CameraError::Other("camera released while starting".to_string()));
        }

        match result {
            Ok(()) => {
                *state = CameraState::Live;
                info!("Camera live");
                Ok(())
            }
            Err(e) => {
                warn!("Camera acquisition failed: {}", e);
                *state = CameraState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Re-attempt acquisition after a failure.
    pub async fn retry(&self) -> Result<(), CameraError> {
        info!("Retrying camera acquisition");
        self.acquire().await
    }

    /// Release the device. Idempotent.
    pub fn release(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), CameraState::Released);
        if matches!(previous, CameraState::Live | CameraState::Acquiring) {
            self.device.release();
            info!("Camera released");
        }
    }

    pub fn state(&self) -> CameraState {
        self.state.read().clone()
    }

    pub fn is_live(&self) -> bool {
        *self.state.read() == CameraState::Live
    }

    pub fn constraints(&self) -> &CameraConstraints {
        &self.constraints
    }
}

impl FrameSource for CameraManager {
    fn dimensions(&self) -> Option<FrameSize> {
        if self.is_live() {
            self.device.dimensions()
        } else {
            None
        }
    }

    fn current_frame(&self) -> Result<Frame, VisionError> {
        if !self.is_live() {
            return Err(VisionError::Frame("camera is not live".to_string()));
        }
        self.device.current_frame()
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.release();
    }
}

/// Capture device producing a moving gradient at the requested resolution.
///
/// Stands in for real hardware in demos; can be told to refuse access.
pub struct TestPatternCamera {
    size: RwLock<Option<FrameSize>>,
    refusal: Option<CameraError>,
    counter: AtomicU64,
}

impl TestPatternCamera {
    pub fn new() -> Self {
        Self {
            size: RwLock::new(None),
            refusal: None,
            counter: AtomicU64::new(0),
        }
    }

    /// A device whose every acquisition fails with `error`.
    pub fn refusing(error: CameraError) -> Self {
        Self {
            refusal: Some(error),
            ..Self::new()
        }
    }
}

impl Default for TestPatternCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for TestPatternCamera {
    fn dimensions(&self) -> Option<FrameSize> {
        *self.size.read()
    }

    fn current_frame(&self) -> Result<Frame, VisionError> {
        let size = self
            .dimensions()
            .ok_or_else(|| VisionError::Frame("test pattern camera not acquired".to_string()))?;
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let image = RgbImage::from_fn(size.width, size.height, |x, y| {
            Rgb([
                (x as u64 + n) as u8,
                (y as u64 + n) as u8,
                (n % 256) as u8,
            ])
        });
        Ok(Frame::from_rgb(image))
    }
}

#[async_trait]
impl CaptureDevice for TestPatternCamera {
    async fn acquire(&self, constraints: &CameraConstraints) -> Result<(), CameraError> {
        if let Some(err) = &self.refusal {
            return Err(err.clone());
        }
        *self.size.write() = Some(constraints.size());
        Ok(())
    }

    fn release(&self) {
        *self.size.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let manager = CameraManager::new(
            CameraConstraints::default(),
            Arc::new(TestPatternCamera::new()),
        );
        assert_eq!(manager.state(), CameraState::Released);
        assert!(manager.dimensions().is_none());

        manager.acquire().await.unwrap();
        assert!(manager.is_live());
        assert_eq!(manager.dimensions(), Some(FrameSize::new(640, 480)));
        assert_eq!(manager.current_frame().unwrap().size(), FrameSize::new(640, 480));

        // Second acquire reuses the live stream
        manager.acquire().await.unwrap();
        assert!(manager.is_live());

        manager.release();
        manager.release();
        assert_eq!(manager.state(), CameraState::Released);
        assert!(manager.current_frame().is_err());
    }

    #[tokio::test]
    async fn test_refusal_is_recorded() {
        let manager = CameraManager::new(
            CameraConstraints::default(),
            Arc::new(TestPatternCamera::refusing(CameraError::PermissionDenied)),
        );
        let err = manager.acquire().await.unwrap_err();
        assert_eq!(err, CameraError::PermissionDenied);
        assert_eq!(manager.state(), CameraState::Failed(CameraError::PermissionDenied));

        // Retry is allowed after failure and fails the same way
        assert_eq!(manager.retry().await.unwrap_err(), CameraError::PermissionDenied);
    }

    #[test]
    fn test_camera_error_messages() {
        assert_eq!(
            CameraError::PermissionDenied.to_string(),
            "Camera access denied. Please allow camera permissions and try again."
        );
        assert_eq!(
            CameraError::Busy.to_string(),
            "Camera is already in use by another application."
        );
        assert_eq!(
            CameraError::Other("glitch".to_string()).to_string(),
            "Camera error: glitch"
        );
    }

    #[test]
    fn test_pattern_frames_change() {
        let cam = TestPatternCamera::new();
        *cam.size.write() = Some(FrameSize::new(4, 4));
        let a = cam.current_frame().unwrap();
        let b = cam.current_frame().unwrap();
        assert_ne!(a.pixels(), b.pixels());
    }
}
