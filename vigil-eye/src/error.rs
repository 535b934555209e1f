//! Error types for vigil-eye

use crate::camera::CameraError;
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use vigil_core::Error as CoreError;

/// Message shown when the model cannot be loaded.
pub const MODEL_LOAD_MESSAGE: &str =
    "Failed to load object detection model. Please refresh and try again.";
/// Message shown when a single inference call fails.
pub const INFERENCE_MESSAGE: &str = "Error during object detection";
/// Message shown when a non-image file is selected.
pub const INVALID_MEDIA_MESSAGE: &str = "Please select a valid image file";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Model not ready")]
    ModelNotReady,

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Frame error: {0}")]
    Frame(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

impl VisionError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            VisionError::Camera(e) => e.to_string(),
            VisionError::ModelLoad(_) => MODEL_LOAD_MESSAGE.to_string(),
            VisionError::ModelNotReady | VisionError::Inference(_) | VisionError::Frame(_) => {
                INFERENCE_MESSAGE.to_string()
            }
            VisionError::InvalidMedia(_) | VisionError::Image(_) => {
                INVALID_MEDIA_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Category of an error surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fatal for the session; needs a full reload
    ModelLoad,
    /// Camera acquisition failed; retry is offered
    Camera,
    /// One inference call failed; detection keeps going
    Inference,
}

/// Error as presented to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
    pub recoverable: bool,
}

/// Shared, single-slot error state read by the presentation layer.
///
/// A model load failure is sticky: later reports and non-fatal clears do not
/// replace it.
#[derive(Debug, Default)]
pub struct ErrorState {
    current: RwLock<Option<SessionError>>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error of the given kind, using its user-facing message.
    pub fn report(&self, kind: ErrorKind, err: &VisionError) {
        let mut current = self.current.write();
        if matches!(current.as_ref(), Some(e) if e.kind == ErrorKind::ModelLoad) {
            debug!("Ignoring {:?} error while model load failure is shown", kind);
            return;
        }
        *current = Some(SessionError {
            kind,
            message: err.user_message(),
            recoverable: kind != ErrorKind::ModelLoad,
        });
    }

    pub fn current(&self) -> Option<SessionError> {
        self.current.read().clone()
    }

    /// Clear any recoverable error.
    pub fn clear_recoverable(&self) {
        let mut current = self.current.write();
        if matches!(current.as_ref(), Some(e) if e.recoverable) {
            *current = None;
        }
    }

    /// Clear the error only if it is of the given kind.
    pub fn clear_kind(&self, kind: ErrorKind) {
        let mut current = self.current.write();
        if matches!(current.as_ref(), Some(e) if e.kind == kind && e.recoverable) {
            *current = None;
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.current.read().as_ref(), Some(e) if !e.recoverable)
    }
}
