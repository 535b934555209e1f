//! vigil-eye: object detection over a live camera or a still image
//!
//! Wraps an opaque pretrained detector behind a model gateway, polls a live
//! frame source with a throttled detection loop, runs one-off inference for
//! selected images, and maps results into display coordinates for an
//! overlay.

pub mod camera;
pub mod config;
pub mod detection_loop;
pub mod error;
pub mod frame;
pub mod models;
pub mod processing;
pub mod session;
pub mod single_shot;
pub mod store;

pub use camera::{CameraError, CameraManager, CameraState, CaptureDevice, TestPatternCamera};
pub use config::{CameraConstraints, FacingMode, VisionConfig};
pub use detection_loop::{DetectionLoop, LoopState, TickOutcome};
pub use error::{ErrorKind, ErrorState, SessionError, VisionError};
pub use frame::{Frame, FrameSource, StillImage};
pub use models::{ModelGateway, ModelState, ObjectDetector, ReplayDetector, ReplayScript};
pub use processing::{
    filter_detections, map_detections, ConfidenceTier, DetectionStats, LabelSummary, OverlayBox,
    ScaleFactors,
};
pub use session::{DetectionSession, SessionStatus};
pub use single_shot::{ShotOutcome, SingleShot};
pub use store::{DetectionSnapshot, DetectionStore};
