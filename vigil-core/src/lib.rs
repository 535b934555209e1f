//! vigil-core: shared vocabulary for the vigil detection workspace
//!
//! Plain data types describing detections, user-tunable detection settings,
//! display modes and pixel dimensions. Nothing in this crate performs I/O or
//! owns a model; see `vigil-eye` for the runtime.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    BoundingBox, ContainerSize, Detection, DetectionMode, DetectionSettings, FrameSize,
};
