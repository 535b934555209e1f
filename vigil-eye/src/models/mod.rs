//! Detection model capability and lifecycle

pub mod gateway;
pub mod replay;

pub use gateway::{ModelGateway, ModelState, ObjectDetector};
pub use replay::{ReplayDetector, ReplayScript};
