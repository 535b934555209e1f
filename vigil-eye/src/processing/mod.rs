//! Pure post-processing: filtering, statistics and overlay geometry

pub mod filter;
pub mod overlay;
pub mod stats;

pub use filter::filter_detections;
pub use overlay::{map_detections, ConfidenceTier, OverlayBox, ScaleFactors};
pub use stats::{DetectionStats, LabelSummary};
