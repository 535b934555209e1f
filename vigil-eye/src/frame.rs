//! Raster frames and the sources that produce them

use crate::error::VisionError;
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::sync::Arc;
use tracing::debug;
use vigil_core::FrameSize;

/// An RGB raster handed to the detector.
///
/// Cheap to clone; pixel data is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::from_rgb(image.to_rgb8())
    }

    /// A zero-area frame. Detecting on it yields nothing.
    pub fn empty() -> Self {
        Self::from_rgb(RgbImage::new(0, 0))
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.image.width(), self.image.height())
    }

    pub fn is_empty(&self) -> bool {
        self.size().is_empty()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Packed RGB8 pixels, row major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// Anything that can hand out the current frame for inference.
pub trait FrameSource: Send + Sync {
    /// Current pixel dimensions, if known.
    fn dimensions(&self) -> Option<FrameSize>;

    /// Grab the current raster content.
    fn current_frame(&self) -> Result<Frame, VisionError>;
}

/// A decoded, user-selected still image.
#[derive(Debug, Clone)]
pub struct StillImage {
    frame: Frame,
    format: ImageFormat,
}

impl StillImage {
    /// Validate and decode an uploaded image.
    ///
    /// `media_type` is the type reported by the picker, if any. Anything not
    /// under `image/` is rejected before the bytes are looked at, and bytes
    /// that do not sniff as a known image format are rejected too.
    pub fn decode(bytes: &[u8], media_type: Option<&str>) -> Result<Self, VisionError> {
        check_media_type(media_type)?;

        if bytes.is_empty() {
            return Err(VisionError::InvalidMedia("empty file".to_string()));
        }

        let format = image::guess_format(bytes)
            .map_err(|_| VisionError::InvalidMedia("unrecognized image data".to_string()))?;
        let decoded = image::load_from_memory_with_format(bytes, format)?;
        let frame = Frame::from_dynamic(&decoded);
        debug!("Decoded {:?} image of {}", format, frame.size());

        Ok(Self { frame, format })
    }

    pub fn from_frame(frame: Frame, format: ImageFormat) -> Self {
        Self { frame, format }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }
}

impl FrameSource for StillImage {
    fn dimensions(&self) -> Option<FrameSize> {
        Some(self.frame.size())
    }

    fn current_frame(&self) -> Result<Frame, VisionError> {
        Ok(self.frame.clone())
    }
}

/// Reject media types outside `image/*`.
pub fn check_media_type(media_type: Option<&str>) -> Result<(), VisionError> {
    match media_type {
        Some(mt) if !mt.trim().to_ascii_lowercase().starts_with("image/") => {
            Err(VisionError::InvalidMedia(format!("unsupported media type {}", mt)))
        }
        _ => Ok(()),
    }
}
