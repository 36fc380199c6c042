//! Source frames handed to the pipeline

use crate::error::VisionError;
use chrono::{DateTime, Utc};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;

/// Immutable RGB frame captured at a point in time.
///
/// Cloning is cheap; the pixel buffer is shared.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    /// Build a frame from packed RGB8 bytes.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, VisionError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|p| p.checked_mul(3))
            .ok_or_else(|| VisionError::Processing("Frame dimensions overflow".to_string()))?;
        if pixels.len() != expected {
            return Err(VisionError::Processing(format!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            )));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| VisionError::Processing("Failed to wrap RGB buffer".to_string()))?;
        Ok(Self::new(image))
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::new(image.to_rgb8())
    }

    pub fn with_timestamp(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// A frame with a zero dimension cannot be preprocessed.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}
