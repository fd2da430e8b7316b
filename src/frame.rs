//! Decoded camera frames.
//!
//! A `Frame` is produced by a `FrameSource` once per sensing cycle and is
//! dropped at the end of that cycle. Pixel dimensions are the source frame's
//! actual size, which is what detection boxes are scaled against.

use image::{DynamicImage, GenericImageView, RgbImage};

use crate::error::AcquisitionError;

/// One decoded RGB frame.
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap already-decoded RGB pixels.
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    /// Decode an encoded image (JPEG/PNG) held in memory.
    pub fn decode(bytes: &[u8]) -> Result<Self, AcquisitionError> {
        if bytes.is_empty() {
            return Err(AcquisitionError::Empty);
        }
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::from_dynamic(decoded))
    }

    fn from_dynamic(decoded: DynamicImage) -> Self {
        let (width, height) = decoded.dimensions();
        log::debug!("decoded frame {}x{}", width, height);
        Self {
            image: decoded.into_rgb8(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Read-only access to the RGB pixels, for scorers.
    pub fn rgb(&self) -> &RgbImage {
        &self.image
    }
}
