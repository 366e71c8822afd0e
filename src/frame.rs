//! The [`Frame`] value type.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use image::RgbImage;

/// A single decoded video frame: an 8-bit, three-channel RGB pixel buffer.
///
/// Frames are immutable once constructed. A frame is owned by the stream
/// that produced it until it is handed to a consumer.
#[derive(Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap an RGB image.
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// A frame of the given size filled with one colour. Mostly useful for
    /// synthetic streams.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Size of the pixel data in bytes.
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }

    /// Borrow the underlying image.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Take the underlying image.
    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        Self::new(image)
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Frame({}x{})", self.width(), self.height())
    }
}
