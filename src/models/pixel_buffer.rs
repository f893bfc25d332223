use crate::error::{DetectError, Result};
use image::GrayImage;

/// Borrowed row-major grayscale image (1 byte per pixel)
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> PixelBuffer<'a> {
    /// Wrap `data` as a `width` x `height` image.
    ///
    /// Zero dimensions are accepted here and rejected by the integral image
    /// builder; a length mismatch is rejected immediately.
    pub fn new(data: &'a [u8], width: usize, height: usize) -> Result<Self> {
        let expected = width.checked_mul(height).ok_or_else(|| {
            DetectError::InvalidInput(format!("{}x{} overflows usize", width, height))
        })?;
        if data.len() != expected {
            return Err(DetectError::InvalidInput(format!(
                "buffer holds {} bytes, {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Image width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// True when either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intensity at (x, y); panics when out of bounds
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// One image row
    pub fn row(&self, y: usize) -> &'a [u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Raw row-major bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

impl<'a> From<&'a GrayImage> for PixelBuffer<'a> {
    fn from(image: &'a GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.as_raw(),
            width: width as usize,
            height: height as usize,
        }
    }
}
