//! Captured frames.
//!
//! A `Frame` owns tightly packed RGB24 pixels. Sources produce frames, the
//! pipeline resizes a copy for the detector and draws the overlay onto the
//! original before handing it to a sink.

use anyhow::{anyhow, Result};
use image::{imageops, imageops::FilterType, RgbImage};
use std::time::Instant;

/// One captured RGB24 frame.
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sequence number assigned by the source, starting at 1.
    pub sequence: u64,
    /// Monotonic capture instant; frame processing time is measured from it.
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap RGB24 pixels, validating the buffer length.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Borrow the frame as an `image` buffer for drawing.
    pub fn as_image_mut(&mut self) -> Result<ImageViewMut<'_>> {
        let (width, height) = (self.width, self.height);
        image::ImageBuffer::from_raw(width, height, self.pixels.as_mut_slice())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))
    }

    /// Copy of the frame as an owned `RgbImage`.
    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }

    /// Bilinear resize into a new frame carrying the same sequence and capture time.
    pub fn resized(&self, width: u32, height: u32) -> Result<Frame> {
        if width == 0 || height == 0 {
            return Err(anyhow!("cannot resize to {}x{}", width, height));
        }
        if width == self.width && height == self.height {
            return Ok(Frame {
                pixels: self.pixels.clone(),
                width,
                height,
                sequence: self.sequence,
                captured_at: self.captured_at,
            });
        }
        let source = self.to_image()?;
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);
        Ok(Frame {
            pixels: resized.into_raw(),
            width,
            height,
            sequence: self.sequence,
            captured_at: self.captured_at,
        })
    }
}

/// Mutable `image` view over a frame's pixel buffer.
pub type ImageViewMut<'a> = image::ImageBuffer<image::Rgb<u8>, &'a mut [u8]>;

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}
