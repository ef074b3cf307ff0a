use anyhow::{anyhow, Context, Result};

use crate::frame::rgb_len;

/// Pixel layouts a camera driver may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
    Yuyv,
    /// Motion JPEG, one JPEG image per buffer.
    Mjpeg,
}

impl PixelFormat {
    /// Map a V4L2 fourcc to a supported format.
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" | b"JPEG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }
}

#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = rgb_len(width, height)?;
            if pixels.len() < expected {
                return Err(anyhow!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                ));
            }
            // Drivers may hand back padded buffers.
            Ok(pixels[..expected].to_vec())
        }
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height),
        PixelFormat::Mjpeg => mjpeg_to_rgb(pixels, width, height),
    }
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frames need an even width, got {}", width));
    }
    let pixel_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    let expected = pixel_count * 2;
    if pixels.len() < expected {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for chunk in pixels[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }

    Ok(rgb)
}

fn mjpeg_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(pixels, image::ImageFormat::Jpeg)
        .context("decode MJPEG frame")?
        .to_rgb8();
    if decoded.dimensions() != (width, height) {
        return Err(anyhow!(
            "MJPEG frame is {}x{}, expected {}x{}",
            decoded.width(),
            decoded.height(),
            width,
            height
        ));
    }
    Ok(decoded.into_raw())
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
