//! V4L2 frame source.
//!
//! `V4l2Source` captures frames from a local camera node (e.g. /dev/video0)
//! and normalizes them to RGB24. Device paths starting with `stub://` are
//! served by a synthetic generator so the pipeline can run without hardware.

use anyhow::Result;
#[cfg(feature = "ingest-v4l2")]
use anyhow::{anyhow, Context};
#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

#[cfg(feature = "ingest-v4l2")]
use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::frame::{rgb_len, Frame};

/// Configuration for a V4L2 source.
#[derive(Clone, Debug, PartialEq)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0"), or `stub://<name>` for synthetic frames.
    pub device: String,
    /// Requested frame rate (frames per second). 0 leaves the driver default.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// V4L2 frame source.
pub struct V4l2Source {
    backend: V4l2Backend,
}

enum V4l2Backend {
    Synthetic(SyntheticV4l2Source),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceV4l2Source),
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Result<Self> {
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: V4l2Backend::Synthetic(SyntheticV4l2Source::new(config)),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: V4l2Backend::Device(DeviceV4l2Source::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow::anyhow!(
                "camera device {} needs the ingest-v4l2 feature (use stub:// for synthetic frames)",
                config.device
            ))
        }
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        match &self.backend {
            V4l2Backend::Synthetic(source) => &source.config.device,
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => &source.config.device,
        }
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            V4l2Backend::Device(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticV4l2Source {
    config: V4l2Config,
    frame_count: u64,
    connected: bool,
    last_frame_at: Option<Instant>,
}

impl SyntheticV4l2Source {
    fn new(config: V4l2Config) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
            last_frame_at: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "V4l2Source: connected to {} (synthetic, {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            anyhow::bail!("v4l2 device {} not connected", self.config.device);
        }
        if self.config.target_fps > 0 {
            if let Some(last) = self.last_frame_at {
                let period = Duration::from_millis(1000 / self.config.target_fps as u64);
                if let Some(wait) = period.checked_sub(last.elapsed()) {
                    std::thread::sleep(wait);
                }
            }
        }
        let pixels = self.generate_synthetic_pixels()?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(pixels, self.config.width, self.config.height, self.frame_count)
    }

    /// Diagonal gradient that drifts by one step per frame.
    fn generate_synthetic_pixels(&self) -> Result<Vec<u8>> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![0u8; rgb_len(self.config.width, self.config.height)?];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i % width, i / width);
            let shade = ((x + y) as u64 + self.frame_count) % 256;
            px[0] = shade as u8;
            px[1] = (255 - shade) as u8;
            px[2] = ((y * 255) / height.max(1)) as u8;
        }
        Ok(pixels)
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Camera device source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceV4l2Source {
    config: V4l2Config,
    state: Option<DeviceV4l2State>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceV4l2Source {
    fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            active_format: PixelFormat::Rgb24,
            config,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("could not open camera {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let active_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {} only offers unsupported pixel format {}",
                self.config.device,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.active_format = active_format;
        self.last_error = None;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.active_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (width, height, format) = (self.active_width, self.active_height, self.active_format);
        let rgb = state
            .with_mut(|fields| -> Result<Vec<u8>> {
                let (buf, meta) = fields.stream.next().context("failed to capture frame")?;
                let used = match meta.bytesused as usize {
                    0 => buf.len(),
                    n => n.min(buf.len()),
                };
                normalize_to_rgb(&buf[..used], width, height, format)
            })
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(rgb, width, height, self.frame_count)
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}
