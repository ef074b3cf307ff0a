//! Frame ingestion sources.
//!
//! - USB/V4L2 camera devices (feature: ingest-v4l2)
//! - Synthetic source for `stub://` device paths (always available)
//!
//! Every source yields RGB24 `Frame`s with increasing sequence numbers.

mod normalize;
pub mod v4l2;

pub use normalize::PixelFormat;
pub use v4l2::{V4l2Config, V4l2Source};

use anyhow::Result;

use crate::frame::Frame;

/// A camera-like source of frames.
pub trait FrameSource {
    /// Source identifier used in logs.
    fn name(&self) -> &str;

    /// Open the underlying device. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub device: String,
}
