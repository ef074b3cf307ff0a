//! Destinations for annotated frames.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

use crate::frame::Frame;

const JPEG_QUALITY: u8 = 85;

/// Receives every processed, annotated frame.
pub trait FrameSink {
    fn name(&self) -> &str;

    fn show(&mut self, frame: &Frame) -> Result<()>;
}

/// Discards frames.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn show(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }
}

/// Keeps the most recent annotated frame on disk as a JPEG.
///
/// Each frame is written to a sibling temp file and renamed over the target,
/// so readers never observe a partially written image.
#[derive(Debug)]
pub struct JpegSnapshotSink {
    path: PathBuf,
    tmp_path: PathBuf,
    written: u64,
}

impl JpegSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("snapshot path {} has no file name", path.display()))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        Ok(Self {
            path,
            tmp_path,
            written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for JpegSnapshotSink {
    fn name(&self) -> &str {
        "jpeg-snapshot"
    }

    fn show(&mut self, frame: &Frame) -> Result<()> {
        {
            let file = fs::File::create(&self.tmp_path)
                .with_context(|| format!("create {}", self.tmp_path.display()))?;
            let mut writer = BufWriter::new(file);
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
                .encode(
                    frame.pixels(),
                    frame.width,
                    frame.height,
                    image::ExtendedColorType::Rgb8,
                )
                .with_context(|| format!("encode snapshot {}", self.tmp_path.display()))?;
        }
        fs::rename(&self.tmp_path, &self.path)
            .with_context(|| format!("replace snapshot {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }
}
