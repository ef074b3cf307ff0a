//! Capture -> detect -> announce loop.
//!
//! One iteration captures a frame, skips it unless it is the N-th one,
//! resizes a copy to the detector input, runs detection, and for every
//! detection of a class with a known width estimates its distance, draws the
//! overlay and fires an announcement. The annotated frame goes to the sink.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::detect::{BoundingBox, Detection, DetectorBackend};
use crate::distance::KnownWidthTable;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::overlay::{self, OverlayStyle};
use crate::sink::FrameSink;
use crate::speech::{announcement_text, Announcer, AnnouncerStats};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Tunables for the frame loop.
#[derive(Clone, Debug)]
pub struct PipelineParams {
    pub skip_frames: u64,
    pub focal_length_px: f32,
    pub known_widths: KnownWidthTable,
    pub overlay: OverlayStyle,
}

/// A detection that passed the known-width filter and has a valid distance.
#[derive(Clone, Debug, PartialEq)]
pub struct Announcement {
    pub label: String,
    pub confidence: f32,
    /// Box in captured-frame pixels.
    pub bbox: BoundingBox,
    pub meters: f32,
}

impl Announcement {
    pub fn overlay_text(&self) -> String {
        overlay::label_text(&self.label, self.confidence, self.meters)
    }

    pub fn speech_text(&self) -> String {
        announcement_text(&self.label, self.meters)
    }
}

/// What happened to one captured frame.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Skipped { sequence: u64 },
    Processed(FrameReport),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub sequence: u64,
    pub detections: usize,
    pub announcements: Vec<Announcement>,
    pub elapsed: Duration,
}

/// Totals for a finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub detections: u64,
    pub announcements: u64,
    pub speech: AnnouncerStats,
}

/// Keep detections whose class has a known width, mapping boxes from
/// detector-input space into captured-frame space with `(sx, sy)`.
///
/// Detections with a non-positive pixel width are dropped.
pub fn select_announcements(
    detections: &[Detection],
    scale: (f32, f32),
    known_widths: &KnownWidthTable,
    focal_length_px: f32,
) -> Vec<Announcement> {
    detections
        .iter()
        .filter_map(|det| {
            let bbox = det.bbox.scaled(scale.0, scale.1);
            let estimate = known_widths.estimate(&det.label, focal_length_px, bbox.width())?;
            let meters = estimate.meters()?;
            Some(Announcement {
                label: det.label.clone(),
                confidence: det.confidence,
                bbox,
                meters,
            })
        })
        .collect()
}

pub struct AssistPipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    sink: Box<dyn FrameSink>,
    announcer: Announcer,
    params: PipelineParams,
    frame_count: u64,
    summary: RunSummary,
}

impl AssistPipeline {
    /// `source` must already be connected.
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        sink: Box<dyn FrameSink>,
        announcer: Announcer,
        params: PipelineParams,
    ) -> Self {
        Self {
            source,
            detector,
            sink,
            announcer,
            params,
            frame_count: 0,
            summary: RunSummary::default(),
        }
    }

    /// Capture and handle one frame.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let mut frame = self
            .source
            .next_frame()
            .context("failed to capture frame")?;

        self.frame_count += 1;
        self.summary.frames_captured += 1;
        if self.frame_count % self.params.skip_frames.max(1) != 0 {
            return Ok(StepOutcome::Skipped {
                sequence: frame.sequence,
            });
        }

        let (in_w, in_h) = self.detector.input_size();
        let input = frame.resized(in_w, in_h)?;
        let detections = self
            .detector
            .detect(&input)
            .with_context(|| format!("{} detection failed", self.detector.name()))?;

        let scale = (
            frame.width as f32 / in_w as f32,
            frame.height as f32 / in_h as f32,
        );
        let announcements = select_announcements(
            &detections,
            scale,
            &self.params.known_widths,
            self.params.focal_length_px,
        );

        self.annotate(&mut frame, &announcements)?;
        for announcement in &announcements {
            log::debug!(
                "frame {}: {} {:.2} at {:.2} m",
                frame.sequence,
                announcement.label,
                announcement.confidence,
                announcement.meters
            );
            self.announcer.announce(announcement.speech_text());
        }

        self.sink
            .show(&frame)
            .with_context(|| format!("frame sink {} failed", self.sink.name()))?;

        let elapsed = frame.captured_at.elapsed();
        log::info!("frame processing time: {:.2} seconds", elapsed.as_secs_f64());

        self.summary.frames_processed += 1;
        self.summary.detections += detections.len() as u64;
        self.summary.announcements += announcements.len() as u64;

        Ok(StepOutcome::Processed(FrameReport {
            sequence: frame.sequence,
            detections: detections.len(),
            announcements,
            elapsed,
        }))
    }

    fn annotate(&self, frame: &mut Frame, announcements: &[Announcement]) -> Result<()> {
        if announcements.is_empty() {
            return Ok(());
        }
        let mut image = frame.as_image_mut()?;
        for announcement in announcements {
            overlay::draw_detection(
                &mut image,
                &announcement.bbox,
                &announcement.overlay_text(),
                &self.params.overlay,
            );
        }
        Ok(())
    }

    /// Step until `stop` is set, `max_frames` frames are captured, or an error occurs.
    pub fn run(&mut self, stop: &AtomicBool, max_frames: Option<u64>) -> Result<RunSummary> {
        let mut last_health_log = Instant::now();
        while !stop.load(Ordering::SeqCst) {
            if max_frames.is_some_and(|max| self.summary.frames_captured >= max) {
                break;
            }
            self.step()?;

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                let speech = self.announcer.stats();
                log::info!(
                    "camera health={} frames={} device={}",
                    self.source.is_healthy(),
                    stats.frames_captured,
                    stats.device
                );
                log::info!(
                    "speech spawned={} dropped={} failed={} in_flight={}",
                    speech.spawned,
                    speech.dropped,
                    speech.failed,
                    speech.in_flight
                );
                last_health_log = Instant::now();
            }
        }
        Ok(self.summary())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            speech: self.announcer.stats(),
            ..self.summary
        }
    }
}
