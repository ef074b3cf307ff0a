use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use visual_assist::{
    Announcer, AssistPipeline, BoundingBox, Detection, FrameSink, FrameSource, JpegSnapshotSink,
    KnownWidthTable, OverlayStyle, PipelineParams, ScriptedBackend, SpeechEngine, StepOutcome,
    V4l2Config, V4l2Source,
};

#[derive(Default)]
struct RecordingEngine {
    spoken: Mutex<Vec<String>>,
}

impl SpeechEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

impl RecordingEngine {
    fn wait_for(&self, count: usize) -> Vec<String> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let spoken = self.spoken.lock().unwrap().clone();
            if spoken.len() >= count || Instant::now() > deadline {
                let mut spoken = spoken;
                spoken.sort();
                return spoken;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

struct CountingSink {
    shown: Arc<Mutex<Vec<u64>>>,
}

impl FrameSink for CountingSink {
    fn name(&self) -> &str {
        "counting"
    }

    fn show(&mut self, frame: &visual_assist::Frame) -> Result<()> {
        self.shown.lock().unwrap().push(frame.sequence);
        Ok(())
    }
}

fn stub_source() -> Result<Box<dyn FrameSource>> {
    let mut source = V4l2Source::new(V4l2Config {
        device: "stub://pipeline".to_string(),
        target_fps: 0,
        width: 640,
        height: 480,
    })?;
    source.connect()?;
    Ok(Box::new(source))
}

fn params(skip_frames: u64) -> PipelineParams {
    PipelineParams {
        skip_frames,
        focal_length_px: 615.0,
        known_widths: KnownWidthTable::default(),
        overlay: OverlayStyle::default(),
    }
}

/// Detector-space boxes at 640x640; the frame is 640x480 so widths carry over.
fn scripted() -> ScriptedBackend {
    let person = Detection::coco(BoundingBox::new(100.0, 100.0, 223.0, 600.0), 0, 0.9);
    let car = Detection::coco(BoundingBox::new(300.0, 300.0, 500.0, 400.0), 2, 0.8);
    let flat_chair = Detection::coco(BoundingBox::new(50.0, 50.0, 50.0, 90.0), 56, 0.7);
    ScriptedBackend::new(vec![vec![person, car, flat_chair]], (640, 640))
}

#[test]
fn announces_only_known_classes_with_valid_distance() -> Result<()> {
    let engine = Arc::new(RecordingEngine::default());
    let shown = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = AssistPipeline::new(
        stub_source()?,
        Box::new(scripted()),
        Box::new(CountingSink {
            shown: Arc::clone(&shown),
        }),
        Announcer::new(engine.clone()),
        params(1),
    );

    let StepOutcome::Processed(report) = pipeline.step()? else {
        panic!("frame should have been processed");
    };
    assert_eq!(report.detections, 3);
    assert_eq!(report.announcements.len(), 1);
    let person = &report.announcements[0];
    assert_eq!(person.label, "person");
    assert!((person.meters - 2.5).abs() < 1e-4);
    // 600 * 480 / 640
    assert_eq!(person.bbox.y2, 450.0);

    assert_eq!(
        engine.wait_for(1),
        vec!["Detected person at a distance of approximately 2.50 meters"]
    );
    assert_eq!(*shown.lock().unwrap(), vec![1]);
    Ok(())
}

#[test]
fn skips_all_but_every_nth_frame() -> Result<()> {
    let engine = Arc::new(RecordingEngine::default());
    let shown = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = AssistPipeline::new(
        stub_source()?,
        Box::new(scripted()),
        Box::new(CountingSink {
            shown: Arc::clone(&shown),
        }),
        Announcer::new(engine.clone()),
        params(3),
    );

    let mut processed = Vec::new();
    for _ in 0..9 {
        match pipeline.step()? {
            StepOutcome::Processed(report) => processed.push(report.sequence),
            StepOutcome::Skipped { .. } => {}
        }
    }
    assert_eq!(processed, vec![3, 6, 9]);
    assert_eq!(*shown.lock().unwrap(), vec![3, 6, 9]);

    let summary = pipeline.summary();
    assert_eq!(summary.frames_captured, 9);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.detections, 9);
    assert_eq!(summary.announcements, 3);
    assert_eq!(engine.wait_for(3).len(), 3);
    Ok(())
}

#[test]
fn run_stops_at_max_frames_and_writes_snapshot() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("annotated.jpg");
    let engine = Arc::new(RecordingEngine::default());
    let mut pipeline = AssistPipeline::new(
        stub_source()?,
        Box::new(scripted()),
        Box::new(JpegSnapshotSink::new(&path)?),
        Announcer::new(engine.clone()),
        params(2),
    );

    let stop = AtomicBool::new(false);
    let summary = pipeline.run(&stop, Some(4))?;
    assert_eq!(summary.frames_captured, 4);
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.announcements, 2);

    let snapshot = image::open(&path)?.to_rgb8();
    assert_eq!(snapshot.dimensions(), (640, 480));
    assert!(!dir.path().join("annotated.jpg.tmp").exists());
    Ok(())
}

struct SlowSink;

impl FrameSink for SlowSink {
    fn name(&self) -> &str {
        "slow"
    }

    fn show(&mut self, _frame: &visual_assist::Frame) -> Result<()> {
        thread::sleep(Duration::from_millis(30));
        Ok(())
    }
}

#[test]
fn processing_time_covers_the_whole_frame() -> Result<()> {
    let mut pipeline = AssistPipeline::new(
        stub_source()?,
        Box::new(scripted()),
        Box::new(SlowSink),
        Announcer::new(Arc::new(RecordingEngine::default())),
        params(1),
    );
    let StepOutcome::Processed(report) = pipeline.step()? else {
        panic!("frame should have been processed");
    };
    assert!(report.elapsed >= Duration::from_millis(30));
    Ok(())
}

#[test]
fn run_returns_immediately_when_stopped() -> Result<()> {
    let engine = Arc::new(RecordingEngine::default());
    let mut pipeline = AssistPipeline::new(
        stub_source()?,
        Box::new(scripted()),
        Box::new(visual_assist::NullSink),
        Announcer::new(engine),
        params(1),
    );
    let stop = AtomicBool::new(true);
    let summary = pipeline.run(&stop, None)?;
    assert_eq!(summary.frames_captured, 0);
    Ok(())
}

#[test]
fn capture_failure_stops_the_loop() -> Result<()> {
    // Never connected: the first read fails.
    let source = V4l2Source::new(V4l2Config {
        device: "stub://offline".to_string(),
        target_fps: 0,
        width: 64,
        height: 48,
    })?;
    let mut pipeline = AssistPipeline::new(
        Box::new(source),
        Box::new(scripted()),
        Box::new(visual_assist::NullSink),
        Announcer::new(Arc::new(RecordingEngine::default())),
        params(1),
    );
    let err = pipeline
        .run(&AtomicBool::new(false), Some(10))
        .expect_err("capture must fail");
    assert!(format!("{:#}", err).contains("failed to capture frame"));
    Ok(())
}
