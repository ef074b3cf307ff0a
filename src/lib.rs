//! Visual assist
//!
//! Captures camera frames, detects objects, estimates how far away objects of
//! known size are, draws the result onto the frame and announces it aloud.
//!
//! # Module Structure
//!
//! - `ingest`: Frame sources (V4L2 cameras, synthetic `stub://` devices)
//! - `frame`: RGB frames and resizing
//! - `detect`: Detector backends (tract ONNX, scripted) and YOLOv8 decoding
//! - `distance`: Pinhole distance estimates and the known-width table
//! - `overlay`: Box and label drawing
//! - `speech`: Speech engines and the fire-and-forget announcer
//! - `sink`: Where annotated frames go
//! - `pipeline`: The capture/detect/announce loop
//! - `config`: File + environment configuration

pub mod config;
pub mod detect;
pub mod distance;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod sink;
pub mod speech;

pub use config::{AssistConfig, CliOverrides, DetectorKind};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use detect::{BoundingBox, Detection, DetectorBackend, ScriptedBackend, YoloParams};
pub use distance::{estimate_distance, DistanceEstimate, KnownWidthTable};
pub use frame::Frame;
pub use ingest::{FrameSource, SourceStats, V4l2Config, V4l2Source};
pub use overlay::OverlayStyle;
pub use pipeline::{AssistPipeline, PipelineParams, RunSummary, StepOutcome};
pub use sink::{FrameSink, JpegSnapshotSink, NullSink};
pub use speech::{Announcer, CommandSpeechEngine, LogSpeechEngine, SpeechEngine};

/// Build the detector selected by `settings`.
pub fn build_detector(
    settings: &config::DetectorSettings,
) -> anyhow::Result<Box<dyn DetectorBackend>> {
    let size = settings.input_size;
    match settings.backend {
        DetectorKind::Stub => Ok(Box::new(ScriptedBackend::demo((size, size)))),
        #[cfg(feature = "backend-tract")]
        DetectorKind::Tract => {
            let params = YoloParams {
                confidence_threshold: settings.confidence_threshold,
                iou_threshold: settings.iou_threshold,
                ..YoloParams::default()
            };
            let backend = TractBackend::new(&settings.model_path, size, size)?.with_params(params);
            Ok(Box::new(backend))
        }
        #[cfg(not(feature = "backend-tract"))]
        DetectorKind::Tract => Err(anyhow::anyhow!(
            "the tract detector needs the backend-tract feature (use --backend stub for the demo)"
        )),
    }
}

/// Build the speech engine selected by `settings`.
pub fn build_speech_engine(
    settings: &config::SpeechSettings,
) -> anyhow::Result<std::sync::Arc<dyn SpeechEngine>> {
    if !settings.enabled {
        return Ok(std::sync::Arc::new(LogSpeechEngine));
    }
    Ok(std::sync::Arc::new(CommandSpeechEngine::from_argv(
        &settings.command,
    )?))
}
