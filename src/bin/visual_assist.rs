//! visual-assist - spoken object distances from a live camera
//!
//! This binary:
//! 1. Opens the camera (or a `stub://` synthetic device)
//! 2. Loads the detector
//! 3. Runs the capture/detect/announce loop until Ctrl-C or `q` on stdin

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use visual_assist::{
    build_detector, build_speech_engine, Announcer, AssistConfig, AssistPipeline, CliOverrides,
    FrameSink, FrameSource, JpegSnapshotSink, NullSink, OverlayStyle, PipelineParams, V4l2Source,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "ASSIST_CONFIG")]
    config: Option<PathBuf>,
    /// Camera device path, or stub://<name> for synthetic frames.
    #[arg(long)]
    device: Option<String>,
    /// Detector backend: tract or stub.
    #[arg(long)]
    backend: Option<String>,
    /// YOLOv8 ONNX model path.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Process one frame out of every N.
    #[arg(long)]
    skip_frames: Option<u64>,
    /// Stop after capturing this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Write the latest annotated frame to this JPEG path.
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Log announcements instead of speaking them.
    #[arg(long)]
    no_speech: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = load_config(&args)?;

    let mut source = V4l2Source::new(cfg.camera.clone())?;
    if let Err(err) = source.connect() {
        log::error!("could not open camera {}: {:#}", cfg.camera.device, err);
        return Err(err);
    }

    let mut detector = build_detector(&cfg.detector)?;
    detector.warm_up().context("detector warm-up failed")?;
    log::info!(
        "detector {} ready ({}x{} input)",
        detector.name(),
        detector.input_size().0,
        detector.input_size().1
    );

    let engine = build_speech_engine(&cfg.speech)?;
    let announcer = Announcer::new(engine).with_max_in_flight(cfg.speech.max_in_flight);
    log::info!("speech engine: {}", announcer.engine_name());

    let sink: Box<dyn FrameSink> = match &cfg.pipeline.snapshot_path {
        Some(path) => {
            log::info!("writing annotated frames to {}", path.display());
            Box::new(JpegSnapshotSink::new(path)?)
        }
        None => Box::new(NullSink),
    };

    let params = PipelineParams {
        skip_frames: cfg.pipeline.skip_frames,
        focal_length_px: cfg.distance.focal_length_px,
        known_widths: cfg.distance.known_widths.clone(),
        overlay: OverlayStyle::default(),
    };
    log::info!(
        "announcing {} (focal length {} px, every {} frame(s))",
        params.known_widths.labels().collect::<Vec<_>>().join(", "),
        params.focal_length_px,
        params.skip_frames
    );

    let stop = Arc::new(AtomicBool::new(false));
    install_stop_handlers(&stop)?;

    let mut pipeline = AssistPipeline::new(Box::new(source), detector, sink, announcer, params);
    log::info!("visual-assist running. press q + Enter or Ctrl-C to quit");
    let summary = match pipeline.run(&stop, args.max_frames) {
        Ok(summary) => summary,
        Err(err) => {
            log::error!("{:#}", err);
            return Err(err);
        }
    };

    log::info!(
        "stopped: frames captured={} processed={} detections={} announcements={}",
        summary.frames_captured,
        summary.frames_processed,
        summary.detections,
        summary.announcements
    );
    log::info!(
        "speech: failed={} dropped={}",
        summary.speech.failed,
        summary.speech.dropped
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<AssistConfig> {
    let cli = CliOverrides {
        device: args.device.clone(),
        backend: args.backend.clone(),
        model: args.model.clone(),
        skip_frames: args.skip_frames,
        snapshot: args.snapshot.clone(),
        no_speech: args.no_speech,
    };
    AssistConfig::load_with_cli(args.config.as_deref(), &cli)
}

/// Ctrl-C, or a line reading `q` on stdin, sets `stop`.
fn install_stop_handlers(stop: &Arc<AtomicBool>) -> Result<()> {
    let on_signal = Arc::clone(stop);
    ctrlc::set_handler(move || {
        on_signal.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let on_quit = Arc::clone(stop);
    std::thread::Builder::new()
        .name("stdin-quit".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                        on_quit.store(true, Ordering::SeqCst);
                        break;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })
        .context("failed to spawn stdin watcher")?;
    Ok(())
}
