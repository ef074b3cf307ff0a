use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::distance::{KnownWidthTable, DEFAULT_FOCAL_LENGTH_PX};
use crate::ingest::V4l2Config;
use crate::speech::DEFAULT_SPEECH_COMMAND;

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_IOU: f32 = 0.7;
const DEFAULT_SKIP_FRAMES: u64 = 2;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AssistConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    distance: Option<DistanceConfigFile>,
    speech: Option<SpeechConfigFile>,
    pipeline: Option<PipelineConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DistanceConfigFile {
    focal_length_px: Option<f32>,
    known_widths: Option<BTreeMap<String, f32>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SpeechConfigFile {
    enabled: Option<bool>,
    command: Option<Vec<String>>,
    max_in_flight: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    skip_frames: Option<u64>,
    snapshot_path: Option<PathBuf>,
}

/// Which detector implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// YOLOv8 ONNX model run through tract.
    Tract,
    /// Replays a fixed demo script; needs no model.
    Stub,
}

impl DetectorKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tract" | "onnx" => Ok(DetectorKind::Tract),
            "stub" => Ok(DetectorKind::Stub),
            other => Err(anyhow!(
                "unknown detector backend '{}' (expected tract or stub)",
                other
            )),
        }
    }
}

/// Command-line values; each `Some` wins over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub device: Option<String>,
    pub backend: Option<String>,
    pub model: Option<PathBuf>,
    pub skip_frames: Option<u64>,
    pub snapshot: Option<PathBuf>,
    pub no_speech: bool,
}

#[derive(Debug, Clone)]
pub struct AssistConfig {
    pub camera: V4l2Config,
    pub detector: DetectorSettings,
    pub distance: DistanceSettings,
    pub speech: SpeechSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: DetectorKind,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct DistanceSettings {
    pub focal_length_px: f32,
    pub known_widths: KnownWidthTable,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub enabled: bool,
    /// Program followed by its arguments; the text is appended last.
    pub command: Vec<String>,
    /// `None` leaves announcements unbounded.
    pub max_in_flight: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Process one frame out of every `skip_frames`.
    pub skip_frames: u64,
    pub snapshot_path: Option<PathBuf>,
}

impl AssistConfig {
    /// Load from `ASSIST_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ASSIST_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::load_with_cli(path, &CliOverrides::default())
    }

    /// Defaults < file < environment < `cli`, validated once at the end.
    pub fn load_with_cli(path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => AssistConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.apply_cli(cli)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AssistConfigFile) -> Result<Self> {
        let camera_file = file.camera.unwrap_or_default();
        let camera = V4l2Config {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: match detector_file.backend.as_deref() {
                Some(name) => DetectorKind::parse(name)?,
                None => DetectorKind::parse(DEFAULT_BACKEND)?,
            },
            model_path: detector_file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE),
            iou_threshold: detector_file.iou_threshold.unwrap_or(DEFAULT_IOU),
        };

        let distance_file = file.distance.unwrap_or_default();
        let known_widths = KnownWidthTable::default()
            .with_overrides(distance_file.known_widths.unwrap_or_default())?;
        let distance = DistanceSettings {
            focal_length_px: distance_file
                .focal_length_px
                .unwrap_or(DEFAULT_FOCAL_LENGTH_PX),
            known_widths,
        };

        let speech_file = file.speech.unwrap_or_default();
        let speech = SpeechSettings {
            enabled: speech_file.enabled.unwrap_or(true),
            command: speech_file.command.unwrap_or_else(|| {
                DEFAULT_SPEECH_COMMAND
                    .iter()
                    .map(|part| part.to_string())
                    .collect()
            }),
            max_in_flight: speech_file.max_in_flight,
        };

        let pipeline_file = file.pipeline.unwrap_or_default();
        let pipeline = PipelineSettings {
            skip_frames: pipeline_file.skip_frames.unwrap_or(DEFAULT_SKIP_FRAMES),
            snapshot_path: pipeline_file.snapshot_path,
        };

        Ok(Self {
            camera,
            detector,
            distance,
            speech,
            pipeline,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = non_empty_env("ASSIST_DEVICE") {
            self.camera.device = device;
        }
        if let Some(backend) = non_empty_env("ASSIST_BACKEND") {
            self.detector.backend = DetectorKind::parse(&backend)?;
        }
        if let Some(model) = non_empty_env("ASSIST_MODEL") {
            self.detector.model_path = PathBuf::from(model);
        }
        if let Some(focal) = non_empty_env("ASSIST_FOCAL_LENGTH") {
            self.distance.focal_length_px = focal
                .trim()
                .parse()
                .map_err(|_| anyhow!("ASSIST_FOCAL_LENGTH must be a number of pixels"))?;
        }
        if let Some(skip) = non_empty_env("ASSIST_SKIP_FRAMES") {
            self.pipeline.skip_frames = skip
                .trim()
                .parse()
                .map_err(|_| anyhow!("ASSIST_SKIP_FRAMES must be a positive integer"))?;
        }
        if let Some(command) = non_empty_env("ASSIST_SPEECH_COMMAND") {
            self.speech.command = command.split_whitespace().map(str::to_string).collect();
        }
        if let Some(path) = non_empty_env("ASSIST_SNAPSHOT") {
            self.pipeline.snapshot_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: &CliOverrides) -> Result<()> {
        if let Some(device) = &cli.device {
            self.camera.device = device.clone();
        }
        if let Some(backend) = &cli.backend {
            self.detector.backend = DetectorKind::parse(backend)?;
        }
        if let Some(model) = &cli.model {
            self.detector.model_path = model.clone();
        }
        if let Some(skip) = cli.skip_frames {
            self.pipeline.skip_frames = skip;
        }
        if let Some(path) = &cli.snapshot {
            self.pipeline.snapshot_path = Some(path.clone());
        }
        if cli.no_speech {
            self.speech.enabled = false;
        }
        Ok(())
    }

    /// Check invariants on the fully layered configuration.
    pub fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        check_unit_interval("confidence_threshold", self.detector.confidence_threshold)?;
        check_unit_interval("iou_threshold", self.detector.iou_threshold)?;
        if !self.distance.focal_length_px.is_finite() || self.distance.focal_length_px <= 0.0 {
            return Err(anyhow!("focal length must be a positive number of pixels"));
        }
        if self.distance.known_widths.is_empty() {
            return Err(anyhow!("known width table must not be empty"));
        }
        if self.pipeline.skip_frames == 0 {
            return Err(anyhow!("skip_frames must be at least 1"));
        }
        if self.speech.enabled && self.speech.command.is_empty() {
            return Err(anyhow!("speech command must name a program"));
        }
        if self.speech.max_in_flight == Some(0) {
            return Err(anyhow!("speech max_in_flight must be at least 1 when set"));
        }
        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within 0..1, got {}", name, value));
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<AssistConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
