use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use visual_assist::config::AssistConfig;
use visual_assist::{CliOverrides, DetectorKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ASSIST_CONFIG",
        "ASSIST_DEVICE",
        "ASSIST_BACKEND",
        "ASSIST_MODEL",
        "ASSIST_FOCAL_LENGTH",
        "ASSIST_SKIP_FRAMES",
        "ASSIST_SPEECH_COMMAND",
        "ASSIST_SNAPSHOT",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_match_reference_setup() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AssistConfig::load().expect("load defaults");

    assert_eq!(cfg.camera.device, "/dev/video0");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.detector.backend, DetectorKind::Tract);
    assert_eq!(cfg.detector.model_path, PathBuf::from("yolov8n.onnx"));
    assert_eq!(cfg.detector.input_size, 640);
    assert_eq!(cfg.detector.confidence_threshold, 0.5);
    assert_eq!(cfg.distance.focal_length_px, 615.0);
    assert_eq!(cfg.distance.known_widths.get("person"), Some(0.5));
    assert_eq!(cfg.pipeline.skip_frames, 2);
    assert!(cfg.pipeline.snapshot_path.is_none());
    assert!(cfg.speech.enabled);
    assert_eq!(cfg.speech.command, vec!["espeak-ng".to_string()]);
    assert_eq!(cfg.speech.max_in_flight, None);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "camera": { "device": "/dev/video2", "width": 800, "height": 600, "target_fps": 15 },
            "detector": {
                "backend": "stub",
                "model_path": "models/yolov8s.onnx",
                "confidence_threshold": 0.4
            },
            "distance": {
                "focal_length_px": 700.0,
                "known_widths": { "bicycle": 0.6, "person": 0.45 }
            },
            "speech": { "command": ["spd-say", "-w"], "max_in_flight": 4 },
            "pipeline": { "skip_frames": 3 }
        }"#,
    );

    std::env::set_var("ASSIST_CONFIG", file.path());
    std::env::set_var("ASSIST_DEVICE", "stub://bench");
    std::env::set_var("ASSIST_SKIP_FRAMES", "1");
    std::env::set_var("ASSIST_SNAPSHOT", "/tmp/latest.jpg");

    let cfg = AssistConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!((cfg.camera.width, cfg.camera.height), (800, 600));
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.detector.backend, DetectorKind::Stub);
    assert_eq!(cfg.detector.model_path, PathBuf::from("models/yolov8s.onnx"));
    assert_eq!(cfg.detector.confidence_threshold, 0.4);
    assert_eq!(cfg.distance.focal_length_px, 700.0);
    assert_eq!(cfg.distance.known_widths.get("bicycle"), Some(0.6));
    assert_eq!(cfg.distance.known_widths.get("person"), Some(0.45));
    assert_eq!(cfg.distance.known_widths.get("chair"), Some(0.5));
    assert_eq!(cfg.speech.command, vec!["spd-say", "-w"]);
    assert_eq!(cfg.speech.max_in_flight, Some(4));
    assert_eq!(cfg.pipeline.skip_frames, 1);
    assert_eq!(
        cfg.pipeline.snapshot_path,
        Some(PathBuf::from("/tmp/latest.jpg"))
    );

    clear_env();
}

#[test]
fn cli_overrides_win_over_env_and_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{ "camera": { "device": "/dev/video1" }, "pipeline": { "skip_frames": 4 } }"#,
    );
    std::env::set_var("ASSIST_DEVICE", "/dev/video2");
    std::env::set_var("ASSIST_BACKEND", "stub");
    std::env::set_var("ASSIST_SKIP_FRAMES", "0");

    // An invalid env value is fine when the command line replaces it.
    let cli = CliOverrides {
        device: Some("stub://cli".to_string()),
        backend: Some("tract".to_string()),
        model: Some(PathBuf::from("cli.onnx")),
        skip_frames: Some(2),
        snapshot: Some(PathBuf::from("/tmp/cli.jpg")),
        no_speech: true,
    };
    let cfg = AssistConfig::load_with_cli(Some(file.path()), &cli).expect("load with cli");

    assert_eq!(cfg.camera.device, "stub://cli");
    assert_eq!(cfg.detector.backend, DetectorKind::Tract);
    assert_eq!(cfg.detector.model_path, PathBuf::from("cli.onnx"));
    assert_eq!(cfg.pipeline.skip_frames, 2);
    assert_eq!(cfg.pipeline.snapshot_path, Some(PathBuf::from("/tmp/cli.jpg")));
    assert!(!cfg.speech.enabled);

    // Without a CLI value the env layer still applies, and is validated.
    assert!(AssistConfig::load_with_cli(Some(file.path()), &CliOverrides::default()).is_err());

    std::env::set_var("ASSIST_SKIP_FRAMES", "3");
    let cfg = AssistConfig::load_with_cli(Some(file.path()), &CliOverrides::default())
        .expect("env layer");
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!(cfg.detector.backend, DetectorKind::Stub);
    assert_eq!(cfg.pipeline.skip_frames, 3);

    let zero_skip = CliOverrides {
        skip_frames: Some(0),
        ..CliOverrides::default()
    };
    assert!(AssistConfig::load_with_cli(None, &zero_skip).is_err());

    let bad_backend = CliOverrides {
        backend: Some("opencv".to_string()),
        ..CliOverrides::default()
    };
    assert!(AssistConfig::load_with_cli(None, &bad_backend).is_err());

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for json in [
        r#"{ "pipeline": { "skip_frames": 0 } }"#,
        r#"{ "distance": { "focal_length_px": 0.0 } }"#,
        r#"{ "distance": { "known_widths": { "chair": -0.5 } } }"#,
        r#"{ "detector": { "confidence_threshold": 1.5 } }"#,
        r#"{ "detector": { "backend": "opencv" } }"#,
        r#"{ "speech": { "command": [] } }"#,
        r#"{ "speech": { "max_in_flight": 0 } }"#,
        r#"{ "camera": { "resolution": "hd" } }"#,
        r#"not json"#,
    ] {
        let file = write_config(json);
        assert!(
            AssistConfig::load_from(Some(file.path())).is_err(),
            "accepted {}",
            json
        );
    }

    // Speech disabled does not need a command.
    let file = write_config(r#"{ "speech": { "enabled": false, "command": [] } }"#);
    assert!(AssistConfig::load_from(Some(file.path())).is_ok());

    std::env::set_var("ASSIST_FOCAL_LENGTH", "wide");
    assert!(AssistConfig::load_from(None).is_err());
    clear_env();

    let missing = std::path::Path::new("/nonexistent/assist.json");
    assert!(AssistConfig::load_from(Some(missing)).is_err());
}
