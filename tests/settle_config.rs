use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use settle_kernel::{ClassPreset, DistanceTolerance, RoiSpec, SettleConfig, TRASH_CLASS_IDS};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SETTLE_CONFIG",
        "SETTLE_DEVICE",
        "SETTLE_CONFIDENCE",
        "SETTLE_STABILITY",
        "SETTLE_TOLERANCE_PX",
        "SETTLE_BUDGET_SECS",
        "SETTLE_OUTPUT_DIR",
        "SETTLE_ALLOWED_CLASSES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SettleConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.device, "stub://camera");
    assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (640, 480, 30));
    assert_eq!(cfg.session.allowed_class_ids, TRASH_CLASS_IDS.to_vec());
    assert_eq!(cfg.session.tolerance, DistanceTolerance::Fixed { pixels: 50.0 });
    assert_eq!(cfg.session.output_dir, PathBuf::from("./test_images"));
    assert!(cfg.session.roi.is_none());
    assert!(cfg.model.detector_path.is_none());
    assert_eq!(cfg.model.detector_input, 640);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": { "device": "/dev/video2", "fps": 15, "width": 1280, "height": 720 },
        "session": {
            "confidence_threshold": 0.6,
            "stability_threshold": 8,
            "roi": { "mode": "centered", "area_fraction": 0.25 },
            "tolerance": { "mode": "roi_relative", "factor": 0.1 },
            "budget_secs": 10,
            "output_dir": "/var/lib/settle/captures"
        },
        "model": { "detector_path": "models/yolov8n.onnx", "classifier_path": "models/waste.onnx" }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("SETTLE_CONFIG", file.path());
    std::env::set_var("SETTLE_DEVICE", "1");
    std::env::set_var("SETTLE_STABILITY", "3");
    std::env::set_var("SETTLE_ALLOWED_CLASSES", "39, 41,47");

    let cfg = SettleConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "1");
    assert_eq!(cfg.camera.to_camera_config().device_path(), "/dev/video1");
    assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (1280, 720, 15));
    assert_eq!(cfg.session.confidence_threshold, 0.6);
    assert_eq!(cfg.session.stability_threshold, 3);
    assert_eq!(cfg.session.allowed_class_ids, vec![39, 41, 47]);
    assert_eq!(cfg.session.roi, Some(RoiSpec::centered_quarter()));
    assert_eq!(
        cfg.session.tolerance,
        DistanceTolerance::RoiRelative { factor: 0.1 }
    );
    assert_eq!(cfg.session.budget_secs, 10);
    assert_eq!(cfg.session.frame_budget(15), 150);
    assert_eq!(
        cfg.session.output_dir,
        PathBuf::from("/var/lib/settle/captures")
    );
    assert_eq!(
        cfg.model.detector_path,
        Some(PathBuf::from("models/yolov8n.onnx"))
    );

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[camera]
device = "stub://bench"

[session]
class_preset = "broad"
max_frames = 40
distance_metric = "centers"
reset_on_drift = true

[session.tolerance]
mode = "fixed"
pixels = 25.0
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    let cfg = SettleConfig::load_from(Some(file.path())).expect("load toml");
    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!(cfg.session.allowed_class_ids, ClassPreset::Broad.class_ids());
    assert_eq!(cfg.session.max_frames, Some(40));
    assert_eq!(cfg.session.frame_budget(30), 40);
    assert!(cfg.session.reset_on_drift);
    assert_eq!(cfg.session.tolerance, DistanceTolerance::Fixed { pixels: 25.0 });
}

#[test]
fn env_tolerance_override_switches_to_fixed_pixels() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SETTLE_TOLERANCE_PX", "30");
    std::env::set_var("SETTLE_OUTPUT_DIR", "/tmp/settle-out");
    let cfg = SettleConfig::load().expect("load config");
    assert_eq!(cfg.session.tolerance, DistanceTolerance::Fixed { pixels: 30.0 });
    assert_eq!(cfg.session.output_dir, PathBuf::from("/tmp/settle-out"));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SETTLE_CONFIDENCE", "1.5");
    assert!(SettleConfig::load().is_err());
    clear_env();

    std::env::set_var("SETTLE_STABILITY", "many");
    assert!(SettleConfig::load().is_err());
    clear_env();

    std::env::set_var("SETTLE_ALLOWED_CLASSES", "41,cup");
    assert!(SettleConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "session": { "budget_secs": 0 } }"#)
        .expect("write config");
    assert!(SettleConfig::load_from(Some(file.path())).is_err());

    assert!(SettleConfig::load_from(Some(std::path::Path::new("/nonexistent/settle.json"))).is_err());
}
