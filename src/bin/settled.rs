//! settled - run one stability session against a camera
//!
//! 1. Loads configuration (file named by --config / SETTLE_CONFIG, then env overrides)
//! 2. Opens the camera and the detector model
//! 3. Runs the session until an allow-listed object settles, the budget runs
//!    out, or Ctrl-C is pressed
//! 4. Optionally classifies the captured crop
//! 5. Prints a JSON summary on stdout

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use settle_kernel::ui::Ui;
use settle_kernel::{
    CameraSource, CancelToken, DetectorBackend, ScriptedBackend, Session, SessionOutcome,
    SettleConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "SETTLE_CONFIG")]
    config: Option<PathBuf>,
    /// Camera device: /dev/videoN, a bare device number, or stub://name.
    #[arg(long)]
    device: Option<String>,
    /// Stop after this many frames instead of the time budget.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Directory for the captured crop.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// YOLOv8 ONNX detector model.
    #[arg(long)]
    detector_model: Option<PathBuf>,
    /// Waste classifier ONNX model, applied to the captured crop.
    #[arg(long)]
    classifier_model: Option<PathBuf>,
    /// Terminal output style.
    #[arg(long, value_parser = ["auto", "plain", "pretty"])]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let ui = Ui::from_env(args.ui.as_deref());

    let mut cfg = SettleConfig::load_from(args.config.as_deref())?;
    if let Some(device) = args.device {
        cfg.camera.device = device;
    }
    if let Some(max_frames) = args.max_frames {
        cfg.session.max_frames = Some(max_frames);
    }
    if let Some(dir) = args.output_dir {
        cfg.session.output_dir = dir;
    }
    if let Some(path) = args.detector_model {
        cfg.model.detector_path = Some(path);
    }
    if let Some(path) = args.classifier_model {
        cfg.model.classifier_path = Some(path);
    }

    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        log::info!("cancel requested, stopping at the next frame");
        handler_token.cancel();
    })
    .context("set Ctrl-C handler")?;

    let source = CameraSource::new(cfg.camera.to_camera_config())?;
    let detector = {
        let _stage = ui.stage("load detector");
        open_detector(&cfg)?
    };
    log::info!(
        "settled running. device {}, detector {}, output {}",
        cfg.camera.device,
        detector.name(),
        cfg.session.output_dir.display()
    );

    let session = Session::new(cfg.session.clone(), source, detector)?;
    let outcome = {
        let _stage = ui.stage("watch for a settled object");
        session.run(&token)?
    };
    ui.outcome(&outcome);

    let mut report = serde_json::json!({
        "outcome": outcome.label(),
    });
    match &outcome {
        SessionOutcome::Triggered(result) => {
            report["capture"] = serde_json::to_value(result.summary())?;
            if let Some(path) = &cfg.model.classifier_path {
                let _stage = ui.stage("classify capture");
                let classification = classify(path, &result.crop)?;
                report["classification"] = serde_json::to_value(classification)?;
            }
        }
        SessionOutcome::Exhausted { frames_read } | SessionOutcome::Cancelled { frames_read } => {
            report["frames_read"] = serde_json::json!(frames_read);
        }
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn open_detector(cfg: &SettleConfig) -> Result<Box<dyn DetectorBackend>> {
    match &cfg.model.detector_path {
        Some(path) => open_model_detector(path, cfg.model.detector_input),
        None if cfg.camera.device.starts_with("stub://") => {
            log::warn!("no detector model configured; the stub camera will see nothing");
            Ok(Box::new(ScriptedBackend::default()))
        }
        None => Err(anyhow!(
            "a detector model is required (--detector-model or model.detector_path)"
        )),
    }
}

#[cfg(feature = "backend-tract")]
fn open_model_detector(path: &std::path::Path, input: u32) -> Result<Box<dyn DetectorBackend>> {
    let detector = settle_kernel::detect::TractDetector::new(path, input, input)
        .with_context(|| format!("load detector {}", path.display()))?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "backend-tract"))]
fn open_model_detector(path: &std::path::Path, _input: u32) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "detector model {} requires the backend-tract feature",
        path.display()
    ))
}

#[cfg(feature = "backend-tract")]
fn classify(
    path: &std::path::Path,
    crop: &image::RgbImage,
) -> Result<settle_kernel::Classification> {
    use settle_kernel::Classifier;

    let mut classifier = settle_kernel::detect::TractClassifier::new(path)
        .with_context(|| format!("load classifier {}", path.display()))?;
    let classification = classifier.classify(crop)?;
    log::info!(
        "classified capture as {} ({:.1}%)",
        classification.label,
        classification.confidence * 100.0
    );
    Ok(classification)
}

#[cfg(not(feature = "backend-tract"))]
fn classify(
    path: &std::path::Path,
    _crop: &image::RgbImage,
) -> Result<settle_kernel::Classification> {
    Err(anyhow!(
        "classifier model {} requires the backend-tract feature",
        path.display()
    ))
}
