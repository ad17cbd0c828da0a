use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::detect::{BROAD_TRASH_CLASS_IDS, TRASH_CLASS_IDS};
use crate::ingest::CameraConfig;

const DEFAULT_DEVICE: &str = "stub://camera";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_STABILITY: u32 = 5;
const DEFAULT_TOLERANCE_PX: f32 = 50.0;
const DEFAULT_ROI_TOLERANCE_FACTOR: f32 = 0.1;
const DEFAULT_SIZE_RATIO: f32 = 0.25;
const DEFAULT_ROI_AREA_FRACTION: f32 = 0.25;
const DEFAULT_BUDGET_SECS: u32 = 5;
const DEFAULT_FALLBACK_FPS: u32 = 30;
const DEFAULT_OUTPUT_DIR: &str = "./test_images";
const DEFAULT_DETECTOR_INPUT: u32 = 640;

// -------------------- Session configuration --------------------

/// How far a box may move between sightings and still count as stable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DistanceTolerance {
    /// Absolute pixel distance.
    Fixed { pixels: f32 },
    /// `sqrt(roi_area) * factor`; the full frame stands in when no ROI is set.
    RoiRelative { factor: f32 },
}

impl DistanceTolerance {
    pub fn fixed() -> Self {
        DistanceTolerance::Fixed {
            pixels: DEFAULT_TOLERANCE_PX,
        }
    }

    pub fn roi_relative() -> Self {
        DistanceTolerance::RoiRelative {
            factor: DEFAULT_ROI_TOLERANCE_FACTOR,
        }
    }

    /// Tolerance in pixels for a monitored region of `reference_area` square pixels.
    pub fn resolve(&self, reference_area: u64) -> f32 {
        match *self {
            DistanceTolerance::Fixed { pixels } => pixels,
            DistanceTolerance::RoiRelative { factor } => {
                ((reference_area as f64).sqrt() * factor as f64) as f32
            }
        }
    }
}

impl Default for DistanceTolerance {
    fn default() -> Self {
        Self::fixed()
    }
}

/// Distance between two sightings of the same class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Norm of the `(x1, y1, x2, y2)` difference vector.
    #[default]
    Corners,
    /// Distance between box centers.
    Centers,
}

/// Region of interest geometry, resolved against the first frame of a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoiSpec {
    /// Centered rectangle covering `area_fraction` of the frame, same aspect ratio.
    Centered { area_fraction: f32 },
    /// Explicit rectangle in full-frame pixels.
    Rect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

impl RoiSpec {
    pub fn centered_quarter() -> Self {
        RoiSpec::Centered {
            area_fraction: DEFAULT_ROI_AREA_FRACTION,
        }
    }
}

/// Named allow-lists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassPreset {
    #[default]
    Trash,
    Broad,
}

impl ClassPreset {
    pub fn class_ids(&self) -> Vec<u32> {
        match self {
            ClassPreset::Trash => TRASH_CLASS_IDS.to_vec(),
            ClassPreset::Broad => BROAD_TRASH_CLASS_IDS.to_vec(),
        }
    }
}

/// Immutable per-session configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub allowed_class_ids: Vec<u32>,
    /// Detections must score strictly above this.
    pub confidence_threshold: f32,
    /// A class triggers once its stable count reaches this value.
    pub stability_threshold: u32,
    pub tolerance: DistanceTolerance,
    pub distance_metric: DistanceMetric,
    /// Reset the stable count to zero when a sighting drifts out of tolerance.
    pub reset_on_drift: bool,
    /// `None` runs the detector on the whole frame (unscoped mode).
    pub roi: Option<RoiSpec>,
    /// ROI-scoped mode only: minimum bbox area as a fraction of the ROI area.
    pub size_ratio_threshold: f32,
    pub budget_secs: u32,
    /// Overrides the time budget with an exact frame count.
    pub max_frames: Option<u64>,
    /// Used when the source does not report a frame rate.
    pub fallback_fps: u32,
    pub output_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allowed_class_ids: TRASH_CLASS_IDS.to_vec(),
            confidence_threshold: DEFAULT_CONFIDENCE,
            stability_threshold: DEFAULT_STABILITY,
            tolerance: DistanceTolerance::default(),
            distance_metric: DistanceMetric::default(),
            reset_on_drift: false,
            roi: None,
            size_ratio_threshold: DEFAULT_SIZE_RATIO,
            budget_secs: DEFAULT_BUDGET_SECS,
            max_frames: None,
            fallback_fps: DEFAULT_FALLBACK_FPS,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl SessionConfig {
    /// ROI-scoped variant of the defaults: centered quarter-frame ROI with an
    /// ROI-relative tolerance.
    pub fn roi_scoped() -> Self {
        Self {
            tolerance: DistanceTolerance::roi_relative(),
            roi: Some(RoiSpec::centered_quarter()),
            ..Self::default()
        }
    }

    /// Number of frames a session may read before it is exhausted.
    pub fn frame_budget(&self, source_fps: u32) -> u64 {
        if let Some(max_frames) = self.max_frames {
            return max_frames;
        }
        let fps = if source_fps == 0 {
            self.fallback_fps
        } else {
            source_fps
        };
        fps as u64 * self.budget_secs as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.allowed_class_ids.is_empty() {
            return Err(anyhow!("allowed_class_ids must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be within 0..=1"));
        }
        match self.tolerance {
            DistanceTolerance::Fixed { pixels } if !(pixels.is_finite() && pixels > 0.0) => {
                return Err(anyhow!("fixed tolerance must be a positive number of pixels"));
            }
            DistanceTolerance::RoiRelative { factor } if !(factor.is_finite() && factor > 0.0) => {
                return Err(anyhow!("roi-relative tolerance factor must be positive"));
            }
            _ => {}
        }
        if !(0.0..=1.0).contains(&self.size_ratio_threshold) {
            return Err(anyhow!("size_ratio_threshold must be within 0..=1"));
        }
        match self.roi {
            Some(RoiSpec::Centered { area_fraction })
                if !(area_fraction > 0.0 && area_fraction <= 1.0) =>
            {
                return Err(anyhow!("roi area_fraction must be within (0, 1]"));
            }
            Some(RoiSpec::Rect { width, height, .. }) if width == 0 || height == 0 => {
                return Err(anyhow!("roi rectangle must be non-empty"));
            }
            _ => {}
        }
        if self.max_frames.is_none() && self.budget_secs == 0 {
            return Err(anyhow!("budget_secs must be greater than zero"));
        }
        if self.fallback_fps == 0 {
            return Err(anyhow!("fallback_fps must be greater than zero"));
        }
        if self.max_frames == Some(0) {
            return Err(anyhow!("max_frames must be greater than zero"));
        }
        Ok(())
    }
}

// -------------------- Application configuration --------------------

#[derive(Debug, Deserialize, Default)]
struct SettleConfigFile {
    camera: Option<CameraConfigFile>,
    session: Option<SessionConfigFile>,
    model: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    allowed_class_ids: Option<Vec<u32>>,
    class_preset: Option<ClassPreset>,
    confidence_threshold: Option<f32>,
    stability_threshold: Option<u32>,
    tolerance: Option<DistanceTolerance>,
    distance_metric: Option<DistanceMetric>,
    reset_on_drift: Option<bool>,
    roi: Option<RoiSpec>,
    size_ratio_threshold: Option<f32>,
    budget_secs: Option<u32>,
    max_frames: Option<u64>,
    fallback_fps: Option<u32>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    detector_path: Option<PathBuf>,
    detector_input: Option<u32>,
    classifier_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SettleConfig {
    pub camera: CameraSettings,
    pub session: SessionConfig,
    pub model: ModelSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub device: String,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub detector_path: Option<PathBuf>,
    /// Square input edge of the detector model.
    pub detector_input: u32,
    pub classifier_path: Option<PathBuf>,
}

impl CameraSettings {
    pub fn to_camera_config(&self) -> CameraConfig {
        CameraConfig {
            device: self.device.clone(),
            fps: self.fps,
            width: self.width,
            height: self.height,
        }
    }
}

impl SettleConfig {
    /// Load from the file named by `SETTLE_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SETTLE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults when `None`), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SettleConfigFile) -> Self {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            fps: camera_file.fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        let session_file = file.session.unwrap_or_default();
        let defaults = SessionConfig::default();
        let allowed_class_ids = session_file.allowed_class_ids.unwrap_or_else(|| {
            session_file
                .class_preset
                .unwrap_or_default()
                .class_ids()
        });
        let session = SessionConfig {
            allowed_class_ids,
            confidence_threshold: session_file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            stability_threshold: session_file
                .stability_threshold
                .unwrap_or(defaults.stability_threshold),
            tolerance: session_file.tolerance.unwrap_or(defaults.tolerance),
            distance_metric: session_file
                .distance_metric
                .unwrap_or(defaults.distance_metric),
            reset_on_drift: session_file
                .reset_on_drift
                .unwrap_or(defaults.reset_on_drift),
            roi: session_file.roi,
            size_ratio_threshold: session_file
                .size_ratio_threshold
                .unwrap_or(defaults.size_ratio_threshold),
            budget_secs: session_file.budget_secs.unwrap_or(defaults.budget_secs),
            max_frames: session_file.max_frames,
            fallback_fps: session_file.fallback_fps.unwrap_or(defaults.fallback_fps),
            output_dir: session_file.output_dir.unwrap_or(defaults.output_dir),
        };

        let model_file = file.model.unwrap_or_default();
        let model = ModelSettings {
            detector_path: model_file.detector_path,
            detector_input: model_file.detector_input.unwrap_or(DEFAULT_DETECTOR_INPUT),
            classifier_path: model_file.classifier_path,
        };

        Self {
            camera,
            session,
            model,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("SETTLE_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(value) = std::env::var("SETTLE_CONFIDENCE") {
            self.session.confidence_threshold = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SETTLE_CONFIDENCE must be a number"))?;
        }
        if let Ok(value) = std::env::var("SETTLE_STABILITY") {
            self.session.stability_threshold = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SETTLE_STABILITY must be a non-negative integer"))?;
        }
        if let Ok(value) = std::env::var("SETTLE_TOLERANCE_PX") {
            let pixels: f32 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SETTLE_TOLERANCE_PX must be a number of pixels"))?;
            self.session.tolerance = DistanceTolerance::Fixed { pixels };
        }
        if let Ok(value) = std::env::var("SETTLE_BUDGET_SECS") {
            self.session.budget_secs = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SETTLE_BUDGET_SECS must be an integer number of seconds"))?;
        }
        if let Ok(dir) = std::env::var("SETTLE_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.session.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(classes) = std::env::var("SETTLE_ALLOWED_CLASSES") {
            let parsed = split_csv(&classes)
                .iter()
                .map(|entry| {
                    entry
                        .parse::<u32>()
                        .map_err(|_| anyhow!("SETTLE_ALLOWED_CLASSES entry '{}' is not a class id", entry))
                })
                .collect::<Result<Vec<_>>>()?;
            if !parsed.is_empty() {
                self.session.allowed_class_ids = parsed;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.model.detector_input == 0 {
            return Err(anyhow!("detector_input must be greater than zero"));
        }
        self.session.validate()
    }
}

fn read_config_file(path: &Path) -> Result<SettleConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
