//! Capture & handoff: crop the triggering box out of the current frame,
//! persist it as a JPEG, and package the session result.

use image::{ImageFormat, RgbImage};
use serde::Serialize;
use std::path::PathBuf;

use crate::detect::{artifact_name, class_name};
use crate::error::SessionError;
use crate::frame::Frame;
use crate::tracker::Trigger;
use crate::{BBox, Rect};

/// Terminal artifact of a triggered session.
#[derive(Debug, Clone)]
pub struct StableResult {
    pub class_id: u32,
    pub class_name: String,
    /// Full-frame box of the triggering sighting.
    pub bbox: BBox,
    /// Integer frame region the crop was taken from.
    pub crop_region: Rect,
    pub crop: RgbImage,
    pub saved_path: PathBuf,
    /// 1-based number of the session frame that triggered.
    pub frame_index: u64,
    pub stable_count: u32,
}

/// JSON-friendly view of a [`StableResult`] (no pixels).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSummary {
    pub class_id: u32,
    pub class_name: String,
    pub bbox: BBox,
    pub crop_region: Rect,
    pub saved_path: PathBuf,
    pub frame_index: u64,
    pub stable_count: u32,
}

impl StableResult {
    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            class_id: self.class_id,
            class_name: self.class_name.clone(),
            bbox: self.bbox,
            crop_region: self.crop_region,
            saved_path: self.saved_path.clone(),
            frame_index: self.frame_index,
            stable_count: self.stable_count,
        }
    }
}

/// Writes stable crops to `<output_dir>/stable_frame_<name>.jpg`.
///
/// Paths are deterministic per class; a later capture of the same class
/// overwrites the earlier file.
#[derive(Debug, Clone)]
pub struct CaptureWriter {
    output_dir: PathBuf,
}

impl CaptureWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, class_id: u32) -> PathBuf {
        self.output_dir
            .join(format!("stable_frame_{}.jpg", artifact_name(class_id)))
    }

    /// Crop `trigger.bbox` out of `frame` and persist it.
    pub fn capture(
        &self,
        frame: &Frame,
        trigger: &Trigger,
        frame_index: u64,
    ) -> Result<StableResult, SessionError> {
        let region = Rect::from_bbox_clamped(&trigger.bbox, frame.width, frame.height)
            .ok_or_else(|| {
                SessionError::Capture(format!(
                    "box {:?} does not overlap the {}x{} frame",
                    trigger.bbox, frame.width, frame.height
                ))
            })?;
        let crop = frame
            .crop(region)
            .map_err(|err| SessionError::Capture(format!("{:#}", err)))?;

        std::fs::create_dir_all(&self.output_dir).map_err(|err| {
            SessionError::PersistenceFailure {
                path: self.output_dir.clone(),
                cause: anyhow::Error::new(err).context("create output directory"),
            }
        })?;
        let path = self.path_for(trigger.class_id);
        crop.save_with_format(&path, ImageFormat::Jpeg)
            .map_err(|err| SessionError::PersistenceFailure {
                path: path.clone(),
                cause: anyhow::Error::new(err).context("encode jpeg"),
            })?;

        log::info!(
            "captured class {} ({}x{} crop) to {}",
            trigger.class_id,
            region.width,
            region.height,
            path.display()
        );

        Ok(StableResult {
            class_id: trigger.class_id,
            class_name: class_name(trigger.class_id)
                .map(str::to_string)
                .unwrap_or_else(|| artifact_name(trigger.class_id)),
            bbox: trigger.bbox,
            crop_region: region,
            crop,
            saved_path: path,
            frame_index,
            stable_count: trigger.stable_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(class_id: u32, bbox: BBox) -> Trigger {
        Trigger {
            class_id,
            bbox,
            stable_count: 5,
        }
    }

    #[test]
    fn capture_crops_and_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("captures");
        let writer = CaptureWriter::new(&out);
        let frame = Frame::filled(640, 480, [200, 30, 30], 6).unwrap();

        let result = writer
            .capture(&frame, &trigger(41, BBox::new(100.0, 100.0, 150.0, 150.0)), 6)
            .unwrap();

        assert_eq!(result.class_id, 41);
        assert_eq!(result.class_name, "cup");
        assert_eq!(result.crop.dimensions(), (50, 50));
        assert_eq!(result.saved_path, out.join("stable_frame_cup.jpg"));
        assert_eq!(result.frame_index, 6);
        let reloaded = image::open(&result.saved_path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (50, 50));
    }

    #[test]
    fn crop_truncates_then_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaptureWriter::new(dir.path());
        let frame = Frame::filled(64, 48, [0, 0, 0], 1).unwrap();

        let result = writer
            .capture(&frame, &trigger(39, BBox::new(10.9, -4.0, 80.0, 20.7)), 1)
            .unwrap();
        assert_eq!(result.crop.dimensions(), (54, 20));
        assert_eq!(result.summary().crop_region, Rect::new(10, 0, 54, 20));
    }

    #[test]
    fn multi_word_names_become_file_safe() {
        let writer = CaptureWriter::new("/tmp/captures");
        assert_eq!(
            writer.path_for(40),
            PathBuf::from("/tmp/captures/stable_frame_wine_glass.jpg")
        );
        assert_eq!(
            writer.path_for(999),
            PathBuf::from("/tmp/captures/stable_frame_class_999.jpg")
        );
    }

    #[test]
    fn box_outside_frame_is_a_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaptureWriter::new(dir.path());
        let frame = Frame::filled(64, 48, [0, 0, 0], 1).unwrap();

        let err = writer
            .capture(&frame, &trigger(41, BBox::new(100.0, 100.0, 150.0, 150.0)), 1)
            .unwrap_err();
        assert!(matches!(err, SessionError::Capture(_)));
    }

    #[test]
    fn unwritable_output_dir_is_a_persistence_failure() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let writer = CaptureWriter::new(file.path());
        let frame = Frame::filled(64, 48, [0, 0, 0], 1).unwrap();

        let err = writer
            .capture(&frame, &trigger(41, BBox::new(0.0, 0.0, 10.0, 10.0)), 1)
            .unwrap_err();
        match err {
            SessionError::PersistenceFailure { path, .. } => assert_eq!(path, file.path()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
