//! Settle Kernel
//!
//! Turns a noisy, frame-by-frame object detector into a single reliable
//! "an object of interest has settled in front of the camera" event.
//!
//! # Pipeline
//!
//! One frame at a time, strictly in order:
//!
//! 1. **Frame source** (`ingest`): acquires the camera and yields frames.
//! 2. **Detector adapter** (`detect`): turns a frame (or its ROI) into raw detections.
//! 3. **Candidate filter** (`filter`): class allow-list, confidence, ROI translation, size ratio.
//! 4. **Stability tracker** (`tracker`): per-class bbox drift bookkeeping and the trigger.
//! 5. **Capture & handoff** (`capture`): crops the current frame and persists it.
//!
//! The session driver (`session`) owns the loop, the frame budget, cancellation,
//! and the guaranteed release of the frame source on every exit path.
//!
//! # Module Structure
//!
//! - `frame`: Owned RGB frames and detector views
//! - `ingest`: Frame sources (camera, replay)
//! - `detect`: Detector backends, class tables, classification boundary
//! - `filter`, `tracker`, `capture`, `session`: the stability pipeline
//! - `config`: File + environment configuration
//! - Core types: `BBox`, `Rect`

use serde::{Deserialize, Serialize};

pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod filter;
pub mod frame;
pub mod ingest;
pub mod session;
pub mod tracker;
pub mod ui;

pub use capture::{CaptureSummary, CaptureWriter, StableResult};
pub use config::{
    CameraSettings, ClassPreset, DistanceMetric, DistanceTolerance, ModelSettings, RoiSpec,
    SessionConfig, SettleConfig,
};
pub use detect::{
    class_name, Classification, Classifier, Detection, DetectorBackend, ScriptedBackend,
    BROAD_TRASH_CLASS_IDS, COCO_CLASS_NAMES, TRASH_CLASS_IDS, WASTE_CATEGORIES,
};
pub use error::SessionError;
pub use filter::{CandidateFilter, Roi};
pub use frame::{Frame, FrameView};
pub use ingest::{CameraConfig, CameraSource, FrameSource, ReplaySource};
pub use session::{CancelToken, Session, SessionOutcome};
pub use tracker::{StabilityTracker, TrackState, Trigger};

// -------------------- Geometry --------------------

/// Axis-aligned bounding box in pixel coordinates (`x1,y1` top-left, `x2,y2` bottom-right).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Shift the box by an offset, e.g. from ROI-local to full-frame coordinates.
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Finite coordinates and strictly positive width and height.
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    /// Euclidean norm of the difference of the two `(x1, y1, x2, y2)` vectors.
    pub fn corner_distance(&self, other: &Self) -> f32 {
        let dx1 = self.x1 - other.x1;
        let dy1 = self.y1 - other.y1;
        let dx2 = self.x2 - other.x2;
        let dy2 = self.y2 - other.y2;
        (dx1 * dx1 + dy1 * dy1 + dx2 * dx2 + dy2 * dy2).sqrt()
    }

    /// Euclidean distance between box centers.
    pub fn center_distance(&self, other: &Self) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    pub fn intersection_area(&self, other: &Self) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    /// Intersection-over-union; 0 when the union is empty.
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Integer pixel rectangle (ROI and crop regions).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// True when the rectangle lies entirely inside a `width` x `height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Integer crop region of a box: coordinates truncated toward zero, then
    /// clamped to the frame. `None` when nothing of the box is left.
    pub fn from_bbox_clamped(bbox: &BBox, width: u32, height: u32) -> Option<Self> {
        let clamp = |v: f32, max: u32| -> u32 {
            if !v.is_finite() || v <= 0.0 {
                0
            } else {
                (v.trunc() as u64).min(max as u64) as u32
            }
        };
        let x1 = clamp(bbox.x1, width);
        let y1 = clamp(bbox.y1, height);
        let x2 = clamp(bbox.x2, width);
        let y2 = clamp(bbox.y2, height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::new(x1, y1, x2 - x1, y2 - y1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_distance_matches_four_vector_norm() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(3.0, 4.0, 10.0, 10.0);
        assert_eq!(a.corner_distance(&b), 5.0);
        assert_eq!(a.corner_distance(&a), 0.0);
    }

    #[test]
    fn center_distance_ignores_size_change() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(-5.0, -5.0, 15.0, 15.0);
        assert_eq!(a.center_distance(&b), 0.0);
        assert!(a.corner_distance(&b) > 0.0);
    }

    #[test]
    fn malformed_boxes_are_detected() {
        assert!(BBox::new(0.0, 0.0, 1.0, 1.0).is_well_formed());
        assert!(!BBox::new(0.0, 0.0, 0.0, 1.0).is_well_formed());
        assert!(!BBox::new(5.0, 0.0, 1.0, 1.0).is_well_formed());
        assert!(!BBox::new(f32::NAN, 0.0, 1.0, 1.0).is_well_formed());
        assert!(!BBox::new(0.0, 0.0, f32::INFINITY, 1.0).is_well_formed());
    }

    #[test]
    fn crop_rect_truncates_and_clamps() {
        let rect = Rect::from_bbox_clamped(&BBox::new(10.7, -3.0, 700.2, 20.9), 640, 480)
            .expect("crop rect");
        assert_eq!(rect, Rect::new(10, 0, 630, 20));

        assert!(Rect::from_bbox_clamped(&BBox::new(700.0, 0.0, 800.0, 10.0), 640, 480).is_none());
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }
}
