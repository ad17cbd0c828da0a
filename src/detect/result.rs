use serde::{Deserialize, Serialize};

use crate::BBox;

/// One raw detection as returned by a detector backend.
///
/// `bbox` is in the pixel space of the image the detector was run on: the full
/// frame in unscoped mode, the ROI in ROI-scoped mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    /// Detector score in `0..=1`.
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

/// Class-wise greedy non-maximum suppression.
///
/// Keeps the highest-confidence box of every overlapping group of the same
/// class; a box is suppressed when its IoU with a kept box of its class
/// exceeds `iou_threshold`. Output is ordered by descending confidence.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nms_suppresses_overlapping_same_class() {
        let strong = Detection::new(41, 0.9, BBox::new(0.0, 0.0, 100.0, 100.0));
        let weak = Detection::new(41, 0.6, BBox::new(5.0, 5.0, 100.0, 100.0));
        let other_class = Detection::new(39, 0.5, BBox::new(5.0, 5.0, 100.0, 100.0));
        let far = Detection::new(41, 0.7, BBox::new(300.0, 300.0, 350.0, 350.0));

        let kept = non_maximum_suppression(
            vec![weak, other_class.clone(), strong.clone(), far.clone()],
            0.45,
        );
        assert_eq!(kept, vec![strong, far, other_class]);
    }
}
