//! Candidate filter: raw detections in, trackable candidates out.
//!
//! A detection becomes a candidate when it
//! 1. belongs to an allow-listed class,
//! 2. scores strictly above the confidence threshold,
//! 3. has a well-formed box (finite, positive width and height),
//! 4. in ROI-scoped mode, covers at least `size_ratio_threshold` of the ROI area.
//!
//! In ROI-scoped mode the detector ran on the ROI sub-image, so boxes are
//! translated back to full-frame coordinates before anything else sees them.
//!
//! Boxes stay `f32` throughout; areas are never computed on truncated pixels.

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;

use crate::config::{RoiSpec, SessionConfig};
use crate::detect::Detection;
use crate::Rect;

/// Region of interest resolved against concrete frame dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Roi {
    pub rect: Rect,
}

impl Roi {
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }

    /// Resolve a configured ROI for a `frame_width` x `frame_height` frame.
    pub fn resolve(spec: &RoiSpec, frame_width: u32, frame_height: u32) -> Result<Self> {
        if frame_width == 0 || frame_height == 0 {
            return Err(anyhow!("cannot place an ROI in an empty frame"));
        }
        let rect = match *spec {
            RoiSpec::Centered { area_fraction } => {
                let (w, h) = (frame_width as f64, frame_height as f64);
                let roi_area = w * h * area_fraction as f64;
                let roi_width = ((roi_area * w / h).sqrt().floor() as u32).min(frame_width);
                let roi_height = ((roi_width as f64 * h / w).floor() as u32).min(frame_height);
                Rect::new(
                    (frame_width - roi_width) / 2,
                    (frame_height - roi_height) / 2,
                    roi_width,
                    roi_height,
                )
            }
            RoiSpec::Rect {
                x,
                y,
                width,
                height,
            } => Rect::new(x, y, width, height),
        };
        if rect.area() == 0 {
            return Err(anyhow!(
                "ROI resolves to an empty region in a {}x{} frame",
                frame_width,
                frame_height
            ));
        }
        if !rect.fits_within(frame_width, frame_height) {
            return Err(anyhow!(
                "ROI {}x{}+{}+{} does not fit in a {}x{} frame",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                frame_width,
                frame_height
            ));
        }
        Ok(Self { rect })
    }

    pub fn area(&self) -> u64 {
        self.rect.area()
    }

    /// Top-left corner, added to ROI-local boxes to get full-frame boxes.
    pub fn offset(&self) -> (f32, f32) {
        (self.rect.x as f32, self.rect.y as f32)
    }
}

/// Class, confidence, and geometry filter for one session.
#[derive(Clone, Debug)]
pub struct CandidateFilter {
    allowed: BTreeSet<u32>,
    confidence_threshold: f32,
    roi: Option<Roi>,
    size_ratio_threshold: f32,
}

impl CandidateFilter {
    /// Build the filter. `roi` is the resolved region when the session is ROI-scoped.
    pub fn new(config: &SessionConfig, roi: Option<Roi>) -> Self {
        Self {
            allowed: config.allowed_class_ids.iter().copied().collect(),
            confidence_threshold: config.confidence_threshold,
            roi,
            size_ratio_threshold: config.size_ratio_threshold,
        }
    }

    pub fn roi(&self) -> Option<&Roi> {
        self.roi.as_ref()
    }

    pub fn allows(&self, class_id: u32) -> bool {
        self.allowed.contains(&class_id)
    }

    /// Minimum candidate area in square pixels (0 in unscoped mode).
    pub fn min_area(&self) -> f32 {
        match &self.roi {
            Some(roi) => (roi.area() as f64 * self.size_ratio_threshold as f64) as f32,
            None => 0.0,
        }
    }

    /// Reduce one frame's raw detections to candidates in full-frame coordinates.
    ///
    /// Detector order is preserved.
    pub fn apply(&self, detections: &[Detection]) -> Vec<Detection> {
        let min_area = self.min_area();
        detections
            .iter()
            .filter(|det| self.allows(det.class_id))
            .filter(|det| det.confidence > self.confidence_threshold)
            .filter(|det| det.bbox.is_well_formed())
            .filter_map(|det| match &self.roi {
                None => Some(det.clone()),
                Some(roi) => {
                    if det.bbox.area() < min_area {
                        log::trace!(
                            "dropping class {} box area {:.0} below {:.0}",
                            det.class_id,
                            det.bbox.area(),
                            min_area
                        );
                        return None;
                    }
                    let (dx, dy) = roi.offset();
                    Some(Detection {
                        bbox: det.bbox.translate(dx, dy),
                        ..det.clone()
                    })
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BBox;

    fn cup(bbox: BBox) -> Detection {
        Detection::new(41, 0.9, bbox)
    }

    #[test]
    fn unscoped_filter_checks_class_and_confidence() {
        let filter = CandidateFilter::new(&SessionConfig::default(), None);
        let bbox = BBox::new(100.0, 100.0, 150.0, 150.0);
        let detections = vec![
            cup(bbox),
            Detection::new(0, 0.99, bbox),  // person: not allow-listed
            Detection::new(39, 0.5, bbox),  // exactly at threshold
            Detection::new(39, 0.51, bbox), // bottle above threshold
            Detection::new(41, 0.9, BBox::new(10.0, 10.0, 10.0, 20.0)),
            Detection::new(41, 0.9, BBox::new(f32::NAN, 10.0, 20.0, 20.0)),
        ];

        let candidates = filter.apply(&detections);
        assert_eq!(
            candidates,
            vec![cup(bbox), Detection::new(39, 0.51, bbox)]
        );
    }

    #[test]
    fn unscoped_filter_keeps_small_boxes() {
        let filter = CandidateFilter::new(&SessionConfig::default(), None);
        let tiny = cup(BBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(filter.apply(&[tiny.clone()]), vec![tiny]);
    }

    #[test]
    fn roi_filter_translates_to_full_frame() {
        let roi = Roi::new(Rect::new(160, 120, 320, 240));
        let filter = CandidateFilter::new(&SessionConfig::roi_scoped(), Some(roi));

        let local = cup(BBox::new(10.0, 20.0, 210.0, 170.0));
        let candidates = filter.apply(&[local]);
        assert_eq!(
            candidates,
            vec![cup(BBox::new(170.0, 140.0, 370.0, 290.0))]
        );
    }

    #[test]
    fn roi_filter_rejects_small_boxes() {
        let roi = Roi::new(Rect::new(0, 0, 200, 100));
        let filter = CandidateFilter::new(&SessionConfig::roi_scoped(), Some(roi));
        assert_eq!(filter.min_area(), 5000.0);

        // 4999 px^2 < 0.25 * 20000
        let small = cup(BBox::new(0.0, 0.0, 49.99, 100.0));
        // exactly a quarter of the ROI
        let quarter = cup(BBox::new(0.0, 0.0, 50.0, 100.0));
        assert_eq!(filter.apply(&[small, quarter.clone()]), vec![quarter]);
    }

    #[test]
    fn centered_roi_matches_quarter_frame() -> Result<()> {
        let roi = Roi::resolve(&RoiSpec::centered_quarter(), 640, 480)?;
        assert_eq!(roi.rect, Rect::new(160, 120, 320, 240));
        assert_eq!(roi.offset(), (160.0, 120.0));
        Ok(())
    }

    #[test]
    fn explicit_roi_must_fit_the_frame() {
        let spec = RoiSpec::Rect {
            x: 600,
            y: 0,
            width: 100,
            height: 100,
        };
        assert!(Roi::resolve(&spec, 640, 480).is_err());

        let spec = RoiSpec::Rect {
            x: 540,
            y: 380,
            width: 100,
            height: 100,
        };
        assert_eq!(
            Roi::resolve(&spec, 640, 480).unwrap().rect,
            Rect::new(540, 380, 100, 100)
        );
    }
}
