//! Stability tracker.
//!
//! One small state machine per class id: the last accepted box and a count of
//! within-tolerance sightings. The map is owned by the tracker and lives for
//! exactly one session.
//!
//! Per candidate of class `c` with box `B`:
//! - first sighting: store `B` with count 0, no comparison, never a trigger;
//! - distance to the stored box `< tolerance`: count += 1;
//! - otherwise (drift): count is kept, or reset to 0 when `reset_on_drift`;
//! - either way the stored box becomes `B`.
//!
//! A class triggers on the within-tolerance sighting that brings its count to
//! `stability_threshold`. When several classes trigger on the same frame the
//! lowest class id wins.
//!
//! Distances are taken on the raw `f32` boxes without rounding to whole
//! pixels, so a sighting right at the tolerance edge is judged on its exact
//! coordinates.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::config::{DistanceMetric, SessionConfig};
use crate::detect::Detection;
use crate::BBox;

/// Per-class tracking state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackState {
    pub last_bbox: BBox,
    pub stable_count: u32,
}

/// A class that just became stable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trigger {
    pub class_id: u32,
    /// Full-frame box of the triggering sighting.
    pub bbox: BBox,
    pub stable_count: u32,
}

impl DistanceMetric {
    pub fn distance(&self, a: &BBox, b: &BBox) -> f32 {
        match self {
            DistanceMetric::Corners => a.corner_distance(b),
            DistanceMetric::Centers => a.center_distance(b),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StabilityTracker {
    states: BTreeMap<u32, TrackState>,
    tolerance: f32,
    stability_threshold: u32,
    metric: DistanceMetric,
    reset_on_drift: bool,
}

impl StabilityTracker {
    pub fn new(
        tolerance: f32,
        stability_threshold: u32,
        metric: DistanceMetric,
        reset_on_drift: bool,
    ) -> Self {
        Self {
            states: BTreeMap::new(),
            tolerance,
            stability_threshold,
            metric,
            reset_on_drift,
        }
    }

    /// Tracker for a session whose tolerance has been resolved to `tolerance` pixels.
    pub fn from_config(config: &SessionConfig, tolerance: f32) -> Self {
        Self::new(
            tolerance,
            config.stability_threshold,
            config.distance_metric,
            config.reset_on_drift,
        )
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn stability_threshold(&self) -> u32 {
        self.stability_threshold
    }

    /// Feed one frame's candidates (full-frame coordinates, detector order).
    ///
    /// Returns the class that crossed the stability threshold on this frame, if any.
    pub fn observe(&mut self, candidates: &[Detection]) -> Option<Trigger> {
        let tolerance = self.tolerance;
        let threshold = self.stability_threshold;
        let metric = self.metric;
        let reset_on_drift = self.reset_on_drift;

        let mut triggers: BTreeMap<u32, Trigger> = BTreeMap::new();
        for det in candidates {
            let class_id = det.class_id;
            let bbox = det.bbox;
            match self.states.entry(class_id) {
                Entry::Vacant(slot) => {
                    log::debug!("class {} first sighting at {:?}", class_id, bbox);
                    slot.insert(TrackState {
                        last_bbox: bbox,
                        stable_count: 0,
                    });
                }
                Entry::Occupied(mut slot) => {
                    let state = slot.get_mut();
                    let distance = metric.distance(&state.last_bbox, &bbox);
                    state.last_bbox = bbox;
                    if distance < tolerance {
                        state.stable_count = state.stable_count.saturating_add(1);
                        log::debug!(
                            "class {} stable (distance {:.1} < {:.1}), count {}",
                            class_id,
                            distance,
                            tolerance,
                            state.stable_count
                        );
                        if state.stable_count >= threshold {
                            triggers.entry(class_id).or_insert(Trigger {
                                class_id,
                                bbox,
                                stable_count: state.stable_count,
                            });
                        }
                    } else if reset_on_drift {
                        log::warn!(
                            "class {} drifted {:.1} px, count reset from {}",
                            class_id,
                            distance,
                            state.stable_count
                        );
                        state.stable_count = 0;
                    } else {
                        log::debug!(
                            "class {} drifted {:.1} px, count kept at {}",
                            class_id,
                            distance,
                            state.stable_count
                        );
                    }
                }
            }
        }

        triggers.into_values().next()
    }

    pub fn state(&self, class_id: u32) -> Option<&TrackState> {
        self.states.get(&class_id)
    }

    /// Number of classes seen so far.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn reset(&mut self) {
        self.states.clear();
    }
}
