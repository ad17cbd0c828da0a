//! Session driver.
//!
//! One session = one pass of the state machine
//! `Running -> Triggered | Exhausted | Cancelled | Faulted`.
//! Faulted is the `Err` side of [`Session::run`].
//!
//! The frame source is held through a lease that releases it on every exit
//! path. The ROI and the distance tolerance are resolved against the first
//! frame and stay fixed for the rest of the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;

use crate::capture::{CaptureWriter, StableResult};
use crate::config::SessionConfig;
use crate::detect::DetectorBackend;
use crate::error::SessionError;
use crate::filter::{CandidateFilter, Roi};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::tracker::StabilityTracker;

/// Cooperative cancellation flag, checked once per frame boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Non-fault terminal states.
#[derive(Debug)]
pub enum SessionOutcome {
    Triggered(StableResult),
    Exhausted { frames_read: u64 },
    Cancelled { frames_read: u64 },
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Triggered(_) => "triggered",
            SessionOutcome::Exhausted { .. } => "exhausted",
            SessionOutcome::Cancelled { .. } => "cancelled",
        }
    }

    pub fn stable_result(&self) -> Option<&StableResult> {
        match self {
            SessionOutcome::Triggered(result) => Some(result),
            _ => None,
        }
    }
}

/// A single stability session over an exclusively owned source and detector.
pub struct Session<S: FrameSource, D: DetectorBackend> {
    config: SessionConfig,
    source: S,
    detector: D,
    writer: CaptureWriter,
}

impl<S: FrameSource, D: DetectorBackend> Session<S, D> {
    pub fn new(config: SessionConfig, source: S, detector: D) -> Result<Self, SessionError> {
        config
            .validate()
            .map_err(|err| SessionError::InvalidConfig(format!("{:#}", err)))?;
        let writer = CaptureWriter::new(config.output_dir.clone());
        Ok(Self {
            config,
            source,
            detector,
            writer,
        })
    }

    /// Run the session to a terminal state.
    pub fn run(self, cancel: &CancelToken) -> Result<SessionOutcome, SessionError> {
        let Session {
            config,
            mut source,
            mut detector,
            writer,
        } = self;

        detector
            .warm_up()
            .map_err(|cause| SessionError::Detector { frame: 0, cause })?;

        source.acquire().map_err(|err| {
            SessionError::SourceUnavailable(err.context(format!("acquire {}", source.describe())))
        })?;
        let lease = SourceLease::new(&mut source);

        let budget = config.frame_budget(lease.source.fps());
        log::info!(
            "Session: started on {} (detector {}, budget {} frames)",
            lease.source.describe(),
            detector.name(),
            budget
        );

        if cancel.is_cancelled() {
            log::info!("Session: cancelled before the first frame");
            return Ok(SessionOutcome::Cancelled { frames_read: 0 });
        }
        let mut frame = match lease.source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(SessionError::SourceUnavailable(anyhow!(
                    "{} produced no frames",
                    lease.source.describe()
                )))
            }
            Err(err) => {
                return Err(SessionError::SourceUnavailable(
                    err.context("read first frame"),
                ))
            }
        };
        let mut frames_read: u64 = 1;
        let mut stage = Stage::resolve(&config, &frame)?;

        loop {
            if let Some(result) = stage.process(&frame, frames_read, &mut detector, &writer)? {
                return Ok(SessionOutcome::Triggered(result));
            }

            if frames_read >= budget {
                log::info!("Session: exhausted after {} frames", frames_read);
                return Ok(SessionOutcome::Exhausted { frames_read });
            }
            if cancel.is_cancelled() {
                log::info!("Session: cancelled after {} frames", frames_read);
                return Ok(SessionOutcome::Cancelled { frames_read });
            }

            frame = match lease.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::warn!("Session: end of stream after {} frames", frames_read);
                    return Ok(SessionOutcome::Exhausted { frames_read });
                }
                Err(err) => {
                    log::warn!(
                        "Session: read failed after {} frames, treating as end of stream: {:#}",
                        frames_read,
                        err
                    );
                    return Ok(SessionOutcome::Exhausted { frames_read });
                }
            };
            frames_read += 1;
        }
    }
}

/// Holds an acquired source and releases it when dropped.
struct SourceLease<'a, S: FrameSource> {
    source: &'a mut S,
}

impl<'a, S: FrameSource> SourceLease<'a, S> {
    fn new(source: &'a mut S) -> Self {
        Self { source }
    }
}

impl<S: FrameSource> Drop for SourceLease<'_, S> {
    fn drop(&mut self) {
        self.source.release();
        log::info!("Session: released {}", self.source.describe());
    }
}

/// Per-session filter and tracker, built once the frame geometry is known.
struct Stage {
    roi: Option<Roi>,
    filter: CandidateFilter,
    tracker: StabilityTracker,
}

impl Stage {
    fn resolve(config: &SessionConfig, first: &Frame) -> Result<Self, SessionError> {
        let roi = config
            .roi
            .as_ref()
            .map(|spec| Roi::resolve(spec, first.width, first.height))
            .transpose()
            .map_err(|err| SessionError::InvalidConfig(format!("{:#}", err)))?;
        let reference_area = roi
            .map(|roi| roi.area())
            .unwrap_or_else(|| first.bounds().area());
        let tolerance = config.tolerance.resolve(reference_area);

        match &roi {
            Some(roi) => log::info!(
                "Session: ROI {}x{}+{}+{}, tolerance {:.1} px",
                roi.rect.width,
                roi.rect.height,
                roi.rect.x,
                roi.rect.y,
                tolerance
            ),
            None => log::info!("Session: full frame, tolerance {:.1} px", tolerance),
        }

        Ok(Self {
            roi,
            filter: CandidateFilter::new(config, roi),
            tracker: StabilityTracker::from_config(config, tolerance),
        })
    }

    /// Detect, filter, and track one frame. Captures on a trigger.
    fn process<D: DetectorBackend>(
        &mut self,
        frame: &Frame,
        frame_number: u64,
        detector: &mut D,
        writer: &CaptureWriter,
    ) -> Result<Option<StableResult>, SessionError> {
        let view = match &self.roi {
            Some(roi) => frame.region_view(roi.rect).map_err(|err| {
                SessionError::InvalidConfig(format!(
                    "ROI no longer fits frame {}: {:#}",
                    frame_number, err
                ))
            })?,
            None => frame.view(),
        };
        let detections = view
            .run_detector(detector)
            .map_err(|cause| SessionError::Detector {
                frame: frame_number,
                cause,
            })?;
        let candidates = self.filter.apply(&detections);
        log::debug!(
            "Session: frame {}: {} detections, {} candidates, {} classes tracked",
            frame_number,
            detections.len(),
            candidates.len(),
            self.tracker.len()
        );

        let Some(trigger) = self.tracker.observe(&candidates) else {
            return Ok(None);
        };
        log::info!(
            "Session: class {} stable on frame {} (count {})",
            trigger.class_id,
            frame_number,
            trigger.stable_count
        );
        writer.capture(frame, &trigger, frame_number).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoiSpec;
    use crate::detect::{Detection, ScriptedBackend};
    use crate::ingest::ReplaySource;
    use crate::BBox;

    /// Cancels the token on its `n`th call. Every call reports `sightings`.
    struct CancellingDetector {
        token: CancelToken,
        cancel_on: u64,
        calls: u64,
        sightings: Vec<Detection>,
    }

    impl CancellingDetector {
        fn new(token: &CancelToken, cancel_on: u64) -> Self {
            Self {
                token: token.clone(),
                cancel_on,
                calls: 0,
                sightings: Vec::new(),
            }
        }
    }

    impl DetectorBackend for CancellingDetector {
        fn name(&self) -> &'static str {
            "cancelling"
        }

        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> anyhow::Result<Vec<Detection>> {
            self.calls += 1;
            if self.calls == self.cancel_on {
                self.token.cancel();
            }
            Ok(self.sightings.clone())
        }
    }

    /// Counts warm-up calls.
    #[derive(Default)]
    struct WarmUpCounter {
        warm_ups: u32,
    }

    impl DetectorBackend for WarmUpCounter {
        fn name(&self) -> &'static str {
            "warm-up-counter"
        }

        fn warm_up(&mut self) -> anyhow::Result<()> {
            self.warm_ups += 1;
            Ok(())
        }

        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> anyhow::Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    fn config(output_dir: &std::path::Path) -> SessionConfig {
        SessionConfig {
            output_dir: output_dir.to_path_buf(),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn cancel_before_start_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::blank(32, 24, 5, 30).unwrap();
        let token = CancelToken::new();
        token.cancel();

        let session = Session::new(config(dir.path()), &mut source, ScriptedBackend::default())
            .unwrap();
        let outcome = session.run(&token).unwrap();

        assert!(matches!(outcome, SessionOutcome::Cancelled { frames_read: 0 }));
        assert_eq!(source.reads(), 0);
        assert_eq!(source.releases(), 1);
    }

    #[test]
    fn cancel_is_observed_at_the_next_frame_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::blank(32, 24, 20, 30).unwrap();
        let token = CancelToken::new();
        let detector = CancellingDetector::new(&token, 3);

        let outcome = Session::new(config(dir.path()), &mut source, detector)
            .unwrap()
            .run(&token)
            .unwrap();

        assert!(matches!(outcome, SessionOutcome::Cancelled { frames_read: 3 }));
        assert_eq!(source.reads(), 3);
        assert_eq!(source.releases(), 1);
    }

    #[test]
    fn zero_fps_source_uses_fallback_rate() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::blank(32, 24, 50, 0).unwrap();
        let cfg = SessionConfig {
            budget_secs: 1,
            fallback_fps: 4,
            ..config(dir.path())
        };

        let outcome = Session::new(cfg, &mut source, ScriptedBackend::default())
            .unwrap()
            .run(&CancelToken::new())
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Exhausted { frames_read: 4 }));
    }

    #[test]
    fn end_of_stream_after_first_frame_is_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::blank(32, 24, 2, 30).unwrap();

        let outcome = Session::new(config(dir.path()), &mut source, ScriptedBackend::default())
            .unwrap()
            .run(&CancelToken::new())
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Exhausted { frames_read: 2 }));
        assert_eq!(source.releases(), 1);
    }

    #[test]
    fn empty_source_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::new(Vec::new(), 30);

        let err = Session::new(config(dir.path()), &mut source, ScriptedBackend::default())
            .unwrap()
            .run(&CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, SessionError::SourceUnavailable(_)));
        assert_eq!(source.releases(), 1);
    }

    #[test]
    fn roi_larger_than_frame_faults_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::blank(32, 24, 5, 30).unwrap();
        let cfg = SessionConfig {
            roi: Some(RoiSpec::Rect {
                x: 0,
                y: 0,
                width: 64,
                height: 64,
            }),
            ..config(dir.path())
        };

        let err = Session::new(cfg, &mut source, ScriptedBackend::default())
            .unwrap()
            .run(&CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
        assert_eq!(source.releases(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let source = ReplaySource::blank(32, 24, 1, 30).unwrap();
        let cfg = SessionConfig {
            allowed_class_ids: Vec::new(),
            ..SessionConfig::default()
        };
        let err = Session::new(cfg, source, ScriptedBackend::default())
            .err()
            .expect("empty allow-list is invalid");
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }

    #[test]
    fn trigger_reports_session_frame_number() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::blank(320, 240, 10, 30).unwrap();
        let cup = Detection::new(41, 0.9, BBox::new(100.0, 100.0, 150.0, 150.0));
        let cfg = SessionConfig {
            stability_threshold: 2,
            ..config(dir.path())
        };

        let outcome = Session::new(cfg, &mut source, ScriptedBackend::repeating(vec![cup], 10))
            .unwrap()
            .run(&CancelToken::new())
            .unwrap();
        let result = outcome.stable_result().expect("triggered");
        assert_eq!(result.frame_index, 3);
        assert_eq!(source.reads(), 3);
        assert_eq!(outcome.label(), "triggered");
    }

    #[test]
    fn trigger_on_the_cancelling_frame_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::blank(320, 240, 10, 30).unwrap();
        let token = CancelToken::new();
        let mut detector = CancellingDetector::new(&token, 3);
        detector.sightings = vec![Detection::new(
            41,
            0.9,
            BBox::new(100.0, 100.0, 150.0, 150.0),
        )];
        let cfg = SessionConfig {
            stability_threshold: 2,
            ..config(dir.path())
        };

        let outcome = Session::new(cfg, &mut source, detector)
            .unwrap()
            .run(&token)
            .unwrap();

        assert!(token.is_cancelled());
        let result = outcome.stable_result().expect("trigger beats the pending cancel");
        assert_eq!(result.frame_index, 3);
        assert_eq!(source.reads(), 3);
        assert_eq!(source.releases(), 1);
    }

    #[test]
    fn session_warms_the_detector_up_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ReplaySource::blank(32, 24, 4, 30).unwrap();
        let mut detector = WarmUpCounter::default();

        let outcome = Session::new(config(dir.path()), &mut source, &mut detector)
            .unwrap()
            .run(&CancelToken::new())
            .unwrap();

        assert!(matches!(outcome, SessionOutcome::Exhausted { frames_read: 4 }));
        assert_eq!(detector.warm_ups, 1);
    }
}
