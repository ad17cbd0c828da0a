//! Frame ingestion sources.
//!
//! This module provides the sources a stability session reads from:
//! - Camera devices: V4L2 (feature: ingest-v4l2) or a synthetic `stub://` device
//! - Replay of an in-memory frame list (tests, demos)
//!
//! A source is an exclusively owned resource for the lifetime of one session:
//! - `acquire` opens it; failure means the session never starts
//! - `read` yields the next frame, or `None` at end of stream
//! - `release` closes it; the session guarantees exactly one call on every exit path
//!
//! Sources MUST NOT retry failed reads. A read error is reported as-is and the
//! session decides whether it is fatal (first frame) or end of stream.

use anyhow::Result;

use crate::frame::Frame;

pub mod camera;
mod normalize;
pub mod replay;

pub use camera::{CameraConfig, CameraSource, CameraStats};
pub use replay::ReplaySource;

/// Frame source boundary.
pub trait FrameSource {
    /// Short description for logs (device path, "replay", ...).
    fn describe(&self) -> String;

    /// Open the underlying device.
    fn acquire(&mut self) -> Result<()>;

    /// Read the next frame. `Ok(None)` signals end of stream.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Close the underlying device. Must be safe to call after a failed read.
    fn release(&mut self);

    /// Nominal frame rate, or 0 when unknown.
    fn fps(&self) -> u32;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn acquire(&mut self) -> Result<()> {
        (**self).acquire()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn fps(&self) -> u32 {
        (**self).fps()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn acquire(&mut self) -> Result<()> {
        (**self).acquire()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn fps(&self) -> u32 {
        (**self).fps()
    }
}
