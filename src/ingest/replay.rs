//! In-memory replay source.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use super::FrameSource;
use crate::frame::Frame;

/// Replays a fixed list of frames, then reports end of stream.
///
/// Keeps acquire/read/release counters so callers can check how a session
/// used it.
pub struct ReplaySource {
    frames: VecDeque<Frame>,
    fps: u32,
    acquired: bool,
    acquires: u32,
    reads: u64,
    releases: u32,
}

impl ReplaySource {
    pub fn new(frames: Vec<Frame>, fps: u32) -> Self {
        Self {
            frames: frames.into(),
            fps,
            acquired: false,
            acquires: 0,
            reads: 0,
            releases: 0,
        }
    }

    /// `count` solid gray frames of `width` x `height`, indexed from 1.
    pub fn blank(width: u32, height: u32, count: u64, fps: u32) -> Result<Self> {
        let frames = (1..=count)
            .map(|index| Frame::filled(width, height, [128, 128, 128], index))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(frames, fps))
    }

    pub fn acquires(&self) -> u32 {
        self.acquires
    }

    /// Number of `read` calls, including those that hit end of stream.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn releases(&self) -> u32 {
        self.releases
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn describe(&self) -> String {
        format!("replay ({} frames queued)", self.frames.len())
    }

    fn acquire(&mut self) -> Result<()> {
        self.acquires += 1;
        self.acquired = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        self.reads += 1;
        if !self.acquired {
            return Err(anyhow!("replay source read before acquire"));
        }
        Ok(self.frames.pop_front())
    }

    fn release(&mut self) {
        self.releases += 1;
        self.acquired = false;
    }

    fn fps(&self) -> u32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_yields_frames_then_end_of_stream() -> Result<()> {
        let mut source = ReplaySource::blank(8, 4, 2, 10)?;
        source.acquire()?;

        assert_eq!(source.read()?.map(|f| f.index), Some(1));
        assert_eq!(source.read()?.map(|f| f.index), Some(2));
        assert!(source.read()?.is_none());
        assert_eq!(source.reads(), 3);

        source.release();
        assert_eq!(source.releases(), 1);
        Ok(())
    }

    #[test]
    fn replay_requires_acquire() -> Result<()> {
        let mut source = ReplaySource::blank(8, 4, 1, 10)?;
        assert!(source.read().is_err());
        Ok(())
    }
}
