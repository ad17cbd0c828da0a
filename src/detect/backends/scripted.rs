use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Backend that replays a fixed script of per-frame detection lists.
///
/// Call `n` returns the `n`-th scripted list; once the script is drained every
/// further call returns an empty list. Used by tests and the synthetic demo.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: VecDeque<Vec<Detection>>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Vec<Detection>>,
    {
        Self {
            script: frames.into_iter().collect(),
            calls: 0,
        }
    }

    /// The same detection list for `frames` consecutive calls.
    pub fn repeating(detections: Vec<Detection>, frames: usize) -> Self {
        Self::new(std::iter::repeat(detections).take(frames))
    }

    /// Number of `detect` calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<Detection>> {
        self.calls += 1;
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
