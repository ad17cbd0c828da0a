//! Frame container and detector views.
//!
//! - `Frame`: Owned RGB24 pixel buffer produced by a frame source.
//! - `FrameView`: A rectangular region of a frame that a detector runs against.
//!
//! Detectors never receive a `Frame` directly. The session hands them a
//! `FrameView` (the whole frame in unscoped mode, the ROI in ROI-scoped mode),
//! and the view feeds them tightly packed pixels for exactly that region.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::borrow::Cow;

use crate::detect::{Detection, DetectorBackend};
use crate::Rect;

/// Bytes per pixel of every frame (packed RGB24).
pub const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame: owned pixels
// ----------------------------------------------------------------------------

/// One captured frame: packed RGB24 pixels plus dimensions.
pub struct Frame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// 1-based capture sequence number assigned by the source.
    pub index: u64,
}

impl Frame {
    /// Wrap packed RGB24 pixels. Fails when the buffer length does not match
    /// `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
        })
    }

    /// A frame filled with a single color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], index: u64) -> Result<Self> {
        let len = expected_len(width, height)?;
        let mut data = Vec::with_capacity(len);
        for _ in 0..len / CHANNELS {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height, index)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// View of the whole frame.
    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            frame: self,
            region: self.bounds(),
        }
    }

    /// View of a sub-rectangle. The region must lie inside the frame and be non-empty.
    pub fn region_view(&self, region: Rect) -> Result<FrameView<'_>> {
        if region.width == 0 || region.height == 0 {
            return Err(anyhow!("frame region must be non-empty"));
        }
        if !region.fits_within(self.width, self.height) {
            return Err(anyhow!(
                "region {}x{}+{}+{} exceeds frame {}x{}",
                region.width,
                region.height,
                region.x,
                region.y,
                self.width,
                self.height
            ));
        }
        Ok(FrameView {
            frame: self,
            region,
        })
    }

    /// Copy a region of this frame out as an image.
    pub fn crop(&self, region: Rect) -> Result<RgbImage> {
        let view = self.region_view(region)?;
        let pixels = view.pixels().into_owned();
        RgbImage::from_raw(region.width, region.height, pixels)
            .ok_or_else(|| anyhow!("crop buffer does not match {}x{}", region.width, region.height))
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// FrameView: what detectors see
// ----------------------------------------------------------------------------

/// Rectangular view of a frame for inference.
///
/// Coordinates reported by a detector run through a view are local to the
/// view's region; `offset()` gives the translation back to full-frame pixels.
pub struct FrameView<'a> {
    frame: &'a Frame,
    region: Rect,
}

impl<'a> FrameView<'a> {
    pub fn width(&self) -> u32 {
        self.region.width
    }

    pub fn height(&self) -> u32 {
        self.region.height
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    /// Top-left of the region in full-frame coordinates.
    pub fn offset(&self) -> (u32, u32) {
        (self.region.x, self.region.y)
    }

    pub fn is_full_frame(&self) -> bool {
        self.region == self.frame.bounds()
    }

    /// Packed RGB24 pixels of the region. Borrowed when the view covers the whole frame.
    pub fn pixels(&self) -> Cow<'a, [u8]> {
        if self.is_full_frame() {
            return Cow::Borrowed(&self.frame.data);
        }
        let stride = self.frame.width as usize * CHANNELS;
        let row_len = self.region.width as usize * CHANNELS;
        let mut out = Vec::with_capacity(row_len * self.region.height as usize);
        for row in self.region.y..self.region.bottom() {
            let start = row as usize * stride + self.region.x as usize * CHANNELS;
            out.extend_from_slice(&self.frame.data[start..start + row_len]);
        }
        Cow::Owned(out)
    }

    /// Run a detector on this region. Returned boxes are region-local.
    pub fn run_detector<D: DetectorBackend + ?Sized>(
        &self,
        detector: &mut D,
    ) -> Result<Vec<Detection>> {
        let pixels = self.pixels();
        detector.detect(&pixels, self.region.width, self.region.height)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
