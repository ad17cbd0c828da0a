use anyhow::Result;

use super::result::Detection;

/// Detector backend trait.
///
/// A backend wraps an external object-detection model. The session only
/// depends on the returned `(class_id, confidence, bbox)` list, never on
/// model internals.
///
/// Pixels are packed RGB24, `width * height * 3` bytes, row-major.
/// Implementations must treat the slice as read-only and must not retain it
/// beyond the call.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one image. Box coordinates are in the image's pixel space.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        (**self).detect(pixels, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for &mut B {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        (**self).detect(pixels, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
