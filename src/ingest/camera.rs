//! Camera frame source.
//!
//! `CameraSource` reads frames from a local capture device:
//! - `stub://...` devices generate synthetic frames (tests, demos, CI)
//! - anything else is opened through V4L2 (feature: ingest-v4l2)
//!
//! A bare device number (e.g. `"1"`) is shorthand for `/dev/video<N>`.

#[cfg(feature = "ingest-v4l2")]
use anyhow::Context;
use anyhow::{anyhow, Result};
#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;

use super::FrameSource;
use crate::frame::Frame;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0"), device number, or "stub://name".
    pub device: String,
    /// Requested frame rate. Also the nominal rate used for the frame budget.
    pub fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            fps: 30,
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    /// Device path with numeric shorthand expanded.
    pub fn device_path(&self) -> String {
        let device = self.device.trim();
        if !device.is_empty() && device.chars().all(|c| c.is_ascii_digit()) {
            format!("/dev/video{}", device)
        } else {
            device.to_string()
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("camera frame size must be non-zero"));
        }
        if config.device.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::Device(DeviceCamera::new(config)),
                })
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                Err(anyhow!(
                    "camera {} requires the ingest-v4l2 feature",
                    config.device_path()
                ))
            }
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        self.stats().device
    }

    fn acquire(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame().map(Some),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame().map(Some),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.disconnect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.disconnect(),
        }
    }

    fn fps(&self) -> u32 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.config.fps,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.active_fps,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
    pub connected: bool,
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("CameraSource: connected to {} (synthetic)", self.config.device);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            log::info!("CameraSource: released {} (synthetic)", self.config.device);
        }
        self.connected = false;
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("camera {} not connected", self.config.device));
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    /// Slowly drifting diagonal gradient.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.config.width as u64, self.config.height as u64);
        let mut pixels = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let base = ((x + y + self.frame_count) % 256) as u8;
                pixels.extend_from_slice(&[base, base / 2, 255 - base]);
            }
        }
        pixels
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
            connected: self.connected,
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 device
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceCamera {
    config: CameraConfig,
    state: Option<DeviceState>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
    active_fps: u32,
    active_format: super::normalize::PixelFormat,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            active_fps: config.fps,
            config,
            state: None,
            frame_count: 0,
            active_format: super::normalize::PixelFormat::Rgb24,
        }
    }

    fn connect(&mut self) -> Result<()> {
        use super::normalize::PixelFormat;
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = self.config.device_path();
        let mut device =
            v4l::Device::with_path(&path).with_context(|| format!("open camera {}", path))?;
        let mut format = device.format().context("read camera format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("CameraSource: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .context("read camera format after set failure")?
            }
        };
        self.active_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {} negotiated unsupported pixel format {}",
                path,
                format.fourcc
            )
        })?;

        if self.config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.fps);
            match device.set_params(&params) {
                Ok(applied) => {
                    let interval = applied.interval;
                    if interval.numerator > 0 {
                        self.active_fps = interval.denominator / interval.numerator;
                    }
                }
                Err(err) => {
                    log::warn!("CameraSource: failed to set fps on {}: {}", path, err);
                }
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create camera buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{} {:?} @ {} fps)",
            path,
            self.active_width,
            self.active_height,
            self.active_format,
            self.active_fps
        );
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.state.take().is_some() {
            log::info!("CameraSource: released {}", self.config.device_path());
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("camera not connected")?;
        let (buf, meta) = state
            .with_mut(|fields| fields.stream.next())
            .context("capture camera frame")?;
        let used = (meta.bytesused as usize).min(buf.len());
        let used = if used == 0 { buf.len() } else { used };
        let pixels = super::normalize::normalize_to_rgb(
            &buf[..used],
            self.active_width,
            self.active_height,
            self.active_format,
        )?;

        self.frame_count += 1;
        Frame::new(
            pixels,
            self.active_width,
            self.active_height,
            self.frame_count,
        )
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device_path(),
            connected: self.state.is_some(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
