//! Captured frame container.
//!
//! - `Frame`: one captured image plus its camera identity and capture time.
//! - `LumaPlane`: single-channel view used by the motion layer.
//!
//! Frames are produced by the capture loop and handed to the broker by value.
//! Consumers that need a frame beyond the call that receives it must clone it.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Default JPEG quality used when frames are shipped to a remote classifier.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ----------------------------------------------------------------------------
// CameraId
// ----------------------------------------------------------------------------

/// Identity of a capture source. Cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(Arc<str>);

impl CameraId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// Pixel layout of a frame's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit interleaved RGB.
    Rgb8,
    /// 8-bit single channel.
    Luma8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Luma8 => 1,
        }
    }
}

/// A single captured image.
#[derive(Clone)]
pub struct Frame {
    camera: CameraId,
    /// Monotonic per-camera capture counter, starting at 1.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
    captured_at: SystemTime,
}

impl Frame {
    /// Build a frame, checking the buffer length against the dimensions.
    pub fn new(
        camera: CameraId,
        sequence: u64,
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} {:?}",
                pixels.len(),
                expected,
                width,
                height,
                format
            ));
        }
        Ok(Self {
            camera,
            sequence,
            width,
            height,
            format,
            pixels,
            captured_at: SystemTime::now(),
        })
    }

    /// Override the capture time (sources that replay recorded frames).
    pub fn with_captured_at(mut self, captured_at: SystemTime) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn camera(&self) -> &CameraId {
        &self.camera
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    /// Convert to a single-channel luminance plane (ITU-R BT.601 weights).
    pub fn luma(&self) -> LumaPlane {
        let data = match self.format {
            PixelFormat::Luma8 => self.pixels.clone(),
            PixelFormat::Rgb8 => self
                .pixels
                .chunks_exact(3)
                .map(|px| {
                    let y = 299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32;
                    ((y + 500) / 1000) as u8
                })
                .collect(),
        };
        LumaPlane {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Encode the frame as JPEG for shipping to an inference endpoint.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let color = match self.format {
            PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
            PixelFormat::Luma8 => ExtendedColorType::L8,
        };
        let mut out = Vec::with_capacity(self.pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode(&self.pixels, self.width, self.height, color)
            .with_context(|| format!("encode frame {} from {} as jpeg", self.sequence, self.camera))?;
        Ok(out)
    }
}

impl fmt::Debug for Frame {
    // Pixel payloads are large; keep them out of debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("camera", &self.camera)
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// LumaPlane
// ----------------------------------------------------------------------------

/// Row-major 8-bit luminance image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LumaPlane {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl LumaPlane {
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Mean luminance over the whole plane, 0.0 for an empty plane.
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&p| p as u64).sum();
        sum as f32 / self.data.len() as f32
    }

    pub fn same_shape(&self, other: &LumaPlane) -> bool {
        self.width == other.width && self.height == other.height
    }
}
