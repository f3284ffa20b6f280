use std::fmt;
use std::str::FromStr;

use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A single decoded RGB video frame
///
/// Thin wrapper around an RGB image buffer with the pixel helpers the
/// effects need.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self { buffer: ImageBuffer::new(width, height) }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Get a mutable reference to a pixel at the given coordinates
    pub fn get_pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        &mut self.buffer.get_pixel_mut(x, y).0
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    pub fn as_image_mut(&mut self) -> &mut RgbImage {
        &mut self.buffer
    }

    pub fn into_image(self) -> RgbImage {
        self.buffer
    }

    /// Raw interleaved RGB bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Linear blend `a * (1 - t) + b * t`. Both frames must share dimensions.
    pub fn blend(a: &Frame, b: &Frame, t: f32) -> Frame {
        let t = t.clamp(0.0, 1.0);
        let data = a
            .as_rgb_bytes()
            .iter()
            .zip(b.as_rgb_bytes())
            .map(|(&pa, &pb)| (pa as f32 * (1.0 - t) + pb as f32 * t).round().clamp(0.0, 255.0) as u8)
            .collect();
        Frame {
            buffer: ImageBuffer::from_raw(a.width(), a.height(), data)
                .unwrap_or_else(|| ImageBuffer::new(a.width(), a.height())),
        }
    }
}

/// Read-only properties of an opened video source
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub duration: f64,
    pub codec: String,
}

/// Supported output containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Avi,
    Mov,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [OutputFormat::Mp4, OutputFormat::Avi, OutputFormat::Mov];

    /// Codec tag written into the container
    pub fn fourcc(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4v",
            OutputFormat::Avi => "XVID",
            OutputFormat::Mov => "mp4v",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Avi => "avi",
            OutputFormat::Mov => "mov",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Avi => "video/x-msvideo",
            OutputFormat::Mov => "video/quicktime",
        }
    }

    /// ffmpeg encoder behind both fourccs; the tag is set separately
    pub fn ffmpeg_codec(&self) -> &'static str {
        "mpeg4"
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Mp4
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "avi" => Ok(OutputFormat::Avi),
            "mov" => Ok(OutputFormat::Mov),
            other => Err(ValidationError::UnsupportedFormat { format: other.to_string() }),
        }
    }
}
