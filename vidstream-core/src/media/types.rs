//! Frame types passed between pipeline stages.
//!
//! [`RawFrame`] is what a capture source produces and a codec decodes back
//! to; [`EncodedPayload`] is the opaque codec output; [`DecodedFrame`] is a
//! raw frame enriched with the wire metadata it arrived with.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw frames. Rows are always tightly packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 3 bytes per pixel: Blue, Green, Red (typical camera output).
    Bgr8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 1 byte per pixel luminance.
    Gray8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Stable one-byte tag used by the codec header.
    pub const fn to_tag(self) -> u8 {
        match self {
            PixelFormat::Bgr8 => 0,
            PixelFormat::Rgb8 => 1,
            PixelFormat::Rgba8 => 2,
            PixelFormat::Gray8 => 3,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PixelFormat::Bgr8),
            1 => Some(PixelFormat::Rgb8),
            2 => Some(PixelFormat::Rgba8),
            3 => Some(PixelFormat::Gray8),
            _ => None,
        }
    }

    /// Buffer size of a `width` x `height` image in this format.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// An uncompressed image plus its capture time.
///
/// `data` holds `height` rows of `width * bytes_per_pixel` bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data.
    pub data: Vec<u8>,
    /// Capture time in microseconds since the UNIX epoch.
    pub timestamp_us: u64,
}

impl RawFrame {
    /// Build a frame stamped with the current wall-clock time.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
            timestamp_us: now_micros(),
        }
    }

    /// Byte size the pixel buffer should have for these dimensions.
    pub fn expected_len(&self) -> usize {
        self.format.frame_len(self.width, self.height)
    }

    /// `true` when `data` matches the declared dimensions.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.expected_len()
    }

    /// Returns the pixel bytes at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        &self.data[offset..offset + bpp]
    }
}

// ── EncodedPayload ───────────────────────────────────────────────

/// Opaque codec output. Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload(Bytes);

impl EncodedPayload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for EncodedPayload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// ── DecodedFrame ─────────────────────────────────────────────────

/// A received frame after decode, as handed to the display sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Sender-assigned sequence number.
    pub sequence: u64,
    /// Sender capture timestamp (epoch microseconds).
    pub sent_timestamp_us: u64,
    /// Size of the encoded payload on the wire.
    pub encoded_size: usize,
    /// The decoded image.
    pub frame: RawFrame,
}

/// Current wall-clock time in microseconds since the UNIX epoch.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
