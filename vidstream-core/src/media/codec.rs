//! Reference frame codec: a tiny header plus zstd-compressed pixels.
//!
//! ## Payload layout
//!
//! ```text
//! width:   u32  (4, little-endian)
//! height:  u32  (4, little-endian)
//! format:  u8   (1, see PixelFormat::to_tag)
//! pixels:  [u8] (zstd frame)
//! ```
//!
//! zstd is lossless, so `quality` only trades CPU for size: quality 100
//! selects level 1 (fastest), quality 0 selects level 11.

use bytes::{BufMut, BytesMut};

use crate::error::StreamError;
use crate::media::types::{EncodedPayload, PixelFormat, RawFrame};
use crate::media::FrameCodec;

/// Encoded header size on the wire.
pub const CODEC_HEADER_SIZE: usize = 9;

/// zstd-based [`FrameCodec`].
#[derive(Debug, Clone, Default)]
pub struct ZstdCodec;

impl ZstdCodec {
    pub fn new() -> Self {
        Self
    }

    /// Map a 0..=100 quality to a zstd compression level.
    pub fn level_for_quality(quality: u8) -> i32 {
        let q = quality.min(100) as i32;
        1 + (100 - q) / 10
    }
}

impl FrameCodec for ZstdCodec {
    fn encode(&self, frame: &RawFrame, quality: u8) -> Result<EncodedPayload, StreamError> {
        if !frame.is_consistent() {
            return Err(StreamError::Encode(format!(
                "buffer is {} bytes, {}x{} {:?} needs {}",
                frame.data.len(),
                frame.width,
                frame.height,
                frame.format,
                frame.expected_len(),
            )));
        }

        let compressed =
            zstd::encode_all(frame.data.as_slice(), Self::level_for_quality(quality))
                .map_err(|e| StreamError::Encode(format!("zstd encode failed: {e}")))?;

        let mut out = BytesMut::with_capacity(CODEC_HEADER_SIZE + compressed.len());
        out.put_u32_le(frame.width);
        out.put_u32_le(frame.height);
        out.put_u8(frame.format.to_tag());
        out.extend_from_slice(&compressed);
        Ok(EncodedPayload::new(out.freeze()))
    }

    fn decode(&self, data: &[u8], max_len: usize) -> Result<RawFrame, StreamError> {
        if data.len() < CODEC_HEADER_SIZE {
            return Err(StreamError::Decode(format!(
                "payload too short: {} < {CODEC_HEADER_SIZE}",
                data.len()
            )));
        }

        let width = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let format = PixelFormat::from_tag(data[8])
            .ok_or_else(|| StreamError::Decode(format!("unknown pixel format tag {}", data[8])))?;

        let expected = format.frame_len(width, height);
        if expected == 0 {
            return Err(StreamError::Decode(format!("empty frame {width}x{height}")));
        }
        if expected > max_len {
            return Err(StreamError::OversizedFrame {
                size: expected,
                max: max_len,
            });
        }

        let pixels = zstd::bulk::decompress(&data[CODEC_HEADER_SIZE..], expected)
            .map_err(|e| StreamError::Decode(format!("zstd decode failed: {e}")))?;
        if pixels.len() != expected {
            return Err(StreamError::Decode(format!(
                "decoded {} bytes, expected {expected}",
                pixels.len()
            )));
        }

        Ok(RawFrame::new(width, height, format, pixels))
    }
}

// ── Tests ────────────────────────────────────────────────────────
