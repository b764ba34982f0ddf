//! On-wire message layout.
//!
//! ## Wire format
//!
//! ```text
//! ┌──────────────────────┬────────────────────┬──────┬───────────────┐
//! │ length: u32 LE       │ metadata (JSON)    │ 0x00 │ payload bytes │
//! │ (stream transports)  │                    │      │               │
//! └──────────────────────┴────────────────────┴──────┴───────────────┘
//! ```
//!
//! [`WireFramer`] builds and splits the `metadata ‖ 0x00 ‖ payload` block.
//! On byte streams [`LengthPrefixCodec`] adds the length prefix and recovers
//! block boundaries; datagram transports carry exactly one block per
//! datagram and need no prefix.

pub mod codec;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::StreamError;
use crate::metadata::FrameMetadata;

pub use codec::{LengthPrefixCodec, StreamItem};

// ── Constants ────────────────────────────────────────────────────

/// Separates the metadata block from the payload.
pub const DELIMITER: u8 = 0x00;

/// Size of the stream length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest UDP payload over IPv4 (65535 − 8 UDP − 20 IP).
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Headroom on top of the raw pixel budget for metadata and codec overhead.
const MESSAGE_HEADROOM: usize = 64 * 1024;

// ── StreamLimits ─────────────────────────────────────────────────

/// Derives sane size ceilings from expected frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    /// Largest message (metadata, delimiter and payload) on the wire.
    pub max_message_size: usize,
    /// Largest raw frame a payload may decode to.
    pub max_frame_len: usize,
}

impl StreamLimits {
    /// Budget for a `width` x `height` frame at up to 4 bytes per pixel.
    pub fn for_dimensions(width: u32, height: u32) -> Self {
        let pixels = (width as usize).saturating_mul(height as usize).saturating_mul(4);
        Self {
            max_message_size: pixels.saturating_add(MESSAGE_HEADROOM),
            max_frame_len: pixels,
        }
    }

    /// Ceiling for datagram transports, sized for 640x480 frames.
    pub fn datagram() -> Self {
        Self::for_dimensions(640, 480).clamped_to_datagram()
    }

    /// Clamp the message ceiling to what one datagram can carry. The
    /// decoded frame ceiling is unchanged.
    pub fn clamped_to_datagram(self) -> Self {
        Self {
            max_message_size: self.max_message_size.min(MAX_DATAGRAM_SIZE),
            ..self
        }
    }

    /// Check declared frame dimensions against the decoded frame ceiling,
    /// assuming at least one byte per pixel.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), StreamError> {
        let size = (width as usize).saturating_mul(height as usize);
        if size > self.max_frame_len {
            return Err(StreamError::OversizedFrame {
                size,
                max: self.max_frame_len,
            });
        }
        Ok(())
    }
}

// ── WireFramer ───────────────────────────────────────────────────

/// Combines metadata and payload into one transmissible block and back.
#[derive(Debug, Clone)]
pub struct WireFramer {
    max_message_size: usize,
}

impl WireFramer {
    /// Framer for byte-stream transports.
    pub fn new(limits: StreamLimits) -> Self {
        Self {
            max_message_size: limits.max_message_size,
        }
    }

    /// Framer for datagram transports; every block must fit one datagram.
    pub fn for_datagram(limits: StreamLimits) -> Result<Self, StreamError> {
        if limits.max_message_size > MAX_DATAGRAM_SIZE {
            return Err(StreamError::Config(format!(
                "datagram message ceiling {} exceeds {MAX_DATAGRAM_SIZE}",
                limits.max_message_size
            )));
        }
        Ok(Self::new(limits))
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Build `metadata ‖ 0x00 ‖ payload`.
    pub fn encode(&self, metadata: &FrameMetadata, payload: &[u8]) -> Result<Bytes, StreamError> {
        if !metadata.describes(payload) {
            return Err(StreamError::Metadata(format!(
                "metadata frame_size {} does not match payload of {} bytes",
                metadata.frame_size,
                payload.len()
            )));
        }

        let meta = metadata.to_bytes()?;
        let total = meta.len() + 1 + payload.len();
        if total > self.max_message_size {
            return Err(StreamError::OversizedFrame {
                size: total,
                max: self.max_message_size,
            });
        }

        let mut out = BytesMut::with_capacity(total);
        out.extend_from_slice(&meta);
        out.put_u8(DELIMITER);
        out.extend_from_slice(payload);
        Ok(out.freeze())
    }

    /// Split a block into validated metadata and the payload that follows.
    ///
    /// Malformed input is rejected whole; no partial recovery is attempted.
    pub fn decode(&self, block: Bytes) -> Result<(FrameMetadata, Bytes), StreamError> {
        if block.len() > self.max_message_size {
            return Err(StreamError::OversizedFrame {
                size: block.len(),
                max: self.max_message_size,
            });
        }

        let split = block
            .iter()
            .position(|&b| b == DELIMITER)
            .ok_or_else(|| {
                StreamError::Framing(format!("no delimiter in {} byte message", block.len()))
            })?;

        let metadata = FrameMetadata::parse(&block[..split])?;
        let payload = block.slice(split + 1..);
        if !metadata.describes(&payload) {
            return Err(StreamError::Metadata(format!(
                "frame_size {} but payload is {} bytes",
                metadata.frame_size,
                payload.len()
            )));
        }

        Ok((metadata, payload))
    }
}

// ── Tests ────────────────────────────────────────────────────────
