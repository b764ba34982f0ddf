//! External collaborators of the pipelines: capture, codec and display.
//!
//! The pipelines only see the three traits below. This module also ships
//! one small implementation of each so the binaries run end to end:
//!
//! | Trait         | Implementation                       |
//! |---------------|--------------------------------------|
//! | `FrameSource` | `TestPatternSource`, `RawFileSource` |
//! | `FrameCodec`  | `ZstdCodec`                          |
//! | `FrameSink`   | provided by the receiver binary      |

pub mod codec;
pub mod source;
pub mod types;

use async_trait::async_trait;

use crate::error::StreamError;

pub use codec::ZstdCodec;
pub use source::{RawFileSource, TestPatternSource};
pub use types::{DecodedFrame, EncodedPayload, PixelFormat, RawFrame, now_micros};

/// Produces raw frames at its native rate.
#[async_trait]
pub trait FrameSource: Send {
    /// Open the underlying device or file.
    async fn open(&mut self) -> Result<(), StreamError>;

    /// Next frame, or `None` at end of stream.
    async fn read(&mut self) -> Result<Option<RawFrame>, StreamError>;

    /// Release the device or file. Called once after the last `read`.
    fn close(&mut self) {}
}

/// Compresses raw frames into payloads and back.
pub trait FrameCodec: Send + Sync {
    /// `quality` is 0..=100, higher meaning a larger, cheaper-to-produce payload.
    fn encode(&self, frame: &RawFrame, quality: u8) -> Result<EncodedPayload, StreamError>;

    /// Decode a payload into a raw frame of at most `max_len` bytes.
    ///
    /// Implementations must check the announced frame size against
    /// `max_len` before allocating, and fail with
    /// [`StreamError::OversizedFrame`] when it is larger.
    fn decode(&self, data: &[u8], max_len: usize) -> Result<RawFrame, StreamError>;
}

/// Consumes decoded frames, typically by showing them.
pub trait FrameSink: Send {
    fn show(&mut self, frame: &DecodedFrame) -> Result<(), StreamError>;

    /// Non-blocking check for a user-requested stop (e.g. a cancel key).
    fn poll_stop(&mut self) -> bool {
        false
    }
}
