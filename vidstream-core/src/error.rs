//! Domain-specific error types for the streaming pipeline.
//!
//! All fallible operations return `Result<T, StreamError>`. Errors fall into
//! two classes: **per-frame** errors drop the offending frame and the loop
//! continues, while **session-fatal** errors stop the pipeline and are
//! returned from `run()`. See [`StreamError::is_fatal`].

use thiserror::Error;

/// The canonical error type for vidstream.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Per-frame errors ─────────────────────────────────────────
    /// A message did not contain the metadata/payload delimiter.
    #[error("framing error: {0}")]
    Framing(String),

    /// The metadata block was malformed or failed validation.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// A message (or an announced length) exceeds the configured limit.
    #[error("oversized frame: {size} bytes (max {max})")]
    OversizedFrame { size: usize, max: usize },

    /// The codec could not decode a payload.
    #[error("decode error: {0}")]
    Decode(String),

    /// The codec could not encode a frame.
    #[error("encode error: {0}")]
    Encode(String),

    /// The reliable peer took the message off the wire but dropped it.
    #[error("frame rejected by receiver")]
    FrameRejected,

    // ── Session-fatal errors ─────────────────────────────────────
    /// Connect or accept failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The per-frame acknowledgment was missing or carried the wrong byte.
    #[error("acknowledgment error: {0}")]
    Acknowledgment(String),

    /// A read or write on an established link failed.
    #[error("transport I/O error: {0}")]
    TransportIo(#[from] std::io::Error),

    // ── Setup / collaborator errors ──────────────────────────────
    /// The frame source failed or could not be opened.
    #[error("capture error: {0}")]
    Capture(String),

    /// A construction-time parameter is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The frame sink could not consume a frame.
    #[error("sink error: {0}")]
    Sink(String),
}

impl StreamError {
    /// Session-fatal errors terminate the pipeline; everything else is
    /// recovered by dropping the current frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::Connection(_)
                | StreamError::Acknowledgment(_)
                | StreamError::TransportIo(_)
        )
    }

    /// Short, stable label used in log fields and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamError::Framing(_) => "framing",
            StreamError::Metadata(_) => "metadata",
            StreamError::OversizedFrame { .. } => "oversized",
            StreamError::Decode(_) => "decode",
            StreamError::Encode(_) => "encode",
            StreamError::FrameRejected => "rejected",
            StreamError::Connection(_) => "connection",
            StreamError::Acknowledgment(_) => "acknowledgment",
            StreamError::TransportIo(_) => "transport_io",
            StreamError::Capture(_) => "capture",
            StreamError::Config(_) => "config",
            StreamError::Sink(_) => "sink",
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Metadata(e.to_string())
    }
}
