//! # vidstream-core
//!
//! Core library for streaming live frames between a sender and a receiver.
//!
//! This crate contains:
//! - **Queue**: `BoundedFrameQueue`, a fixed-capacity buffer that never blocks producers
//! - **Metadata**: `FrameMetadata`, the validated JSON sidecar sent with each payload
//! - **Framing**: `WireFramer` and `LengthPrefixCodec` for the on-wire message layout
//! - **Transport**: `SenderEndpoint` / `ReceiverEndpoint` over TCP (acknowledged) or UDP
//! - **Media**: capture, codec and display traits plus small reference implementations
//! - **Pipeline**: `SenderPipeline` and `ReceiverPipeline`, two Tokio tasks each
//! - **Error**: `StreamError`, a `thiserror`-based taxonomy split into per-frame and fatal

pub mod error;
pub mod framing;
pub mod media;
pub mod metadata;
pub mod pipeline;
pub mod queue;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::StreamError;
pub use framing::{
    DELIMITER, LengthPrefixCodec, MAX_DATAGRAM_SIZE, StreamItem, StreamLimits, WireFramer,
};
pub use media::{
    DecodedFrame, EncodedPayload, FrameCodec, FrameSink, FrameSource, PixelFormat, RawFileSource,
    RawFrame, TestPatternSource, ZstdCodec,
};
pub use metadata::FrameMetadata;
pub use pipeline::{
    PipelineState, PipelineStats, ReceiverConfig, ReceiverPipeline, SenderConfig, SenderPipeline,
    StatsSnapshot, StopHandle, ThroughputMeter,
};
pub use queue::{BoundedFrameQueue, OverflowPolicy, PushOutcome};
pub use transport::{
    AckOutcome, EndpointConfig, ReceiverEndpoint, SenderEndpoint, TransportKind,
};
