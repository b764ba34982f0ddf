//! # vidstream-sender: Frame Streaming Sender
//!
//! Reads frames from a capture source (a synthetic test pattern or a raw
//! video file), compresses them with zstd and streams them to a
//! `vidstream-receiver` over TCP (acknowledged) or UDP.
//!
//! Everything runtime-specific lives in [`config`]; the pipeline itself is
//! `vidstream_core::SenderPipeline`.

pub mod config;
