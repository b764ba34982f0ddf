//! # vidstream-receiver: Frame Streaming Receiver
//!
//! Accepts one `vidstream-sender` over TCP, or listens for its datagrams
//! over UDP, validates and decodes every frame, and hands the frames to a
//! [`sink::LogSink`] that reports the rolling frame rate and can dump
//! frames to disk as PPM images.

pub mod config;
pub mod sink;
