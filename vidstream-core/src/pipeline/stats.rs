//! Pipeline counters.
//!
//! Lock-free and observational only; no pipeline decision reads them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::StreamError;

/// Live counters shared by the stages of one pipeline.
#[derive(Debug, Default)]
pub struct PipelineStats {
    captured: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
    delivered: AtomicU64,
    /// Discarded by a full queue.
    dropped: AtomicU64,
    /// NACKed by the reliable receiver.
    rejected: AtomicU64,
    framing_errors: AtomicU64,
    metadata_errors: AtomicU64,
    oversized: AtomicU64,
    decode_errors: AtomicU64,
    encode_errors: AtomicU64,
    other_errors: AtomicU64,
    bytes: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_captured(&self) {
        bump(&self.captured);
    }

    /// A message of `bytes` left through the transport.
    pub fn record_sent(&self, bytes: usize) {
        bump(&self.sent);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// A message of `bytes` arrived from the transport.
    pub fn record_received(&self, bytes: usize) {
        bump(&self.received);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// A frame reached the sink.
    pub fn record_delivered(&self) {
        bump(&self.delivered);
    }

    pub fn record_dropped(&self) {
        bump(&self.dropped);
    }

    /// Count a per-frame failure under its kind.
    pub fn record_error(&self, error: &StreamError) {
        let counter = match error {
            StreamError::Framing(_) => &self.framing_errors,
            StreamError::Metadata(_) => &self.metadata_errors,
            StreamError::OversizedFrame { .. } => &self.oversized,
            StreamError::Decode(_) => &self.decode_errors,
            StreamError::Encode(_) => &self.encode_errors,
            StreamError::FrameRejected => &self.rejected,
            _ => &self.other_errors,
        };
        bump(counter);
    }

    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            captured: load(&self.captured),
            sent: load(&self.sent),
            received: load(&self.received),
            delivered: load(&self.delivered),
            dropped: load(&self.dropped),
            rejected: load(&self.rejected),
            framing_errors: load(&self.framing_errors),
            metadata_errors: load(&self.metadata_errors),
            oversized: load(&self.oversized),
            decode_errors: load(&self.decode_errors),
            encode_errors: load(&self.encode_errors),
            other_errors: load(&self.other_errors),
            bytes: load(&self.bytes),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`], returned by `run()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub captured: u64,
    pub sent: u64,
    pub received: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub framing_errors: u64,
    pub metadata_errors: u64,
    pub oversized: u64,
    pub decode_errors: u64,
    pub encode_errors: u64,
    pub other_errors: u64,
    pub bytes: u64,
}

impl StatsSnapshot {
    /// All per-frame failures, excluding queue drops.
    pub fn errors(&self) -> u64 {
        self.rejected
            + self.framing_errors
            + self.metadata_errors
            + self.oversized
            + self.decode_errors
            + self.encode_errors
            + self.other_errors
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "captured={} sent={} received={} delivered={} dropped={} errors={} bytes={}",
            self.captured,
            self.sent,
            self.received,
            self.delivered,
            self.dropped,
            self.errors(),
            self.bytes
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_counted_by_kind() {
        let stats = PipelineStats::new();
        stats.record_error(&StreamError::Framing("x".into()));
        stats.record_error(&StreamError::Metadata("x".into()));
        stats.record_error(&StreamError::OversizedFrame { size: 9, max: 1 });
        stats.record_error(&StreamError::FrameRejected);
        stats.record_error(&StreamError::FrameRejected);

        let snap = stats.snapshot();
        assert_eq!(snap.framing_errors, 1);
        assert_eq!(snap.metadata_errors, 1);
        assert_eq!(snap.oversized, 1);
        assert_eq!(snap.rejected, 2);
        assert_eq!(snap.errors(), 5);
    }

    #[test]
    fn traffic_counters() {
        let stats = PipelineStats::new();
        stats.record_captured();
        stats.record_sent(100);
        stats.record_sent(50);
        stats.record_dropped();

        let snap = stats.snapshot();
        assert_eq!(snap.captured, 1);
        assert_eq!(snap.sent, 2);
        assert_eq!(snap.bytes, 150);
        assert_eq!(snap.dropped, 1);
        assert!(snap.to_string().contains("sent=2"));
    }
}
