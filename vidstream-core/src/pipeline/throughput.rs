//! Rolling frame-rate and byte-rate meter.
//!
//! Records one `(timestamp, bytes)` sample per frame and derives rates over
//! the span of the samples still inside the window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct ThroughputMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    /// Sum of `bytes` over `samples`.
    total_bytes: u64,
}

impl ThroughputMeter {
    /// Meter with a 1-second rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(128),
            window,
            total_bytes: 0,
        }
    }

    /// Record a frame of `bytes` arriving now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Frames per second between the first and last sample in the window.
    pub fn frames_per_sec(&self) -> f64 {
        match self.span() {
            Some(span) => (self.samples.len() - 1) as f64 / span.as_secs_f64(),
            None => 0.0,
        }
    }

    /// Bytes per second between the first and last sample in the window.
    pub fn bytes_per_sec(&self) -> f64 {
        match (self.span(), self.samples.front()) {
            (Some(span), Some(&(_, first))) => {
                (self.total_bytes - first) as f64 / span.as_secs_f64()
            }
            _ => 0.0,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Interval covered by the samples; `None` with fewer than two.
    fn span(&self) -> Option<Duration> {
        if self.samples.len() < 2 {
            return None;
        }
        let (first, _) = self.samples.front()?;
        let (last, _) = self.samples.back()?;
        let d = last.duration_since(*first);
        Some(if d.is_zero() { Duration::from_millis(1) } else { d })
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
