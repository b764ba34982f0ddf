//! Two-stage streaming pipelines.
//!
//! ```text
//!  sender:    FrameSource ─► capture ─► [queue] ─► transmit ─► SenderEndpoint
//!  receiver:  ReceiverEndpoint ─► receive ─► [queue] ─► consume ─► FrameSink
//! ```
//!
//! Each stage is a Tokio task. The stages of one pipeline share exactly one
//! [`BoundedFrameQueue`](crate::queue::BoundedFrameQueue) and one stop
//! signal; `run()` joins both tasks before it returns.

pub mod receiver;
pub mod sender;
pub mod stats;
pub mod throughput;

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::StreamError;

pub use receiver::{ReceiverConfig, ReceiverPipeline};
pub use sender::{SenderConfig, SenderPipeline};
pub use stats::{PipelineStats, StatsSnapshot};
pub use throughput::ThroughputMeter;

// ── PipelineState ────────────────────────────────────────────────

/// Lifecycle of a pipeline.
///
/// ```text
///  Idle ──► Connecting ──► Streaming ──► Stopped     sender
///  Idle ──► Accepting  ──► Streaming ──► Stopped     receiver (reliable)
///  Idle ─────────────────► Streaming ──► Stopped     receiver (datagram)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    /// Sender is establishing its transport.
    Connecting,
    /// Reliable receiver is waiting for a sender.
    Accepting,
    /// Both stages are running.
    Streaming,
    /// Both stages have exited. Terminal.
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Accepting => write!(f, "Accepting"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

impl PipelineState {
    /// `true` between leaving `Idle` and reaching `Stopped`.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Accepting | Self::Streaming)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

// ── Control ──────────────────────────────────────────────────────

/// Stop signal plus published lifecycle state, owned by a pipeline.
#[derive(Debug)]
pub(crate) struct Control {
    stop: CancellationToken,
    state: watch::Sender<PipelineState>,
}

impl Control {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            stop: CancellationToken::new(),
            state,
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub(crate) fn handle(&self) -> StopHandle {
        StopHandle {
            stop: self.stop.clone(),
            state: self.state.subscribe(),
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, next: PipelineState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = %prev, to = %next, "pipeline state");
        }
    }
}

// ── StopHandle ───────────────────────────────────────────────────

/// Cloneable handle for stopping a pipeline from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: CancellationToken,
    state: watch::Receiver<PipelineState>,
}

impl StopHandle {
    /// Signal both stages and wait until the pipeline reports `Stopped`.
    ///
    /// Returns immediately if the pipeline has not started, or has been
    /// dropped.
    pub async fn stop(&self) {
        self.stop.cancel();
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|s| matches!(s, PipelineState::Idle | PipelineState::Stopped))
            .await;
    }

    /// Signal both stages without waiting for them.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Last state published by the pipeline.
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Sleep for the remainder of the frame interval.
pub(crate) async fn pace(loop_start: Instant, interval: Duration) {
    let elapsed = loop_start.elapsed();
    if elapsed < interval {
        tokio::time::sleep(interval - elapsed).await;
    }
}

/// Unwrap a joined stage, re-raising a panic from inside it.
pub(crate) fn flatten_stage<T>(
    joined: Result<Result<T, StreamError>, JoinError>,
) -> Result<T, StreamError> {
    match joined {
        Ok(result) => result,
        // Stages are never aborted, so a join error is always a panic.
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_and_predicates() {
        assert_eq!(PipelineState::default(), PipelineState::Idle);
        assert_eq!(PipelineState::Accepting.to_string(), "Accepting");
        assert!(PipelineState::Streaming.is_active());
        assert!(!PipelineState::Idle.is_active());
        assert!(PipelineState::Stopped.is_stopped());
    }

    #[tokio::test]
    async fn stop_on_idle_pipeline_returns_immediately() {
        let control = Control::new();
        let handle = control.handle();
        handle.stop().await;
        assert!(handle.is_stop_requested());
        assert!(control.token().is_cancelled());
    }

    #[tokio::test]
    async fn stop_waits_for_stopped() {
        let control = Control::new();
        control.set_state(PipelineState::Streaming);
        let handle = control.handle();

        let token = control.token();
        let worker = tokio::spawn(async move {
            token.cancelled().await;
            control.set_state(PipelineState::Stopped);
            control
        });

        handle.stop().await;
        assert_eq!(handle.state(), PipelineState::Stopped);
        let control = worker.await.unwrap();
        assert_eq!(control.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn pace_sleeps_remainder() {
        let start = Instant::now();
        pace(start, Duration::from_millis(40)).await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
