//! Receiver pipeline: receive → deframe → validate → decode → queue → sink.
//!
//! 1. The **receive** stage takes whole messages off the
//!    [`ReceiverEndpoint`], splits and validates them with the
//!    [`WireFramer`], decodes the payload and pushes the frame into the
//!    queue. Every message taken off a reliable stream is answered with
//!    ACK, or NACK when it had to be dropped.
//! 2. The **consume** stage pops frames into the [`FrameSink`] and polls the
//!    sink for a user stop request, at least every `poll_interval`.
//!
//! A reliable sender closing its connection between messages ends the
//! session normally: frames already queued still reach the sink.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::StreamError;
use crate::framing::{StreamLimits, WireFramer};
use crate::media::{DecodedFrame, FrameCodec, FrameSink};
use crate::pipeline::stats::{PipelineStats, StatsSnapshot};
use crate::pipeline::{Control, PipelineState, StopHandle, flatten_stage};
use crate::queue::{BoundedFrameQueue, OverflowPolicy, PushOutcome};
use crate::transport::{AckOutcome, ReceiverEndpoint, TransportKind};

/// Default receive queue depth.
pub const DEFAULT_RECEIVER_QUEUE: usize = 100;

// ── ReceiverConfig ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    /// Upper bound between two `FrameSink::poll_stop` checks.
    pub poll_interval: Duration,
    pub limits: StreamLimits,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_RECEIVER_QUEUE,
            overflow: OverflowPolicy::default(),
            poll_interval: Duration::from_millis(20),
            limits: StreamLimits::for_dimensions(640, 480),
        }
    }
}

// ── ReceiverPipeline ─────────────────────────────────────────────

/// Receives, validates and displays frames from one sender.
pub struct ReceiverPipeline {
    endpoint: ReceiverEndpoint,
    codec: Arc<dyn FrameCodec>,
    sink: Box<dyn FrameSink>,
    framer: WireFramer,
    config: ReceiverConfig,
    control: Control,
    stats: Arc<PipelineStats>,
}

impl ReceiverPipeline {
    pub fn new(
        endpoint: ReceiverEndpoint,
        codec: Arc<dyn FrameCodec>,
        sink: Box<dyn FrameSink>,
        config: ReceiverConfig,
    ) -> Result<Self, StreamError> {
        if config.poll_interval.is_zero() {
            return Err(StreamError::Config("poll_interval must be non-zero".into()));
        }
        let framer = match endpoint.kind() {
            TransportKind::Tcp => WireFramer::new(config.limits),
            TransportKind::Udp => WireFramer::for_datagram(config.limits.clamped_to_datagram())?,
        };

        Ok(Self {
            endpoint,
            codec,
            sink,
            framer,
            config,
            control: Control::new(),
            stats: Arc::new(PipelineStats::new()),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.control.handle()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> PipelineState {
        self.control.state()
    }

    /// Bind (and for TCP accept), then receive until stopped or the link
    /// is lost.
    pub async fn run(self) -> Result<StatsSnapshot, StreamError> {
        let Self {
            mut endpoint,
            codec,
            sink,
            framer,
            config,
            control,
            stats,
        } = self;
        let stop = control.token();

        if stop.is_cancelled() {
            control.set_state(PipelineState::Stopped);
            return Ok(stats.snapshot());
        }

        if endpoint.accepts_connection() {
            control.set_state(PipelineState::Accepting);
        }
        let started = tokio::select! {
            result = endpoint.start() => result,
            _ = stop.cancelled() => {
                control.set_state(PipelineState::Stopped);
                return Ok(stats.snapshot());
            }
        };
        if let Err(e) = started {
            error!(error = %e, "receiver could not start");
            control.set_state(PipelineState::Stopped);
            return Err(e);
        }

        control.set_state(PipelineState::Streaming);
        info!(
            transport = %endpoint.kind(),
            local = ?endpoint.local_addr(),
            "receiver streaming"
        );

        let queue = Arc::new(BoundedFrameQueue::new(config.queue_capacity, config.overflow));
        let unpacker = Unpacker {
            framer,
            codec,
            limits: config.limits,
        };

        let receive = tokio::spawn(receive_stage(
            endpoint,
            unpacker,
            Arc::clone(&queue),
            stop.clone(),
            Arc::clone(&stats),
        ));
        let consume = tokio::spawn(consume_stage(
            sink,
            queue,
            stop.clone(),
            Arc::clone(&stats),
            config.poll_interval,
        ));

        let (receive, consume) = tokio::join!(receive, consume);
        control.set_state(PipelineState::Stopped);

        let snapshot = stats.snapshot();
        info!(%snapshot, "receiver stopped");
        let received = flatten_stage(receive);
        let consumed = flatten_stage(consume);
        received?;
        consumed?;
        Ok(snapshot)
    }
}

// ── Receive stage ────────────────────────────────────────────────

/// Turns one wire message into a decoded frame.
struct Unpacker {
    framer: WireFramer,
    codec: Arc<dyn FrameCodec>,
    limits: StreamLimits,
}

impl Unpacker {
    fn unpack(&self, block: Bytes) -> Result<DecodedFrame, StreamError> {
        let (metadata, payload) = self.framer.decode(block)?;
        if let (Some(w), Some(h)) = (metadata.width, metadata.height) {
            self.limits.check_dimensions(w, h)?;
        }
        let frame = self.codec.decode(&payload, self.limits.max_frame_len)?;

        if let (Some(w), Some(h)) = (metadata.width, metadata.height) {
            if (w, h) != (frame.width, frame.height) {
                return Err(StreamError::Decode(format!(
                    "metadata says {w}x{h}, payload decoded to {}x{}",
                    frame.width, frame.height
                )));
            }
        }

        Ok(DecodedFrame {
            sequence: metadata.sequence,
            sent_timestamp_us: metadata.timestamp,
            encoded_size: payload.len(),
            frame,
        })
    }
}

async fn receive_stage(
    mut endpoint: ReceiverEndpoint,
    unpacker: Unpacker,
    queue: Arc<BoundedFrameQueue<DecodedFrame>>,
    stop: CancellationToken,
    stats: Arc<PipelineStats>,
) -> Result<(), StreamError> {
    let result = receive_loop(&mut endpoint, &unpacker, &queue, &stop, &stats).await;
    queue.close();

    if let Err(e) = &result {
        error!(error = %e, "receive failed, stopping receiver");
        stop.cancel();
    }
    result
}

async fn receive_loop(
    endpoint: &mut ReceiverEndpoint,
    unpacker: &Unpacker,
    queue: &BoundedFrameQueue<DecodedFrame>,
    stop: &CancellationToken,
    stats: &PipelineStats,
) -> Result<(), StreamError> {
    loop {
        let received = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(()),
            result = endpoint.receive() => result,
        };

        let outcome = match received {
            Ok(None) => return Ok(()),
            Ok(Some(block)) => {
                stats.record_received(block.len());
                match unpacker.unpack(block) {
                    Ok(frame) => {
                        enqueue(queue, stats, frame);
                        AckOutcome::Accept
                    }
                    Err(e) => {
                        warn!(error = %e, "message dropped");
                        stats.record_error(&e);
                        AckOutcome::Reject
                    }
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "message dropped");
                stats.record_error(&e);
                AckOutcome::Reject
            }
        };

        endpoint.acknowledge(outcome).await?;
    }
}

fn enqueue(queue: &BoundedFrameQueue<DecodedFrame>, stats: &PipelineStats, frame: DecodedFrame) {
    match queue.push(frame) {
        PushOutcome::Queued => {}
        PushOutcome::DroppedNewest(f) | PushOutcome::DroppedOldest(f) => {
            stats.record_dropped();
            debug!(sequence = f.sequence, dropped = queue.dropped(), "receive queue full");
        }
        PushOutcome::Closed(_) => {}
    }
}

// ── Consume stage ────────────────────────────────────────────────

async fn consume_stage(
    mut sink: Box<dyn FrameSink>,
    queue: Arc<BoundedFrameQueue<DecodedFrame>>,
    stop: CancellationToken,
    stats: Arc<PipelineStats>,
    poll_interval: Duration,
) -> Result<(), StreamError> {
    let mut tick = tokio::time::interval(poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            frame = queue.pop() => {
                let Some(frame) = frame else { break };
                match sink.show(&frame) {
                    Ok(()) => stats.record_delivered(),
                    Err(e) => {
                        warn!(error = %e, sequence = frame.sequence, "sink rejected frame");
                        stats.record_error(&e);
                    }
                }
            }
            _ = tick.tick() => {}
        }

        if sink.poll_stop() {
            info!(delivered = stats.delivered(), "sink requested stop");
            stop.cancel();
            break;
        }
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
