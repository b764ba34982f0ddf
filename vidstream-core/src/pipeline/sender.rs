//! Sender pipeline: capture → queue → encode → frame → send.
//!
//! 1. The **capture** stage reads frames from the [`FrameSource`], paces them
//!    to `target_fps` and pushes them into the queue without waiting.
//! 2. The **transmit** stage pops frames, encodes them with the
//!    [`FrameCodec`], wraps them with metadata through the [`WireFramer`]
//!    and hands the message to the [`SenderEndpoint`].
//!
//! End of stream closes the queue, so frames already captured are still
//! sent. An explicit stop abandons whatever is queued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::StreamError;
use crate::framing::{StreamLimits, WireFramer};
use crate::media::{FrameCodec, FrameSource, RawFrame};
use crate::metadata::FrameMetadata;
use crate::pipeline::stats::{PipelineStats, StatsSnapshot};
use crate::pipeline::throughput::ThroughputMeter;
use crate::pipeline::{Control, PipelineState, StopHandle, flatten_stage, pace};
use crate::queue::{BoundedFrameQueue, OverflowPolicy, PushOutcome};
use crate::transport::{SenderEndpoint, TransportKind};

/// Default send queue depth; small, since stale frames are worthless.
pub const DEFAULT_SENDER_QUEUE: usize = 10;

/// How often the transmit stage logs its rate.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

// ── SenderConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Codec quality, 0..=100.
    pub quality: u8,
    /// Capture rate cap; 0 reads at the source's native rate.
    pub target_fps: u32,
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub limits: StreamLimits,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            target_fps: 30,
            queue_capacity: DEFAULT_SENDER_QUEUE,
            overflow: OverflowPolicy::default(),
            limits: StreamLimits::for_dimensions(640, 480),
        }
    }
}

impl SenderConfig {
    fn frame_interval(&self) -> Option<Duration> {
        (self.target_fps > 0).then(|| Duration::from_secs_f64(1.0 / self.target_fps as f64))
    }
}

// ── SenderPipeline ───────────────────────────────────────────────

/// Streams frames from a source to one receiver.
///
/// # Lifetime
///
/// Take a [`stop_handle`](Self::stop_handle) first, then call
/// [`run`](Self::run). It returns once both stages have exited: at end of
/// stream, on stop, or on a session-fatal transport error.
pub struct SenderPipeline {
    source: Box<dyn FrameSource>,
    codec: Arc<dyn FrameCodec>,
    endpoint: SenderEndpoint,
    framer: WireFramer,
    config: SenderConfig,
    control: Control,
    stats: Arc<PipelineStats>,
}

impl SenderPipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        codec: Arc<dyn FrameCodec>,
        endpoint: SenderEndpoint,
        config: SenderConfig,
    ) -> Result<Self, StreamError> {
        if config.quality > 100 {
            return Err(StreamError::Config(format!(
                "quality {} outside 0..=100",
                config.quality
            )));
        }
        let framer = match endpoint.kind() {
            TransportKind::Tcp => WireFramer::new(config.limits),
            TransportKind::Udp => WireFramer::for_datagram(config.limits.clamped_to_datagram())?,
        };

        Ok(Self {
            source,
            codec,
            endpoint,
            framer,
            config,
            control: Control::new(),
            stats: Arc::new(PipelineStats::new()),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.control.handle()
    }

    /// Live counters; stay readable after `run` consumes the pipeline.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> PipelineState {
        self.control.state()
    }

    /// Connect, stream until done, and report the final counters.
    pub async fn run(self) -> Result<StatsSnapshot, StreamError> {
        let Self {
            source,
            codec,
            mut endpoint,
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

        control.set_state(PipelineState::Connecting);
        let started = tokio::select! {
            result = endpoint.start() => result,
            _ = stop.cancelled() => {
                control.set_state(PipelineState::Stopped);
                return Ok(stats.snapshot());
            }
        };
        if let Err(e) = started {
            error!(error = %e, "sender could not start");
            control.set_state(PipelineState::Stopped);
            return Err(e);
        }

        control.set_state(PipelineState::Streaming);
        info!(
            transport = %endpoint.kind(),
            peer = ?endpoint.peer_addr(),
            quality = config.quality,
            target_fps = config.target_fps,
            "sender streaming"
        );

        let queue = Arc::new(BoundedFrameQueue::new(config.queue_capacity, config.overflow));
        let transmitter = Transmitter {
            endpoint,
            codec,
            framer,
            quality: config.quality,
            next_sequence: 0,
        };

        let capture = tokio::spawn(capture_stage(
            source,
            Arc::clone(&queue),
            stop.clone(),
            Arc::clone(&stats),
            config.frame_interval(),
        ));
        let transmit = tokio::spawn(transmit_stage(
            transmitter,
            queue,
            stop.clone(),
            Arc::clone(&stats),
        ));

        let (capture, transmit) = tokio::join!(capture, transmit);
        control.set_state(PipelineState::Stopped);

        let snapshot = stats.snapshot();
        info!(%snapshot, "sender stopped");
        let transmitted = flatten_stage(transmit);
        let captured = flatten_stage(capture);
        transmitted?;
        captured?;
        Ok(snapshot)
    }
}

// ── Capture stage ────────────────────────────────────────────────

async fn capture_stage(
    mut source: Box<dyn FrameSource>,
    queue: Arc<BoundedFrameQueue<RawFrame>>,
    stop: CancellationToken,
    stats: Arc<PipelineStats>,
    interval: Option<Duration>,
) -> Result<(), StreamError> {
    let result = capture_loop(source.as_mut(), &queue, &stop, &stats, interval).await;
    source.close();
    // Lets the transmit stage drain what is queued and finish.
    queue.close();

    if let Err(e) = &result {
        error!(error = %e, "capture failed");
        stop.cancel();
    }
    result
}

async fn capture_loop(
    source: &mut dyn FrameSource,
    queue: &BoundedFrameQueue<RawFrame>,
    stop: &CancellationToken,
    stats: &PipelineStats,
    interval: Option<Duration>,
) -> Result<(), StreamError> {
    tokio::select! {
        result = source.open() => result?,
        _ = stop.cancelled() => return Ok(()),
    }
    debug!("frame source opened");

    loop {
        let loop_start = Instant::now();

        let frame = tokio::select! {
            biased;
            _ = stop.cancelled() => return Ok(()),
            result = source.read() => result?,
        };
        let Some(frame) = frame else {
            info!(captured = stats.captured(), "end of stream");
            return Ok(());
        };
        stats.record_captured();

        match queue.push(frame) {
            PushOutcome::Queued => {}
            PushOutcome::DroppedNewest(_) | PushOutcome::DroppedOldest(_) => {
                stats.record_dropped();
                debug!(dropped = queue.dropped(), "send queue full, frame dropped");
            }
            PushOutcome::Closed(_) => return Ok(()),
        }

        if let Some(interval) = interval {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return Ok(()),
                _ = pace(loop_start, interval) => {}
            }
        }
    }
}

// ── Transmit stage ───────────────────────────────────────────────

struct Transmitter {
    endpoint: SenderEndpoint,
    codec: Arc<dyn FrameCodec>,
    framer: WireFramer,
    quality: u8,
    next_sequence: u64,
}

impl Transmitter {
    /// Encode, frame and send one frame; returns the message size.
    async fn transmit(&mut self, frame: RawFrame) -> Result<usize, StreamError> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let payload = self.codec.encode(&frame, self.quality)?;
        let metadata = FrameMetadata::new(payload.len() as u64, frame.timestamp_us)
            .with_sequence(sequence)
            .with_dimensions(frame.width, frame.height);
        let message = self.framer.encode(&metadata, payload.as_ref())?;

        let len = message.len();
        self.endpoint.send(message).await?;
        Ok(len)
    }
}

async fn transmit_stage(
    mut tx: Transmitter,
    queue: Arc<BoundedFrameQueue<RawFrame>>,
    stop: CancellationToken,
    stats: Arc<PipelineStats>,
) -> Result<(), StreamError> {
    let mut meter = ThroughputMeter::new();
    let mut last_report = Instant::now();

    loop {
        let frame = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            frame = queue.pop() => frame,
        };
        let Some(frame) = frame else {
            debug!("send queue drained");
            break;
        };

        let sent = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            result = tx.transmit(frame) => result,
        };

        match sent {
            Ok(len) => {
                stats.record_sent(len);
                meter.record(len as u64);
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "transmit failed, stopping sender");
                stop.cancel();
                queue.close();
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, sequence = tx.next_sequence - 1, "frame skipped");
                stats.record_error(&e);
            }
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            info!(
                fps = format_args!("{:.1}", meter.frames_per_sec()),
                kib_per_sec = format_args!("{:.1}", meter.bytes_per_sec() / 1024.0),
                "streaming"
            );
            last_report = Instant::now();
        }
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
