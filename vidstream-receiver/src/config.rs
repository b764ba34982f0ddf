//! Receiver configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vidstream_core::{EndpointConfig, OverflowPolicy, ReceiverConfig, StreamLimits, TransportKind};

/// Top-level configuration for the receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverSettings {
    /// Network settings.
    pub network: NetworkConfig,
    /// Expected stream geometry and buffering.
    pub stream: StreamConfig,
    /// What happens to delivered frames.
    pub output: OutputConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// "tcp" (acknowledged) or "udp".
    pub protocol: TransportKind,
    /// Local address to bind.
    pub bind_address: String,
    pub port: u16,
}

/// Stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Expected frame width; sizes the message ceiling.
    pub width: u32,
    /// Expected frame height.
    pub height: u32,
    /// Display rate; sets how often the sink is polled for a stop request.
    pub fps: u32,
    /// Max buffered frames before dropping.
    pub queue_capacity: usize,
    /// "drop_newest" or "drop_oldest".
    pub overflow: OverflowPolicy,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for PPM dumps. Empty disables dumping.
    pub dump_dir: String,
    /// Stop after this many frames (0 = never).
    pub max_frames: u64,
    /// Seconds between rate reports.
    pub report_interval_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            protocol: TransportKind::Tcp,
            bind_address: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            queue_capacity: vidstream_core::pipeline::receiver::DEFAULT_RECEIVER_QUEUE,
            overflow: OverflowPolicy::DropNewest,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dump_dir: String::new(),
            max_frames: 0,
            report_interval_secs: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where the loaded settings came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    File,
    /// No readable file; defaults apply.
    Missing,
    /// The file did not parse; defaults apply.
    Invalid(String),
}

impl ConfigOrigin {
    pub fn report(&self, path: &Path) {
        match self {
            Self::File => tracing::info!("config loaded from {}", path.display()),
            Self::Missing => tracing::info!("no config at {}; using defaults", path.display()),
            Self::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

impl ReceiverSettings {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Nothing is logged here; the returned [`ConfigOrigin`] is reported
    /// once logging is up, since the log level itself comes from the file.
    pub fn load(path: &Path) -> (Self, ConfigOrigin) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, ConfigOrigin::File),
                Err(e) => (Self::default(), ConfigOrigin::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigOrigin::Missing),
        }
    }

    fn limits(&self) -> StreamLimits {
        StreamLimits::for_dimensions(self.stream.width, self.stream.height)
    }

    /// Endpoint settings for the local listener.
    pub fn to_endpoint_config(&self) -> EndpointConfig {
        EndpointConfig::new(
            self.network.protocol,
            self.network.bind_address.clone(),
            self.network.port,
        )
        .with_limits(self.limits())
    }

    /// Pipeline settings; the poll interval is one display frame.
    pub fn to_pipeline_config(&self) -> ReceiverConfig {
        let fps = self.stream.fps.clamp(1, 1000);
        ReceiverConfig {
            queue_capacity: self.stream.queue_capacity.max(1),
            overflow: self.stream.overflow,
            poll_interval: Duration::from_millis(u64::from(1000 / fps)),
            limits: self.limits(),
        }
    }

    pub fn dump_dir(&self) -> Option<PathBuf> {
        (!self.output.dump_dir.is_empty()).then(|| PathBuf::from(&self.output.dump_dir))
    }

    pub fn max_frames(&self) -> Option<u64> {
        (self.output.max_frames > 0).then_some(self.output.max_frames)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.output.report_interval_secs.max(1))
    }
}

// ── Tests ────────────────────────────────────────────────────────
