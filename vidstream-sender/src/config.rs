//! Configuration for the sender.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vidstream_core::{
    EndpointConfig, FrameSource, OverflowPolicy, PixelFormat, RawFileSource, SenderConfig,
    StreamError, StreamLimits, TestPatternSource, TransportKind,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderSettings {
    /// Where to send.
    pub network: NetworkConfig,
    /// Frame geometry, rate and encoding.
    pub stream: StreamConfig,
    /// Where frames come from.
    pub source: SourceConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// "tcp" (acknowledged) or "udp".
    pub protocol: TransportKind,
    /// Receiver host name or IP address.
    pub address: String,
    pub port: u16,
    /// TCP connect deadline in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    /// Capture rate cap; 0 sends as fast as the source produces.
    pub fps: u32,
    /// Codec quality, 0..=100.
    pub quality: u8,
    /// Frames buffered between capture and transmit.
    pub queue_capacity: usize,
    /// "drop_newest" or "drop_oldest".
    pub overflow: OverflowPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Synthetic moving gradient.
    #[default]
    Pattern,
    /// Consecutive raw frames read from `path`.
    File,
}

/// Capture source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Raw frame file, used when `kind = "file"`.
    pub path: String,
    pub format: PixelFormat,
    /// Stop after this many frames (0 = until the source ends).
    pub frames: u64,
}

/// Logging settings.
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
            address: "127.0.0.1".into(),
            port: 8080,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            quality: 80,
            queue_capacity: vidstream_core::pipeline::sender::DEFAULT_SENDER_QUEUE,
            overflow: OverflowPolicy::DropNewest,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Pattern,
            path: String::new(),
            format: PixelFormat::Bgr8,
            frames: 0,
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

impl SenderSettings {
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

    /// Endpoint settings for the configured receiver.
    pub fn to_endpoint_config(&self) -> EndpointConfig {
        EndpointConfig::new(
            self.network.protocol,
            self.network.address.clone(),
            self.network.port,
        )
        .with_connect_timeout(Duration::from_millis(self.network.connect_timeout_ms.max(1)))
        .with_limits(self.limits())
    }

    /// Pipeline settings. Out-of-range quality is left for the pipeline to reject.
    pub fn to_pipeline_config(&self) -> SenderConfig {
        SenderConfig {
            quality: self.stream.quality,
            target_fps: self.stream.fps,
            queue_capacity: self.stream.queue_capacity.max(1),
            overflow: self.stream.overflow,
            limits: self.limits(),
        }
    }

    /// Build the configured capture source.
    pub fn build_source(&self) -> Result<Box<dyn FrameSource>, StreamError> {
        let (w, h, format) = (self.stream.width, self.stream.height, self.source.format);
        match self.source.kind {
            SourceKind::Pattern => {
                let mut source = TestPatternSource::new(w, h, format);
                if self.source.frames > 0 {
                    source = source.with_limit(self.source.frames);
                }
                Ok(Box::new(source))
            }
            SourceKind::File if self.source.path.is_empty() => Err(StreamError::Config(
                "source.kind = \"file\" needs source.path".into(),
            )),
            SourceKind::File => Ok(Box::new(RawFileSource::new(&self.source.path, w, h, format))),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = SenderSettings::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("protocol = \"tcp\""));
        assert!(text.contains("overflow = \"drop_newest\""));
        assert!(text.contains("kind = \"pattern\""));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = SenderSettings::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: SenderSettings = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.port, 8080);
        assert_eq!(parsed.stream.fps, 30);
        assert_eq!(parsed.source.format, PixelFormat::Bgr8);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: SenderSettings = toml::from_str(
            "[network]\nprotocol = \"udp\"\nport = 9000\n\n[stream]\noverflow = \"drop_oldest\"\n",
        )
        .unwrap();
        assert_eq!(parsed.network.protocol, TransportKind::Udp);
        assert_eq!(parsed.network.port, 9000);
        assert_eq!(parsed.network.address, "127.0.0.1");
        assert_eq!(parsed.stream.overflow, OverflowPolicy::DropOldest);
        assert_eq!(parsed.stream.width, 640);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("vidstream-sender-does-not-exist.toml");
        let (cfg, origin) = SenderSettings::load(&path);
        assert_eq!(cfg.network.port, 8080);
        assert_eq!(origin, ConfigOrigin::Missing);
    }

    #[test]
    fn unparsable_file_is_reported_not_fatal() {
        let path = std::env::temp_dir().join(format!("vidstream-sender-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[network]\nport = \"not a number\"\n").unwrap();

        let (cfg, origin) = SenderSettings::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg.network.port, 8080);
        assert!(matches!(origin, ConfigOrigin::Invalid(_)));
    }

    #[test]
    fn pipeline_config_follows_stream_section() {
        let mut cfg = SenderSettings::default();
        cfg.stream.width = 320;
        cfg.stream.height = 240;
        cfg.stream.queue_capacity = 0;
        let pipeline = cfg.to_pipeline_config();
        assert_eq!(pipeline.queue_capacity, 1);
        assert_eq!(pipeline.limits, StreamLimits::for_dimensions(320, 240));

        let endpoint = cfg.to_endpoint_config();
        assert_eq!(endpoint.authority(), "127.0.0.1:8080");
        assert_eq!(endpoint.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn file_source_requires_path() {
        let mut cfg = SenderSettings::default();
        cfg.source.kind = SourceKind::File;
        assert!(matches!(cfg.build_source(), Err(StreamError::Config(_))));
        cfg.source.path = "frames.raw".into();
        assert!(cfg.build_source().is_ok());
    }
}
