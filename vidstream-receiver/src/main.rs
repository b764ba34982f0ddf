//! vidstream receiver: entry point.
//!
//! ```text
//! vidstream-receiver                     Listen with defaults
//! vidstream-receiver --config <path>     Use custom config TOML
//! vidstream-receiver --gen-config        Dump default config and exit
//! vidstream-receiver -p udp --port 9000  Override transport and port
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vidstream_core::{ReceiverEndpoint, ReceiverPipeline, TransportKind, ZstdCodec};
use vidstream_receiver::config::ReceiverSettings;
use vidstream_receiver::sink::LogSink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vidstream-receiver", about = "Receive, decode and display streamed frames")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vidstream-receiver.toml")]
    config: PathBuf,

    /// Transport, "tcp" or "udp" (overrides config).
    #[arg(short, long)]
    protocol: Option<TransportKind>,

    /// Port to listen on (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Write every frame as a PPM into this directory (overrides config).
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Exit after this many frames (overrides config).
    #[arg(long)]
    max_frames: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut ReceiverSettings) {
        if let Some(protocol) = self.protocol {
            config.network.protocol = protocol;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(dir) = &self.dump_dir {
            config.output.dump_dir = dir.display().to_string();
        }
        if let Some(max) = self.max_frames {
            config.output.max_frames = max;
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ReceiverSettings::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, origin) = ReceiverSettings::load(&cli.config);
    cli.apply(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    origin.report(&cli.config);

    info!("vidstream-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "{} on {}:{}",
        config.network.protocol, config.network.bind_address, config.network.port
    );

    let mut sink = LogSink::new(config.report_interval());
    if let Some(dir) = config.dump_dir() {
        std::fs::create_dir_all(&dir)?;
        info!("dumping frames to {}", dir.display());
        sink = sink.with_dump_dir(dir);
    }
    if let Some(max) = config.max_frames() {
        sink = sink.with_max_frames(max);
    }

    let endpoint = ReceiverEndpoint::from_config(&config.to_endpoint_config());
    let pipeline = ReceiverPipeline::new(
        endpoint,
        Arc::new(ZstdCodec::new()),
        Box::new(sink),
        config.to_pipeline_config(),
    )?;

    // Ctrl-C handler.
    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.request_stop();
    });

    match pipeline.run().await {
        Ok(stats) => {
            info!(%stats, "receiver finished");
            Ok(())
        }
        Err(e) => {
            error!("receiver failed: {e}");
            Err(e.into())
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
