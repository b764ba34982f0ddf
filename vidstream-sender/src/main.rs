//! vidstream sender: entry point.
//!
//! ```text
//! vidstream-sender                      Stream with defaults
//! vidstream-sender --config <path>      Load a custom config TOML
//! vidstream-sender --gen-config         Write default config to stdout
//! vidstream-sender -p udp -a 10.0.0.2   Override transport and receiver
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vidstream_core::{SenderEndpoint, SenderPipeline, TransportKind, ZstdCodec};
use vidstream_sender::config::SenderSettings;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vidstream-sender", about = "Capture, encode and stream frames")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "vidstream-sender.toml")]
    config: PathBuf,

    /// Transport, "tcp" or "udp" (overrides config).
    #[arg(short, long)]
    protocol: Option<TransportKind>,

    /// Receiver address (overrides config).
    #[arg(short, long)]
    address: Option<String>,

    /// Receiver port (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Target frames per second, 0 = unpaced (overrides config).
    #[arg(long)]
    fps: Option<u32>,

    /// Stop after this many frames (overrides config).
    #[arg(long)]
    frames: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut SenderSettings) {
        if let Some(protocol) = self.protocol {
            config.network.protocol = protocol;
        }
        if let Some(address) = &self.address {
            config.network.address = address.clone();
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(fps) = self.fps {
            config.stream.fps = fps;
        }
        if let Some(frames) = self.frames {
            config.source.frames = frames;
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SenderSettings::default())?;
        println!("{text}");
        return Ok(());
    }

    let (mut config, origin) = SenderSettings::load(&cli.config);
    cli.apply(&mut config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    origin.report(&cli.config);

    info!("vidstream-sender v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "{} → {}:{}",
        config.network.protocol, config.network.address, config.network.port
    );
    info!(
        "{}x{} @ {} fps, quality {}",
        config.stream.width, config.stream.height, config.stream.fps, config.stream.quality
    );

    let endpoint = SenderEndpoint::from_config(&config.to_endpoint_config());
    let pipeline = SenderPipeline::new(
        config.build_source()?,
        Arc::new(ZstdCodec::new()),
        endpoint,
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
            info!(%stats, "sender finished");
            Ok(())
        }
        Err(e) => {
            error!("sender failed: {e}");
            Err(e.into())
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
