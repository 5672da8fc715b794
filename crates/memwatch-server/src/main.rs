//! Memwatch Server - standalone remote control server.
//!
//! Runs the memwatch line protocol against an in-process simulated host so
//! clients and scripts can be developed without a running emulator.

use anyhow::{Context, Result};
use clap::Parser;
use memwatch_core::{SimulatedHost, WatchConfig, WatchServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "memwatch-server")]
#[command(about = "Line-protocol remote control server for a simulated host")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// JSON configuration file; command line values take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Poll loop tick in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Controller hijack duration in milliseconds
    #[arg(long)]
    hijack_ms: Option<u64>,

    /// Size of the simulated memory window in bytes
    #[arg(long, default_value_t = 24 * 1024 * 1024)]
    memory_size: usize,

    /// Base address of the simulated memory window
    #[arg(long, default_value = "0x80000000", value_parser = parse_address)]
    memory_base: u32,
}

impl Args {
    /// Build the server configuration: file (or defaults), then CLI overrides.
    fn watch_config(&self) -> Result<WatchConfig> {
        let mut config = match &self.config {
            Some(path) => WatchConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => WatchConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(tick) = self.tick_ms {
            config.tick_interval_ms = tick;
        }
        if let Some(hijack) = self.hijack_ms {
            config.hijack_timeout_ms = hijack;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Log filter from `RUST_LOG`, falling back to INFO (DEBUG with `--debug`)
/// when it sets no directives.
fn log_filter(debug: bool, rust_log: &str) -> EnvFilter {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy(rust_log)
}

fn parse_address(text: &str) -> std::result::Result<u32, String> {
    memwatch_core::dispatch::parse_unsigned(text)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| format!("invalid address: {}", text))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    FmtSubscriber::builder()
        .with_env_filter(log_filter(args.debug, &rust_log))
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting memwatch server");

    let config = args.watch_config()?;
    let host = Arc::new(SimulatedHost::new(args.memory_base, args.memory_size));
    info!(
        "Simulated memory: {} bytes at {:#010x}",
        args.memory_size, args.memory_base
    );

    let handle = WatchServer::start(config, host).await?;

    // Print port for wrapper scripts to read
    println!("MEMWATCH_PORT={}", handle.port);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    handle.shutdown().await;

    Ok(())
}
