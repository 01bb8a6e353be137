//! CANS - Cognitive Autonomous Neural Synchronizer
//!
//! Heartbeat, health monitoring, sync beacon and cycle alignment for a
//! fleet of cognitive modules, with an HTTP API for status and admin.
//!
//! # Usage
//!
//! ```bash
//! # Run with ./cans.toml (or built-in defaults)
//! cargo run --release
//!
//! # Run with an explicit config and bind address
//! ./cans --config /etc/cans/cans.toml --addr 127.0.0.1:8090
//!
//! # Validate config and print the effective settings
//! ./cans check-config
//! ```
//!
//! # Environment Variables
//!
//! - `CANS_CONFIG`: Path to the TOML config file
//! - `CANS_MODULES`: Monitored modules as `name=url,name=url`
//! - `CANS_CRITICAL_MODULES`: Comma-separated names of critical modules
//! - `CANS_HOST`, `CANS_PORT`, `CANS_*_MS`, `CANS_MAX_CYCLE_DRIFT`: overrides
//! - `CANS_LOG_FORMAT`: Set to "json" for JSON log lines
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cans::{CansConfig, HttpTransport, Synchronizer};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "cans")]
#[command(about = "Cognitive Autonomous Neural Synchronizer")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file (overrides CANS_CONFIG and ./cans.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:8090")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Load and validate the configuration, print it as TOML, and exit
    CheckConfig,
}

// ============================================================================
// Logging
// ============================================================================

/// Environment variable selecting the log line format.
const LOG_FORMAT_ENV: &str = "CANS_LOG_FORMAT";

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = CliArgs::parse();

    let config = CansConfig::load_from(args.config.as_deref()).context("Invalid configuration")?;

    if let Some(SubCommand::CheckConfig) = args.command {
        println!("{}", config.to_toml()?);
        println!("# configuration OK: {} module(s)", config.modules.len());
        return Ok(());
    }

    let server_addr = args.addr.unwrap_or_else(|| config.server.bind_address());

    info!("  CANS - Cognitive Autonomous Neural Synchronizer");
    info!(
        modules = config.modules.len(),
        heartbeat_ms = config.heartbeat.interval_ms,
        monitor_ms = config.monitor.interval_ms,
        sync_ms = config.sync.interval_ms,
        align_ms = config.alignment.check_interval_ms,
        max_cycle_drift = config.alignment.max_cycle_drift,
        "Configuration loaded"
    );
    if config.modules.is_empty() {
        info!("No modules configured; set CANS_MODULES or add [modules] to the config file");
    }

    let transport = HttpTransport::new().context("Failed to build HTTP client")?;
    let synchronizer = Synchronizer::new(&config, Arc::new(transport));

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {server_addr}"))?;
    info!(addr = %server_addr, "API listening");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    synchronizer.run(Some(listener), cancel_token).await?;

    info!("CANS shutdown complete");
    Ok(())
}
