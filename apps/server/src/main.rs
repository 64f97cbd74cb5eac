//! Tandem Server - standalone session service for Tandem listening sessions.
//!
//! Hosts the session API that hosts push to and listeners poll. Designed to
//! run as a background daemon.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tandem_core::{bootstrap_services, start_server};
use tokio::signal;

use crate::config::ServerConfig;

/// Tandem Server - host-driven group listening sessions.
#[derive(Parser, Debug)]
#[command(name = "tandem-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "TANDEM_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "TANDEM_BIND_PORT")]
    port: Option<u16>,

    /// Idle timeout in seconds (overrides config file).
    #[arg(long, env = "TANDEM_IDLE_TIMEOUT_SECS")]
    idle_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Tandem Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(secs) = args.idle_timeout_secs {
        config.idle_timeout_secs = secs;
    }

    log::info!(
        "Configuration: bind_port={}, idle_timeout={}s, store={}",
        config.bind_port,
        config.idle_timeout_secs,
        config.store_url.as_deref().unwrap_or("memory")
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config)
        .await
        .context("Failed to bootstrap services")?;

    services.start_background_tasks();

    let app_state = services
        .app_state()
        .context("Failed to build application state")?;
    let shutdown = services.cancel_token.clone();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state, shutdown).await {
            log::error!("Server error: {}", e);
        }
    });

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Cancelling the token also drains the HTTP server.
    services.shutdown().await;
    if let Err(e) = server_handle.await {
        log::warn!("Server task ended abnormally: {}", e);
    }

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
