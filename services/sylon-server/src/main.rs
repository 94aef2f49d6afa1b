//! Sylon Server
//!
//! Runs the arena scheduler (creation, resolution, stats) and serves the
//! prediction and leaderboard HTTP API on top of it.
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings
//! sylon-server
//!
//! # Start with a config file
//! sylon-server --config /path/to/sylon.toml
//!
//! # Environment overrides
//! SYLON__SCHEDULER__TICK_INTERVAL_SECS=60 sylon-server
//! ```

mod config;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sylon_arena::{command_channel, BinancePriceOracle, OracleRegistry, Scheduler};
use sylon_db::ArenaStore;

use crate::config::{LoggingConfig, ServerConfig};
use crate::routes::AppState;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Sylon - recurring prediction arenas with a public leaderboard
#[derive(Parser, Debug)]
#[command(name = "sylon-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "SYLON_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "SYLON_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SYLON_PORT")]
    port: Option<u16>,

    /// SQLite connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SYLON_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "SYLON_LOG_FORMAT")]
    log_format: Option<String>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;
    args.apply(&mut server_config);

    init_logging(&server_config.logging);
    server_config.validate()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Sylon server");

    let store = ArenaStore::connect(&server_config.database)
        .await
        .context("failed to open arena store")?;
    if !store.health_check().await {
        anyhow::bail!("Arena store health check failed");
    }

    let prices = Arc::new(BinancePriceOracle::new(&server_config.oracle)?);
    let scheduler = Scheduler::new(
        store,
        server_config.arena.clone(),
        OracleRegistry::with_defaults(prices),
        server_config.scheduler.clone(),
    )?;

    let (handle, commands) = command_channel(server_config.scheduler.command_buffer);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = tokio::spawn(scheduler.run(commands, wait_for(shutdown_rx)));

    let app = routes::router(AppState {
        scheduler: handle,
        leaderboard_limit: server_config.server.leaderboard_limit,
        max_leaderboard_limit: server_config.server.max_leaderboard_limit,
    });

    let addr = server_config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        host = %server_config.server.host,
        port = server_config.server.port,
        "Server listening"
    );

    let grace = server_config.server.shutdown_timeout();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    match tokio::time::timeout(grace, scheduler_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = grace.as_secs(),
            "Scheduler did not stop within the shutdown timeout"
        ),
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber.with(fmt::layer().pretty().with_target(true)).init();
        }
    }
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Resolves once the watch flips to `true` or its sender is gone
async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
