//! Server Configuration
//!
//! Layered configuration for the Sylon server: optional `--config` file,
//! `config/default`, `config/local`, then `SYLON__*` environment variables.
//! CLI flags are applied on top in `main`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sylon_arena::{FactoryConfig, OracleSettings, SchedulerConfig};
use sylon_db::DatabaseConfig;
use sylon_types::ArenaId;

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP binding
    #[serde(default)]
    pub server: ServerSettings,

    /// SQLite store
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Tick interval, daily quota, oracle timeout
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Arena generation
    #[serde(default)]
    pub arena: FactoryConfig,

    /// Price oracle endpoint
    #[serde(default)]
    pub oracle: OracleSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server binding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long shutdown waits for the scheduler task to stop after the
    /// HTTP server has drained
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Rows returned by `/leaderboard` without a `limit`
    #[serde(default = "default_leaderboard_limit")]
    pub leaderboard_limit: u32,

    /// Upper bound on a requested `limit`
    #[serde(default = "default_max_leaderboard_limit")]
    pub max_leaderboard_limit: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            leaderboard_limit: default_leaderboard_limit(),
            max_leaderboard_limit: default_max_leaderboard_limit(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_leaderboard_limit() -> u32 {
    20
}

fn default_max_leaderboard_limit() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl ServerConfig {
    /// Load configuration from files and environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("SYLON")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let server_config: ServerConfig = builder
            .build()?
            .try_deserialize()
            .context("invalid server configuration")?;

        Ok(server_config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.server.socket_addr()?;
        self.arena.validate()?;

        if self.scheduler.daily_arena_limit == 0 || self.scheduler.daily_arena_limit > ArenaId::MAX_SEQUENCE {
            anyhow::bail!(
                "scheduler.daily_arena_limit must be between 1 and {}, got {}",
                ArenaId::MAX_SEQUENCE,
                self.scheduler.daily_arena_limit
            );
        }
        if self.scheduler.oracle_timeout_secs == 0 {
            anyhow::bail!("scheduler.oracle_timeout_secs must be at least 1");
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            anyhow::bail!("logging.format must be \"pretty\" or \"json\", got {:?}", self.logging.format);
        }
        Ok(())
    }
}
