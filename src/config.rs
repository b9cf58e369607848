//! Configuration for the intake listener.
//!
//! The library is driven by [`ListenerConfig`]. The binary builds one from
//! command-line arguments and an optional TOML configuration file; CLI
//! arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for a single [`Listener`](crate::Listener) instance.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_address: String,
    /// Port to bind to (0 picks an ephemeral port).
    pub bind_port: u16,
    /// Listen backlog. One client is served at a time, so 1 suffices.
    pub accept_backlog: u32,
    /// Longest a single wait for an incoming connection may block. Bounds
    /// how quickly the worker notices a stop request.
    pub accept_wait_timeout: Duration,
    /// Longest a read on an open connection may wait for more bytes.
    pub idle_read_timeout: Duration,
    /// Size of each read chunk in bytes (minimum 1).
    pub read_chunk_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            accept_backlog: default_accept_backlog(),
            accept_wait_timeout: Duration::from_millis(default_accept_wait_timeout_ms()),
            idle_read_timeout: Duration::from_millis(default_idle_read_timeout_ms()),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

/// Command-line arguments for the intake server
#[derive(Parser, Debug)]
#[command(name = "inlet")]
#[command(author = "inlet authors")]
#[command(version = "0.1.0")]
#[command(about = "A single-connection TCP text intake server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1)
    #[arg(short = 'b', long)]
    pub bind: Option<String>,

    /// Port to bind to
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_bind_address")]
    pub bind: String,
    /// Port to bind to
    #[serde(default = "default_bind_port")]
    pub port: u16,
    /// Listen backlog
    #[serde(default = "default_accept_backlog")]
    pub accept_backlog: u32,
    /// Accept wait timeout in milliseconds
    #[serde(default = "default_accept_wait_timeout_ms")]
    pub accept_wait_timeout_ms: u64,
    /// Idle read timeout in milliseconds
    #[serde(default = "default_idle_read_timeout_ms")]
    pub idle_read_timeout_ms: u64,
    /// Size of each read chunk in bytes
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_bind_port(),
            accept_backlog: default_accept_backlog(),
            accept_wait_timeout_ms: default_accept_wait_timeout_ms(),
            idle_read_timeout_ms: default_idle_read_timeout_ms(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    7777
}

fn default_accept_backlog() -> u32 {
    1
}

fn default_accept_wait_timeout_ms() -> u64 {
    1000
}

fn default_idle_read_timeout_ms() -> u64 {
    5000
}

fn default_read_chunk_size() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listener: ListenerConfig,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        if toml_config.server.read_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "read_chunk_size must be at least 1".to_string(),
            ));
        }

        let listener = ListenerConfig {
            bind_address: cli.bind.unwrap_or(toml_config.server.bind),
            bind_port: cli.port.unwrap_or(toml_config.server.port),
            accept_backlog: toml_config.server.accept_backlog,
            accept_wait_timeout: Duration::from_millis(toml_config.server.accept_wait_timeout_ms),
            idle_read_timeout: Duration::from_millis(toml_config.server.idle_read_timeout_ms),
            read_chunk_size: toml_config.server.read_chunk_size,
        };

        Ok(Config {
            listener,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(reason) => {
                write!(f, "Invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
