//! transferit configuration.
//!
//! Configuration is read from a TOML file (`./transferit.toml` unless
//! `--config` says otherwise). Every key is optional:
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8083
//!
//! [transfer]
//! max_chunk_size = 3670016
//! chunk_size = 1048576
//!
//! [retry]
//! initial_delay_ms = 50
//! max_delay_ms = 2000
//! backoff_factor = 2.0
//! max_attempts = 0
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use transferit_client::RetryConfig;
use transferit_protocol::constants::{
    DEFAULT_PORT, WS_MAX_MESSAGE_SIZE, encoded_message_size, server_message_limit,
};
use transferit_server::ServerConfig;
use transferit_transfer::{CoordinatorConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub transfer: TransferSection,
    pub retry: RetrySection,
}

/// Address the server binds to and clients connect to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    /// 0 lets the OS pick a port when serving.
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSection {
    /// Largest chunk the server accepts, in raw bytes.
    pub max_chunk_size: usize,
    /// Chunk size used when uploading.
    pub chunk_size: usize,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Backoff applied while the slot is busy or still empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// 0 = keep retrying.
    pub max_attempts: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            backoff_factor: retry.backoff_factor,
            max_attempts: retry.max_attempts,
        }
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.transfer.max_chunk_size > 0,
            "transfer.max_chunk_size must be positive"
        );
        for (key, size) in [
            ("transfer.max_chunk_size", self.transfer.max_chunk_size),
            ("transfer.chunk_size", self.transfer.chunk_size),
        ] {
            anyhow::ensure!(
                encoded_message_size(size) <= WS_MAX_MESSAGE_SIZE,
                "{key} = {size} does not fit a {WS_MAX_MESSAGE_SIZE} byte WebSocket message"
            );
        }
        anyhow::ensure!(
            self.retry.backoff_factor >= 1.0,
            "retry.backoff_factor must be at least 1.0"
        );
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            max_message_size: server_message_limit(self.transfer.max_chunk_size),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_chunk_size: self.transfer.max_chunk_size,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            backoff_factor: self.retry.backoff_factor,
            max_attempts: self.retry.max_attempts,
        }
    }

    /// WebSocket URL clients connect to.
    pub fn server_url(&self) -> String {
        format!("ws://{}:{}", self.server.host, self.server.port)
    }
}
