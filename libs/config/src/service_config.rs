//! Service Configuration Module
//!
//! Provides configuration loading for the relay and catalogue services.
//! Supports loading from TOML/JSON files with environment variable overrides.

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::service;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "FORENSICVR";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ForensicConfig {
    /// Relay server settings
    pub relay: RelaySettings,

    /// Catalogue HTTP service settings
    pub catalog: CatalogSettings,

    /// Log output settings
    pub logging: LoggingSettings,
}

/// Relay server settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RelaySettings {
    pub bind_address: String,
    pub port: u16,

    /// Outbound frames buffered per client before it is disconnected
    pub write_queue_capacity: usize,

    /// Inbound messages buffered between receive loops and the control bridge
    pub inbound_queue_capacity: usize,

    pub handshake_timeout_ms: u64,
    pub shutdown_grace_ms: u64,

    /// Keepalive ping interval in seconds, 0 disables
    pub ping_interval_secs: u64,

    pub max_message_bytes: usize,
}

/// Catalogue HTTP service settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CatalogSettings {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    pub max_body_bytes: u64,
}

/// Log output settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_address: service::relay::DEFAULT_BIND_ADDRESS.to_string(),
            port: service::relay::DEFAULT_PORT,
            write_queue_capacity: service::relay::WRITE_QUEUE_CAPACITY,
            inbound_queue_capacity: service::relay::INBOUND_QUEUE_CAPACITY,
            handshake_timeout_ms: service::relay::HANDSHAKE_TIMEOUT_MS,
            shutdown_grace_ms: service::relay::SHUTDOWN_GRACE_MS,
            ping_interval_secs: service::relay::PING_INTERVAL_SECS,
            max_message_bytes: service::relay::MAX_MESSAGE_BYTES,
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            bind_address: service::catalog::DEFAULT_BIND_ADDRESS.to_string(),
            port: service::catalog::DEFAULT_PORT,
            enable_cors: true,
            max_body_bytes: service::catalog::MAX_BODY_BYTES,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: service::logging::DEFAULT_LEVEL.to_string(),
            json: false,
        }
    }
}

impl RelaySettings {
    /// Resolve the listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("Invalid relay bind address {}:{}", self.bind_address, self.port))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// `None` when keepalive pings are disabled
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }
}

impl CatalogSettings {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .with_context(|| format!("Invalid catalog bind address {}:{}", self.bind_address, self.port))
    }
}

impl ForensicConfig {
    /// Load configuration from an optional file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load configuration, reading overrides from `env` instead of the
    /// process environment when given
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading configuration file: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        // Override with environment variables (FORENSICVR__ prefix)
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.relay.write_queue_capacity == 0 {
            bail!("relay.write_queue_capacity must be greater than zero");
        }
        if self.relay.inbound_queue_capacity == 0 {
            bail!("relay.inbound_queue_capacity must be greater than zero");
        }
        if self.relay.max_message_bytes == 0 {
            bail!("relay.max_message_bytes must be greater than zero");
        }
        Ok(())
    }
}
