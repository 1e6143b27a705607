//! # ForensicVR Centralized Configuration
//!
//! Configuration management and default values for the relay and the
//! catalogue service, so that binaries, tests and libraries agree on the
//! same numbers.
//!
//! ## Layering
//!
//! 1. Built-in defaults ([`service`])
//! 2. Optional TOML or JSON file
//! 3. Environment variables, prefix `FORENSICVR`, separator `__`
//!    (`FORENSICVR__RELAY__PORT=9191`)
//!
//! Command-line flags are applied on top by each binary.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relay_config::ForensicConfig;
//!
//! let config = ForensicConfig::load(None).unwrap();
//! assert_eq!(config.relay.port, relay_config::service::relay::DEFAULT_PORT);
//! ```

pub mod service;
pub mod service_config;

// Re-export commonly used types
pub use service_config::{
    CatalogSettings, ForensicConfig, LoggingSettings, RelaySettings, ENV_PREFIX, ENV_SEPARATOR,
};
