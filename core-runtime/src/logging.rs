//! # Logging & Tracing Infrastructure
//!
//! Configures the `tracing-subscriber` stack used by every binary and test
//! harness in the workspace.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LoggingConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     init_logging(LoggingConfig::default()).expect("failed to initialize logging");
//!     tracing::info!("replica started");
//! }
//! ```
//!
//! The `RUST_LOG` environment variable, when set, overrides the configured
//! default filter, so operators can raise verbosity per module without a
//! rebuild (`RUST_LOG=core_sync=debug`).

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format with colors
    Pretty,
    /// Structured JSON format for machine parsing
    Json,
    /// Compact format for production
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Compact;
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            default_filter: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// Initialize the global tracing subscriber.
///
/// # Errors
///
/// Fails when the filter directive cannot be parsed or when a global
/// subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| Error::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Pretty => builder
            .pretty()
            .try_init()
            .map_err(|e| Error::Logging(e.to_string())),
        LogFormat::Json => builder
            .json()
            .try_init()
            .map_err(|e| Error::Logging(e.to_string())),
        LogFormat::Compact => builder
            .compact()
            .try_init()
            .map_err(|e| Error::Logging(e.to_string())),
    }
}
