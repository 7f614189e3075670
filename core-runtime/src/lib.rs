//! # Runtime Infrastructure
//!
//! Ambient services shared by every replica process. Currently this is the
//! logging bootstrap; replicas call [`logging::init_logging`] once at startup
//! and use the `tracing` macros everywhere else.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
