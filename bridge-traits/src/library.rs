//! Song Library Abstraction
//!
//! Enumerates the songs already available for playback on the host. Invoked
//! once at host startup to seed the shared catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One locally available song as reported by the host's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSong {
    /// Stable external identifier (e.g. the media id the file was fetched under).
    pub key: String,
    /// Human-readable title.
    pub title: String,
    /// Performing artist, when known.
    pub artist: Option<String>,
    /// Duration in whole seconds, when known.
    pub duration: Option<u64>,
}

impl AvailableSong {
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            artist: None,
            duration: None,
        }
    }
}

/// Async song enumeration trait.
#[async_trait]
pub trait SongLibrary: Send + Sync {
    /// List every song available for playback.
    ///
    /// Order is not significant; the catalog keeps whatever order the
    /// implementation returns.
    async fn list_available(&self) -> Result<Vec<AvailableSong>>;
}
