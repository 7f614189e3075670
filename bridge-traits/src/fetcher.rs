//! Media Fetch Abstraction
//!
//! The opaque "download this song" operation performed by the host on behalf
//! of every connected viewer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// A successfully fetched, playable media asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedAsset {
    /// Stable external identifier the asset was requested under.
    pub key: String,
    /// Human-readable title reported by the media source.
    pub title: String,
    /// Performing artist, when the source reports one.
    pub artist: Option<String>,
    /// Duration in whole seconds, when the source reports one.
    pub duration: Option<u64>,
    /// Local path of the downloaded media, when the fetcher stores files.
    pub location: Option<PathBuf>,
}

impl FetchedAsset {
    /// Create an asset carrying only the fields every fetcher can supply.
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            artist: None,
            duration: None,
            location: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: u64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Async media fetch trait.
///
/// Given a stable media key, eventually produce a playable asset or fail.
/// The caller guarantees at most one `fetch` is in flight at a time; the
/// implementation does not need to dedupe or queue.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::fetcher::MediaFetcher;
///
/// async fn download(fetcher: &dyn MediaFetcher) -> bridge_traits::error::Result<String> {
///     let asset = fetcher.fetch("dQw4w9WgXcQ").await?;
///     Ok(asset.title)
/// }
/// ```
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the asset identified by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Fetch`](crate::BridgeError::Fetch) with a
    /// human-readable message when the media source rejects the key or the
    /// download cannot be completed.
    async fn fetch(&self, key: &str) -> Result<FetchedAsset>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_asset_builder() {
        let asset = FetchedAsset::new("abc123", "Test Song")
            .with_artist("Test Artist")
            .with_duration(215);

        assert_eq!(asset.key, "abc123");
        assert_eq!(asset.title, "Test Song");
        assert_eq!(asset.artist.as_deref(), Some("Test Artist"));
        assert_eq!(asset.duration, Some(215));
        assert!(asset.location.is_none());
    }
}
