//! Media directory scanning.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use bridge_traits::error::Result;
use bridge_traits::{AvailableSong, SongLibrary};

/// Lists songs from a directory of media files named `<key>.<title>.<ext>`.
///
/// A missing directory is treated as an empty library, not an error, so a
/// fresh host starts with an empty catalog instead of refusing to boot.
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SongLibrary for DirectoryLibrary {
    async fn list_available(&self) -> Result<Vec<AvailableSong>> {
        if !self.root.exists() {
            debug!(root = %self.root.display(), "media directory missing, empty library");
            return Ok(Vec::new());
        }

        let mut songs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(song) = parse_file_name(name) {
                songs.push(song);
            } else {
                debug!(file = %name, "skipping file without key.title.ext name");
            }
        }
        Ok(songs)
    }
}

/// Split `<key>.<title>.<ext>` into key and title. The title may itself
/// contain dots; only the first segment and the final extension are peeled
/// off.
pub(crate) fn parse_file_name(name: &str) -> Option<AvailableSong> {
    let (key, rest) = name.split_once('.')?;
    let title = match rest.rsplit_once('.') {
        Some((title, _extension)) => title,
        None => rest,
    };
    if key.is_empty() || title.is_empty() {
        return None;
    }
    Some(AvailableSong::new(key, title))
}
