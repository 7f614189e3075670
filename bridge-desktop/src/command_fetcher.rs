//! External downloader invocation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{FetchedAsset, MediaFetcher};

use crate::directory_library::parse_file_name;

/// Fetches media by running an external downloader program once per key.
///
/// The program is invoked as `<program> <extra args...> <key>` with the save
/// directory as working directory and is expected to leave behind a file named
/// `<key>.<title>.<ext>`, the same layout [`crate::DirectoryLibrary`] scans.
/// stderr of a failing program becomes the fetch error message shown to the
/// submitting viewer.
pub struct CommandFetcher {
    program: PathBuf,
    save_dir: PathBuf,
    extra_args: Vec<String>,
}

impl CommandFetcher {
    pub fn new(program: impl Into<PathBuf>, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            save_dir: save_dir.into(),
            extra_args: Vec::new(),
        }
    }

    /// Arguments placed before the key, e.g. format selection flags.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn fetch_error(&self, key: &str, message: impl Into<String>) -> BridgeError {
        BridgeError::Fetch {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Locate the file the downloader produced for `key`.
    async fn find_downloaded(&self, key: &str) -> Option<(PathBuf, String)> {
        let prefix = format!("{key}.");
        let mut entries = tokio::fs::read_dir(&self.save_dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&prefix) {
                if let Some(song) = parse_file_name(name) {
                    return Some((entry.path(), song.title));
                }
            }
        }
        None
    }
}

#[async_trait]
impl MediaFetcher for CommandFetcher {
    async fn fetch(&self, key: &str) -> Result<FetchedAsset> {
        info!(key = %key, program = %self.program.display(), "running downloader");
        let output = Command::new(&self.program)
            .args(&self.extra_args)
            .arg(key)
            .current_dir(&self.save_dir)
            .output()
            .await
            .map_err(|e| {
                self.fetch_error(
                    key,
                    format!("failed to run {}: {e}", self.program.display()),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.fetch_error(
                key,
                format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    output.status,
                    stderr.trim()
                ),
            ));
        }
        debug!(key = %key, "downloader finished");

        match self.find_downloaded(key).await {
            Some((location, title)) => {
                Ok(FetchedAsset::new(key, title).with_location(location))
            }
            None => Err(self.fetch_error(
                key,
                format!(
                    "downloader succeeded but produced no {key}.* file in {}",
                    self.save_dir.display()
                ),
            )),
        }
    }
}

impl std::fmt::Debug for CommandFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandFetcher")
            .field("program", &self.program)
            .field("save_dir", &self.save_dir)
            .finish_non_exhaustive()
    }
}
