//! Client-side download completion watching.
//!
//! After submitting a request, a replica polls the replicated state instead of
//! listening for orchestrator events: polling needs no agreement about
//! notification paths and keeps working across a disconnect/reconnect in the
//! middle of a wait. Phase A is bounded so a missing host (nobody to claim the
//! request) turns into a clear error instead of an infinite hang; phase B is
//! unbounded because a download legitimately takes as long as it takes.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use core_doc::{ReplicaDocument, SequenceKind, SongRecord};

use crate::error::{KaraokeError, Result};

/// Poll pacing for [`CompletionWatcher::await_download`].
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Delay between polls in both phases.
    pub poll_interval: Duration,
    /// Bound on phase A: how long a request may stay `Pending` before the
    /// watcher concludes no orchestrator is running.
    pub start_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            start_timeout: Duration::from_millis(1000),
        }
    }
}

/// Watches DownloadRequests for the fate of one submitted key.
pub struct CompletionWatcher {
    document: ReplicaDocument,
    config: WatcherConfig,
    shutdown: CancellationToken,
}

impl CompletionWatcher {
    pub fn new(document: ReplicaDocument) -> Self {
        Self::with_config(document, WatcherConfig::default(), CancellationToken::new())
    }

    /// `shutdown` is cancelled by the owning session on teardown, which ends
    /// any in-flight wait with [`KaraokeError::Cancelled`] instead of leaking
    /// a poll loop against a dead document.
    pub fn with_config(
        document: ReplicaDocument,
        config: WatcherConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            document,
            config,
            shutdown,
        }
    }

    /// Wait for the download of `key` to complete.
    ///
    /// Phase A (bounded by `start_timeout`): resolves once the entry reaches
    /// `Downloading`; an entry that has already disappeared counts as success.
    /// Phase B (unbounded): resolves when the entry disappears, since the
    /// orchestrator only removes entries on success.
    ///
    /// # Errors
    ///
    /// - [`KaraokeError::StartTimeout`]: still `Pending` when the bound
    ///   elapsed - no orchestrator picked the request up.
    /// - [`KaraokeError::DownloadFailed`]: the entry was rewritten to `Error`.
    /// - [`KaraokeError::Cancelled`]: the owning session shut down mid-wait.
    pub async fn await_download(&self, key: &str) -> Result<()> {
        let deadline = Instant::now() + self.config.start_timeout;
        loop {
            match self.lookup(key).await {
                None => return Ok(()),
                Some(entry) if entry.is_downloading() => break,
                Some(entry) if entry.is_error() => return Err(failed(key, &entry)),
                Some(_) => {}
            }
            if Instant::now() >= deadline {
                debug!(key = %key, "download was never claimed");
                return Err(KaraokeError::StartTimeout {
                    key: key.to_string(),
                    waited_ms: self.config.start_timeout.as_millis() as u64,
                });
            }
            self.pause().await?;
        }

        loop {
            match self.lookup(key).await {
                None => return Ok(()),
                Some(entry) if entry.is_error() => return Err(failed(key, &entry)),
                Some(_) => {}
            }
            self.pause().await?;
        }
    }

    async fn lookup(&self, key: &str) -> Option<SongRecord> {
        self.document
            .sequence(SequenceKind::DownloadRequests)
            .snapshot()
            .await
            .into_iter()
            .find(|record| record.key == key)
    }

    async fn pause(&self) -> Result<()> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(KaraokeError::Cancelled),
            _ = tokio::time::sleep(self.config.poll_interval) => Ok(()),
        }
    }
}

fn failed(key: &str, entry: &SongRecord) -> KaraokeError {
    let message = entry
        .title
        .strip_prefix("Error: ")
        .unwrap_or(&entry.title)
        .to_string();
    KaraokeError::DownloadFailed {
        key: key.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> WatcherConfig {
        WatcherConfig {
            poll_interval: Duration::from_millis(10),
            start_timeout: Duration::from_millis(80),
        }
    }

    fn pending(key: &str) -> SongRecord {
        SongRecord::new(key, format!("Song {key}")).pending_download()
    }

    #[tokio::test]
    async fn test_start_timeout_when_nothing_claims_the_request() {
        let document = ReplicaDocument::new();
        document
            .sequence(SequenceKind::DownloadRequests)
            .push_back(&pending("abc"))
            .await;

        let watcher = CompletionWatcher::with_config(
            document,
            fast_config(),
            CancellationToken::new(),
        );
        let err = watcher.await_download("abc").await.unwrap_err();
        assert!(matches!(err, KaraokeError::StartTimeout { key, .. } if key == "abc"));
    }

    #[tokio::test]
    async fn test_error_entry_fails_immediately_in_phase_a() {
        let document = ReplicaDocument::new();
        document
            .sequence(SequenceKind::DownloadRequests)
            .push_back(&pending("abc").into_error("no such video"))
            .await;

        let watcher = CompletionWatcher::with_config(
            document,
            fast_config(),
            CancellationToken::new(),
        );
        let err = watcher.await_download("abc").await.unwrap_err();
        assert!(
            matches!(err, KaraokeError::DownloadFailed { message, .. } if message == "no such video")
        );
    }

    #[tokio::test]
    async fn test_missing_entry_counts_as_success() {
        let watcher = CompletionWatcher::with_config(
            ReplicaDocument::new(),
            fast_config(),
            CancellationToken::new(),
        );
        watcher.await_download("already-done").await.unwrap();
    }

    #[tokio::test]
    async fn test_phase_b_resolves_when_entry_disappears() {
        let document = ReplicaDocument::new();
        let downloads = document.sequence(SequenceKind::DownloadRequests);
        downloads
            .push_back(&pending("abc").into_downloading())
            .await;

        let watcher = CompletionWatcher::with_config(
            document.clone(),
            fast_config(),
            CancellationToken::new(),
        );
        let wait = tokio::spawn(async move { watcher.await_download("abc").await });

        tokio::time::sleep(Duration::from_millis(40)).await;
        downloads.delete_at(0, 1).await;

        wait.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_phase_b_fails_when_entry_turns_error() {
        let document = ReplicaDocument::new();
        let downloads = document.sequence(SequenceKind::DownloadRequests);
        downloads
            .push_back(&pending("abc").into_downloading())
            .await;

        let watcher = CompletionWatcher::with_config(
            document.clone(),
            fast_config(),
            CancellationToken::new(),
        );
        let wait = tokio::spawn(async move { watcher.await_download("abc").await });

        tokio::time::sleep(Duration::from_millis(40)).await;
        downloads
            .with_mut(|seq| {
                let failed = seq.get(0).unwrap().into_error("disk full");
                seq.remove(0, 1);
                seq.insert(0, &failed);
            })
            .await;

        let err = wait.await.unwrap().unwrap_err();
        assert!(matches!(err, KaraokeError::DownloadFailed { message, .. } if message == "disk full"));
    }

    #[tokio::test]
    async fn test_cancellation_ends_the_wait() {
        let document = ReplicaDocument::new();
        document
            .sequence(SequenceKind::DownloadRequests)
            .push_back(&pending("abc").into_downloading())
            .await;

        let token = CancellationToken::new();
        let watcher =
            CompletionWatcher::with_config(document, fast_config(), token.clone());
        let wait = tokio::spawn(async move { watcher.await_download("abc").await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();

        let err = wait.await.unwrap().unwrap_err();
        assert!(matches!(err, KaraokeError::Cancelled));
    }
}
