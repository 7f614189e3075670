//! Queue and catalog operations.
//!
//! Every mutation runs inside a single document transaction and re-checks
//! bounds and duplicate keys against the live sequence at execution time -
//! another replica may have changed the array since the caller looked at it.
//! Reorders move the *value*, not the slot (delete then reinsert), so two
//! replicas reordering concurrently still converge.

use rand::Rng;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use core_doc::{ReplicaDocument, SequenceKind, SongRecord};

use crate::error::{KaraokeError, Result};

/// Per-replica queue operations plus the local "currently playing" slot.
pub struct QueueController {
    document: ReplicaDocument,
    // Playback is per-viewer; this is deliberately not replicated.
    currently_playing: Mutex<Option<SongRecord>>,
}

impl QueueController {
    pub fn new(document: ReplicaDocument) -> Self {
        Self {
            document,
            currently_playing: Mutex::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Queue mutations
    // ------------------------------------------------------------------

    /// Append a song to the play queue.
    ///
    /// # Errors
    ///
    /// [`KaraokeError::DuplicateKey`] when the key is already queued.
    pub async fn add_to_queue(&self, song: SongRecord) -> Result<()> {
        self.document
            .sequence(SequenceKind::Queue)
            .with_mut(|seq| {
                if seq.contains_key(&song.key) {
                    return Err(KaraokeError::DuplicateKey {
                        key: song.key.clone(),
                    });
                }
                seq.push(&song);
                Ok(())
            })
            .await?;
        debug!(key = %song.key, "queued song");
        Ok(())
    }

    /// Remove the entry at `index`. Out-of-bounds indices are a no-op, since
    /// the queue may have shrunk since the caller rendered it.
    pub async fn remove_from_queue(&self, index: usize) {
        self.document
            .sequence(SequenceKind::Queue)
            .with_mut(|seq| {
                if index < seq.len() {
                    seq.remove(index, 1);
                }
            })
            .await
    }

    /// Move the entry at `index` one position toward the head. No-op at the
    /// head or out of bounds.
    pub async fn promote(&self, index: usize) {
        self.document
            .sequence(SequenceKind::Queue)
            .with_mut(|seq| {
                if index == 0 || index >= seq.len() {
                    return;
                }
                if let Some(record) = seq.get(index) {
                    seq.remove(index, 1);
                    seq.insert(index - 1, &record);
                }
            })
            .await
    }

    /// Move the entry at `index` one position toward the tail. No-op on the
    /// last entry or out of bounds.
    pub async fn demote(&self, index: usize) {
        self.document
            .sequence(SequenceKind::Queue)
            .with_mut(|seq| {
                let len = seq.len();
                if len == 0 || index >= len - 1 {
                    return;
                }
                if let Some(record) = seq.get(index) {
                    seq.remove(index, 1);
                    seq.insert(index + 1, &record);
                }
            })
            .await
    }

    /// Remove and return the head of the queue.
    pub async fn pop_front(&self) -> Option<SongRecord> {
        self.document
            .sequence(SequenceKind::Queue)
            .with_mut(|seq| {
                let head = seq.get(0)?;
                seq.remove(0, 1);
                Some(head)
            })
            .await
    }

    // ------------------------------------------------------------------
    // Playback (local to this replica)
    // ------------------------------------------------------------------

    /// Advance playback to the head of the queue. Leaves the current song
    /// unchanged when the queue is empty.
    pub async fn play_next(&self) -> Option<SongRecord> {
        let next = self.pop_front().await?;
        info!(key = %next.key, title = %next.title, "now playing");
        *self.currently_playing.lock().await = Some(next.clone());
        Some(next)
    }

    /// Play a uniformly random catalog entry.
    pub async fn play_random(&self) -> Option<SongRecord> {
        let catalog = self.catalog().await;
        if catalog.is_empty() {
            return None;
        }
        let pick = catalog[rand::thread_rng().gen_range(0..catalog.len())].clone();
        info!(key = %pick.key, title = %pick.title, "now playing (random)");
        *self.currently_playing.lock().await = Some(pick.clone());
        Some(pick)
    }

    pub async fn currently_playing(&self) -> Option<SongRecord> {
        self.currently_playing.lock().await.clone()
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Replace the whole catalog, as the host does at startup.
    pub async fn replace_catalog(&self, songs: Vec<SongRecord>) {
        self.document
            .sequence(SequenceKind::Catalog)
            .with_mut(|seq| {
                seq.clear();
                for song in &songs {
                    seq.push(song);
                }
            })
            .await
    }

    /// Append one song to the catalog.
    ///
    /// # Errors
    ///
    /// [`KaraokeError::DuplicateKey`] when the key is already catalogued.
    pub async fn add_to_catalog(&self, song: SongRecord) -> Result<()> {
        self.document
            .sequence(SequenceKind::Catalog)
            .with_mut(|seq| {
                if seq.contains_key(&song.key) {
                    return Err(KaraokeError::DuplicateKey {
                        key: song.key.clone(),
                    });
                }
                seq.push(&song);
                Ok(())
            })
            .await
    }

    // ------------------------------------------------------------------
    // Download requests
    // ------------------------------------------------------------------

    /// Submit a download request for `song`.
    ///
    /// The catalog check and the request insertion happen in one transaction:
    /// DownloadRequests is the sole coordination point preventing duplicate
    /// downloads, so the decision must be made against the live array. A
    /// leftover `Error` entry for the same key is replaced by the fresh
    /// submission.
    ///
    /// # Errors
    ///
    /// [`KaraokeError::AlreadyExists`] when the key is catalogued or already
    /// pending/downloading.
    pub async fn submit_download(&self, song: SongRecord) -> Result<()> {
        let result = self
            .document
            .with_mut(|writer| {
                if writer.sequence(SequenceKind::Catalog).contains_key(&song.key) {
                    return Err(KaraokeError::AlreadyExists {
                        key: song.key.clone(),
                    });
                }
                let mut downloads = writer.sequence(SequenceKind::DownloadRequests);
                if let Some(index) = downloads.position_of(&song.key) {
                    match downloads.get(index) {
                        Some(existing) if existing.is_error() => {
                            downloads.remove(index, 1);
                        }
                        _ => {
                            return Err(KaraokeError::AlreadyExists {
                                key: song.key.clone(),
                            })
                        }
                    }
                }
                downloads.push(&song.clone().pending_download());
                Ok(())
            })
            .await;
        if result.is_ok() {
            info!(key = %song.key, "submitted download request");
        }
        result
    }

    /// Remove a failed download entry. Returns false when there is no `Error`
    /// entry for `key`. Pending and downloading entries are never touched -
    /// those belong to the orchestrator.
    pub async fn clear_failed(&self, key: &str) -> bool {
        let cleared = self
            .document
            .sequence(SequenceKind::DownloadRequests)
            .with_mut(|seq| match seq.position_of(key) {
                Some(index) if seq.get(index).is_some_and(|r| r.is_error()) => {
                    seq.remove(index, 1);
                    true
                }
                _ => false,
            })
            .await;
        if cleared {
            info!(key = %key, "cleared failed download entry");
        }
        cleared
    }

    // ------------------------------------------------------------------
    // Read-only UI boundary
    // ------------------------------------------------------------------

    pub async fn queue(&self) -> Vec<SongRecord> {
        self.document.sequence(SequenceKind::Queue).snapshot().await
    }

    pub async fn catalog(&self) -> Vec<SongRecord> {
        self.document
            .sequence(SequenceKind::Catalog)
            .snapshot()
            .await
    }

    pub async fn download_requests(&self) -> Vec<SongRecord> {
        self.document
            .sequence(SequenceKind::DownloadRequests)
            .snapshot()
            .await
    }

    pub fn subscribe_queue(&self) -> broadcast::Receiver<Vec<SongRecord>> {
        self.document.sequence(SequenceKind::Queue).subscribe()
    }

    pub fn subscribe_catalog(&self) -> broadcast::Receiver<Vec<SongRecord>> {
        self.document.sequence(SequenceKind::Catalog).subscribe()
    }

    pub fn subscribe_download_requests(&self) -> broadcast::Receiver<Vec<SongRecord>> {
        self.document
            .sequence(SequenceKind::DownloadRequests)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(key: &str) -> SongRecord {
        SongRecord::new(key, format!("Song {key}"))
    }

    fn controller() -> QueueController {
        QueueController::new(ReplicaDocument::new())
    }

    async fn keys(controller: &QueueController) -> Vec<String> {
        controller
            .queue()
            .await
            .into_iter()
            .map(|r| r.key)
            .collect()
    }

    #[tokio::test]
    async fn test_queue_length_tracks_adds_and_removes() {
        let controller = controller();
        for key in ["a", "b", "c", "d"] {
            controller.add_to_queue(song(key)).await.unwrap();
        }
        controller.remove_from_queue(1).await;
        controller.promote(2).await;
        controller.demote(0).await;

        let queue = controller.queue().await;
        assert_eq!(queue.len(), 3);
        let mut seen = std::collections::HashSet::new();
        assert!(queue.iter().all(|r| seen.insert(r.key.clone())));
    }

    #[tokio::test]
    async fn test_add_duplicate_key_is_rejected() {
        let controller = controller();
        controller.add_to_queue(song("a")).await.unwrap();
        let err = controller.add_to_queue(song("a")).await.unwrap_err();
        assert!(matches!(err, KaraokeError::DuplicateKey { key } if key == "a"));
        assert_eq!(keys(&controller).await, ["a"]);
    }

    #[tokio::test]
    async fn test_promote_moves_value_toward_head() {
        let controller = controller();
        for key in ["a", "b", "c"] {
            controller.add_to_queue(song(key)).await.unwrap();
        }
        controller.promote(2).await;
        assert_eq!(keys(&controller).await, ["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_promote_head_and_demote_last_are_noops() {
        let controller = controller();
        for key in ["a", "b", "c"] {
            controller.add_to_queue(song(key)).await.unwrap();
        }
        controller.promote(0).await;
        controller.demote(2).await;
        controller.promote(9).await;
        controller.demote(9).await;
        assert_eq!(keys(&controller).await, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_demote_on_empty_queue_is_noop() {
        let controller = controller();
        controller.demote(0).await;
        assert!(keys(&controller).await.is_empty());
    }

    #[tokio::test]
    async fn test_pop_front_returns_head_in_order() {
        let controller = controller();
        for key in ["a", "b"] {
            controller.add_to_queue(song(key)).await.unwrap();
        }
        assert_eq!(controller.pop_front().await.unwrap().key, "a");
        assert_eq!(controller.pop_front().await.unwrap().key, "b");
        assert!(controller.pop_front().await.is_none());
    }

    #[tokio::test]
    async fn test_play_next_sets_currently_playing() {
        let controller = controller();
        controller.add_to_queue(song("a")).await.unwrap();

        let played = controller.play_next().await.unwrap();
        assert_eq!(played.key, "a");
        assert_eq!(controller.currently_playing().await.unwrap().key, "a");
        assert!(keys(&controller).await.is_empty());

        // Empty queue leaves the current song in place.
        assert!(controller.play_next().await.is_none());
        assert_eq!(controller.currently_playing().await.unwrap().key, "a");
    }

    #[tokio::test]
    async fn test_play_random_picks_from_catalog() {
        let controller = controller();
        assert!(controller.play_random().await.is_none());

        controller.add_to_catalog(song("only")).await.unwrap();
        assert_eq!(controller.play_random().await.unwrap().key, "only");
    }

    #[tokio::test]
    async fn test_submit_for_catalogued_key_fails_and_changes_nothing() {
        let controller = controller();
        controller.add_to_catalog(song("known")).await.unwrap();

        let err = controller.submit_download(song("known")).await.unwrap_err();
        assert!(matches!(err, KaraokeError::AlreadyExists { key } if key == "known"));
        assert!(controller.download_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_submissions_yield_one_entry() {
        let controller = std::sync::Arc::new(controller());
        let submits: Vec<_> = (0..4)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move { controller.submit_download(song("same")).await })
            })
            .collect();

        let mut accepted = 0;
        for submit in submits {
            if submit.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        let requests = controller.download_requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_pending());
    }

    #[tokio::test]
    async fn test_resubmission_replaces_error_entry() {
        let controller = controller();
        controller.submit_download(song("flaky")).await.unwrap();

        // Simulate an orchestrator failure rewrite.
        controller
            .document
            .sequence(SequenceKind::DownloadRequests)
            .with_mut(|seq| {
                let failed = seq.get(0).unwrap().into_error("boom");
                seq.remove(0, 1);
                seq.insert(0, &failed);
            })
            .await;

        controller.submit_download(song("flaky")).await.unwrap();
        let requests = controller.download_requests().await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].is_pending());
    }

    #[tokio::test]
    async fn test_clear_failed_only_touches_error_entries() {
        let controller = controller();
        controller.submit_download(song("pending")).await.unwrap();
        assert!(!controller.clear_failed("pending").await);
        assert!(!controller.clear_failed("missing").await);

        controller
            .document
            .sequence(SequenceKind::DownloadRequests)
            .with_mut(|seq| {
                let failed = seq.get(0).unwrap().into_error("boom");
                seq.remove(0, 1);
                seq.insert(0, &failed);
            })
            .await;
        assert!(controller.clear_failed("pending").await);
        assert!(controller.download_requests().await.is_empty());
    }
}
