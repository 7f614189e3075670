//! Host-only download orchestration.
//!
//! One task per host replica. It watches DownloadRequests, claims the earliest
//! `Pending` entry by rewriting it to `Downloading` in a single transaction,
//! then runs the fetch to completion before looking at the queue again - so at
//! most one fetch is ever in flight, and the `Downloading` transition is
//! replicated before any external work starts (the completion watcher's
//! bounded wait depends on that ordering).
//!
//! State machine per key:
//!
//! ```text
//! Pending -> Downloading -> removed (success, catalog entry appended)
//!                        -> Error   (left in place, title carries the message)
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bridge_traits::MediaFetcher;
use core_doc::{ReplicaDocument, SequenceKind, SongRecord};

/// The host replica's single-writer download worker.
pub struct DownloadOrchestrator {
    document: ReplicaDocument,
    fetcher: Arc<dyn MediaFetcher>,
}

/// Handle to a running orchestrator task.
pub struct OrchestratorHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Cancel the task and wait for it to wind down. An in-flight fetch is
    /// abandoned at its await point; its entry stays `Downloading` until an
    /// operator clears it or the host restarts.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "orchestrator task panicked during shutdown");
        }
    }
}

impl DownloadOrchestrator {
    pub fn new(document: ReplicaDocument, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self { document, fetcher }
    }

    /// Start the orchestrator task.
    pub fn spawn(self) -> OrchestratorHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        OrchestratorHandle { shutdown, task }
    }

    async fn run(self, token: CancellationToken) {
        let downloads = self.document.sequence(SequenceKind::DownloadRequests);
        // Subscribe before the initial scan so a submission arriving in
        // between is seen either by the scan or by the subscription.
        let mut changes = downloads.subscribe();
        info!("download orchestrator started");

        loop {
            while let Some(claimed) = self.claim_next().await {
                if token.is_cancelled() {
                    return;
                }
                self.process(claimed).await;
            }
            tokio::select! {
                _ = token.cancelled() => {
                    info!("download orchestrator stopped");
                    return;
                }
                change = changes.recv() => match change {
                    Ok(_) => {}
                    // Fell behind; the rescan above reads the live state anyway.
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }

    /// Claim the earliest pending entry: rewrite it to `Downloading` in place,
    /// within one transaction, so every replica sees the claim before the
    /// fetch begins.
    async fn claim_next(&self) -> Option<SongRecord> {
        self.document
            .sequence(SequenceKind::DownloadRequests)
            .with_mut(|seq| {
                let records = seq.records();
                let index = records.iter().position(|record| record.is_pending())?;
                let claimed = records[index].clone().into_downloading();
                seq.remove(index, 1);
                seq.insert(index, &claimed);
                Some(claimed)
            })
            .await
    }

    async fn process(&self, record: SongRecord) {
        info!(key = %record.key, "starting download");
        match self.fetcher.fetch(&record.key).await {
            Ok(asset) => {
                info!(key = %record.key, title = %asset.title, "download finished");
                self.document
                    .with_mut(|writer| {
                        {
                            let mut downloads =
                                writer.sequence(SequenceKind::DownloadRequests);
                            // Locate by key: concurrent edits may have moved the
                            // entry since it was claimed.
                            if let Some(index) = downloads.position_of(&record.key) {
                                downloads.remove(index, 1);
                            } else {
                                debug!(key = %record.key, "claimed entry vanished before completion");
                            }
                        }
                        let mut catalog = writer.sequence(SequenceKind::Catalog);
                        if !catalog.contains_key(&record.key) {
                            catalog.push(&record.clone().into_catalogued(&asset));
                        }
                    })
                    .await;
            }
            Err(e) => {
                let message = e.to_string();
                warn!(key = %record.key, error = %message, "download failed");
                self.document
                    .sequence(SequenceKind::DownloadRequests)
                    .with_mut(|seq| {
                        if let Some(index) = seq.position_of(&record.key) {
                            let failed = record.clone().into_error(&message);
                            seq.remove(index, 1);
                            seq.insert(index, &failed);
                        }
                    })
                    .await;
            }
        }
    }
}
