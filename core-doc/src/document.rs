//! Typed wrapper around the shared CRDT document.
//!
//! One [`ReplicaDocument`] per running replica. All access to the replicated
//! sequences funnels through here: snapshot reads, change subscriptions, and
//! compound mutations executed inside a single transaction. The sync transport
//! talks to the same object through the update/state-vector surface at the
//! bottom of this file.
//!
//! Change notification is payload-level rather than operation-level: every
//! committed mutation (local or remote) re-reads the affected sequences and
//! broadcasts the full resulting arrays to subscribers. Subscribers that fall
//! behind receive a `Lagged` error from the broadcast channel and are expected
//! to re-read a fresh snapshot, which is always safe because notifications
//! carry no deltas.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::warn;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Any, Array, ArrayRef, Doc, Out, ReadTxn, StateVector, Transact, TransactionMut, Update};

use crate::error::{DocError, Result};
use crate::record::SongRecord;

/// Buffer size for per-sequence change notifications.
const CHANGE_BUFFER: usize = 64;

/// Buffer size for outgoing replication updates.
const UPDATE_BUFFER: usize = 256;

/// The three replicated root sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    /// All songs available for playback.
    Catalog,
    /// Play order, head next.
    Queue,
    /// Download work queue.
    DownloadRequests,
}

impl SequenceKind {
    /// Every sequence, in broadcast order.
    pub const ALL: [SequenceKind; 3] = [
        SequenceKind::Catalog,
        SequenceKind::Queue,
        SequenceKind::DownloadRequests,
    ];

    /// Root name inside the shared document. The catalog and queue names
    /// predate this implementation and are kept for wire compatibility.
    pub fn root_name(&self) -> &'static str {
        match self {
            Self::Catalog => "all-songs",
            Self::Queue => "song-queue",
            Self::DownloadRequests => "download-requests",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Catalog => 0,
            Self::Queue => 1,
            Self::DownloadRequests => 2,
        }
    }
}

impl std::fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.root_name())
    }
}

struct DocState {
    doc: Doc,
    arrays: [ArrayRef; 3],
    /// Last broadcast snapshot per sequence, used to suppress no-op
    /// notifications (e.g. an update replay that was already known).
    last: [Vec<SongRecord>; 3],
}

struct Shared {
    state: Mutex<DocState>,
    changes: [broadcast::Sender<Vec<SongRecord>>; 3],
    updates: broadcast::Sender<Vec<u8>>,
}

/// Handle to the replicated document. Cloning is cheap; clones refer to the
/// same underlying document.
#[derive(Clone)]
pub struct ReplicaDocument {
    shared: Arc<Shared>,
}

impl Default for ReplicaDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaDocument {
    pub fn new() -> Self {
        let doc = Doc::new();
        let arrays = [
            doc.get_or_insert_array(SequenceKind::Catalog.root_name()),
            doc.get_or_insert_array(SequenceKind::Queue.root_name()),
            doc.get_or_insert_array(SequenceKind::DownloadRequests.root_name()),
        ];
        let changes = [
            broadcast::channel(CHANGE_BUFFER).0,
            broadcast::channel(CHANGE_BUFFER).0,
            broadcast::channel(CHANGE_BUFFER).0,
        ];
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DocState {
                    doc,
                    arrays,
                    last: [Vec::new(), Vec::new(), Vec::new()],
                }),
                changes,
                updates,
            }),
        }
    }

    /// Get a handle to one of the replicated sequences.
    pub fn sequence(&self, kind: SequenceKind) -> SequenceHandle {
        SequenceHandle {
            document: self.clone(),
            kind,
        }
    }

    /// Run a compound mutation against a single transaction.
    ///
    /// The closure gets live read access alongside write operations, so bound
    /// and duplicate checks are evaluated at execution time. The transaction
    /// commits when the closure returns; the resulting incremental update is
    /// broadcast to the sync transport and change subscribers are notified.
    pub async fn with_mut<R>(&self, f: impl FnOnce(&mut DocumentWriter<'_>) -> R) -> R {
        let mut state = self.shared.state.lock().await;
        let state = &mut *state;
        let mut writer = DocumentWriter {
            txn: state.doc.transact_mut(),
            arrays: state.arrays.clone(),
            dirty: false,
        };
        let out = f(&mut writer);
        let update = if writer.dirty {
            Some(writer.txn.encode_update_v1())
        } else {
            None
        };
        drop(writer);
        if let Some(update) = update {
            let _ = self.shared.updates.send(update);
            self.broadcast_changes(state);
        }
        out
    }

    /// Apply an update received from a peer replica.
    ///
    /// Idempotent: replaying an already-known update changes nothing and
    /// notifies nobody. Remote updates are not echoed back through
    /// [`subscribe_updates`](Self::subscribe_updates).
    pub async fn apply_update(&self, update: &[u8]) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        let decoded =
            Update::decode_v1(update).map_err(|e| DocError::MalformedUpdate(e.to_string()))?;
        let state = &mut *state;
        {
            let mut txn = state.doc.transact_mut();
            txn.apply_update(decoded)
                .map_err(|e| DocError::ApplyUpdate(e.to_string()))?;
        }
        self.broadcast_changes(state);
        Ok(())
    }

    /// Encode this replica's state vector (what it already has).
    pub async fn encode_state_vector(&self) -> Vec<u8> {
        let state = self.shared.state.lock().await;
        let sv = state.doc.transact().state_vector().encode_v1();
        sv
    }

    /// Encode everything a peer with the given state vector is missing.
    pub async fn encode_diff(&self, state_vector: &[u8]) -> Result<Vec<u8>> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| DocError::MalformedStateVector(e.to_string()))?;
        let state = self.shared.state.lock().await;
        let diff = state.doc.transact().encode_state_as_update_v1(&sv);
        Ok(diff)
    }

    /// Encode the complete document as one update.
    pub async fn encode_full_state(&self) -> Vec<u8> {
        let state = self.shared.state.lock().await;
        let full = state
            .doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default());
        full
    }

    /// Subscribe to locally-originated incremental updates, for the sync
    /// transport. A lagged receiver should fall back to
    /// [`encode_full_state`](Self::encode_full_state).
    pub fn subscribe_updates(&self) -> broadcast::Receiver<Vec<u8>> {
        self.shared.updates.subscribe()
    }

    fn broadcast_changes(&self, state: &mut DocState) {
        let snapshots = {
            let txn = state.doc.transact();
            [
                read_records(&txn, &state.arrays[0]),
                read_records(&txn, &state.arrays[1]),
                read_records(&txn, &state.arrays[2]),
            ]
        };
        for (kind, snapshot) in SequenceKind::ALL.into_iter().zip(snapshots) {
            let slot = kind.index();
            if state.last[slot] != snapshot {
                state.last[slot] = snapshot.clone();
                let _ = self.shared.changes[slot].send(snapshot);
            }
        }
    }
}

/// Handle to one replicated sequence.
#[derive(Clone)]
pub struct SequenceHandle {
    document: ReplicaDocument,
    kind: SequenceKind,
}

impl SequenceHandle {
    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// Ordered snapshot of the sequence. Malformed payloads (a peer running
    /// incompatible code) are skipped with a warning rather than poisoning
    /// the whole read.
    pub async fn snapshot(&self) -> Vec<SongRecord> {
        let state = self.document.shared.state.lock().await;
        let txn = state.doc.transact();
        read_records(&txn, &state.arrays[self.kind.index()])
    }

    pub async fn len(&self) -> usize {
        let state = self.document.shared.state.lock().await;
        let txn = state.doc.transact();
        state.arrays[self.kind.index()].len(&txn) as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Subscribe to change notifications carrying the full resulting array.
    /// Fires on every local or remote mutation of this sequence.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<SongRecord>> {
        self.document.shared.changes[self.kind.index()].subscribe()
    }

    /// Run a compound mutation scoped to this sequence. See
    /// [`ReplicaDocument::with_mut`].
    pub async fn with_mut<R>(&self, f: impl FnOnce(&mut SequenceWriter<'_, '_>) -> R) -> R {
        let kind = self.kind;
        self.document
            .with_mut(move |writer| f(&mut writer.sequence(kind)))
            .await
    }

    pub async fn insert_at(&self, index: usize, records: &[SongRecord]) {
        self.with_mut(|seq| {
            for (offset, record) in records.iter().enumerate() {
                seq.insert(index + offset, record);
            }
        })
        .await
    }

    /// Delete up to `count` entries starting at `index`. Out-of-bounds ranges
    /// are clamped; deleting past the end is a no-op, not an error.
    pub async fn delete_at(&self, index: usize, count: usize) {
        self.with_mut(|seq| {
            let len = seq.len();
            if index >= len {
                return;
            }
            seq.remove(index, count.min(len - index));
        })
        .await
    }

    pub async fn push_back(&self, record: &SongRecord) {
        self.with_mut(|seq| seq.push(record)).await
    }
}

/// Write access to the whole document inside one transaction.
pub struct DocumentWriter<'doc> {
    txn: TransactionMut<'doc>,
    arrays: [ArrayRef; 3],
    dirty: bool,
}

impl<'doc> DocumentWriter<'doc> {
    /// Borrow a writer for one sequence. Writers for different sequences can
    /// be taken one after another within the same transaction.
    pub fn sequence(&mut self, kind: SequenceKind) -> SequenceWriter<'_, 'doc> {
        SequenceWriter {
            txn: &mut self.txn,
            array: &self.arrays[kind.index()],
            dirty: &mut self.dirty,
        }
    }
}

/// Read and write operations on one sequence inside a live transaction.
pub struct SequenceWriter<'w, 'doc> {
    txn: &'w mut TransactionMut<'doc>,
    array: &'w ArrayRef,
    dirty: &'w mut bool,
}

impl SequenceWriter<'_, '_> {
    pub fn len(&self) -> usize {
        self.array.len(&*self.txn) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<SongRecord> {
        self.array
            .get(&*self.txn, index as u32)
            .and_then(|out| decode_record(&out))
    }

    pub fn records(&self) -> Vec<SongRecord> {
        read_records(&*self.txn, self.array)
    }

    /// Index of the entry with the given key, if present.
    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.records().iter().position(|record| record.key == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position_of(key).is_some()
    }

    pub fn insert(&mut self, index: usize, record: &SongRecord) {
        self.array
            .insert(&mut *self.txn, index as u32, encode_record(record));
        *self.dirty = true;
    }

    pub fn push(&mut self, record: &SongRecord) {
        self.array.push_back(&mut *self.txn, encode_record(record));
        *self.dirty = true;
    }

    pub fn remove(&mut self, index: usize, count: usize) {
        self.array
            .remove_range(&mut *self.txn, index as u32, count as u32);
        *self.dirty = true;
    }

    pub fn clear(&mut self) {
        let len = self.len();
        if len > 0 {
            self.remove(0, len);
        }
    }
}

fn encode_record(record: &SongRecord) -> Any {
    let payload =
        serde_json::to_string(record).expect("song record serializes to JSON");
    Any::from(payload)
}

fn decode_record(out: &Out) -> Option<SongRecord> {
    match out {
        Out::Any(Any::String(raw)) => match serde_json::from_str(raw.as_ref()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "skipping malformed record payload");
                None
            }
        },
        other => {
            warn!(?other, "skipping non-record sequence entry");
            None
        }
    }
}

fn read_records<T: ReadTxn>(txn: &T, array: &ArrayRef) -> Vec<SongRecord> {
    array
        .iter(txn)
        .filter_map(|out| decode_record(&out))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(key: &str) -> SongRecord {
        SongRecord::new(key, format!("Song {key}"))
    }

    /// Push every update from `source` into `target` until none are queued.
    async fn drain_updates(
        rx: &mut broadcast::Receiver<Vec<u8>>,
        target: &ReplicaDocument,
    ) {
        while let Ok(update) = rx.try_recv() {
            target.apply_update(&update).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_insert_and_snapshot_preserve_order() {
        let doc = ReplicaDocument::new();
        let queue = doc.sequence(SequenceKind::Queue);

        queue.push_back(&song("a")).await;
        queue.push_back(&song("c")).await;
        queue.insert_at(1, &[song("b")]).await;

        let keys: Vec<_> = queue
            .snapshot()
            .await
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_delete_out_of_bounds_is_noop() {
        let doc = ReplicaDocument::new();
        let queue = doc.sequence(SequenceKind::Queue);
        queue.push_back(&song("a")).await;

        queue.delete_at(5, 1).await;
        queue.delete_at(0, 10).await;

        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_change_subscription_receives_full_array() {
        let doc = ReplicaDocument::new();
        let queue = doc.sequence(SequenceKind::Queue);
        let mut changes = queue.subscribe();

        queue.push_back(&song("a")).await;
        let snapshot = changes.recv().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].key, "a");

        queue.delete_at(0, 1).await;
        let snapshot = changes.recv().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_mutating_one_sequence_does_not_notify_others() {
        let doc = ReplicaDocument::new();
        let mut catalog_changes = doc.sequence(SequenceKind::Catalog).subscribe();

        doc.sequence(SequenceKind::Queue)
            .push_back(&song("a"))
            .await;

        assert!(matches!(
            catalog_changes.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_two_replicas_converge_via_diff_exchange() {
        let a = ReplicaDocument::new();
        let b = ReplicaDocument::new();

        a.sequence(SequenceKind::Queue).push_back(&song("a1")).await;
        b.sequence(SequenceKind::Queue).push_back(&song("b1")).await;

        // Full bidirectional handshake, as the transport performs on connect.
        let diff_for_b = a.encode_diff(&b.encode_state_vector().await).await.unwrap();
        b.apply_update(&diff_for_b).await.unwrap();
        let diff_for_a = b.encode_diff(&a.encode_state_vector().await).await.unwrap();
        a.apply_update(&diff_for_a).await.unwrap();

        let keys_a: Vec<_> = a
            .sequence(SequenceKind::Queue)
            .snapshot()
            .await
            .into_iter()
            .map(|r| r.key)
            .collect();
        let keys_b: Vec<_> = b
            .sequence(SequenceKind::Queue)
            .snapshot()
            .await
            .into_iter()
            .map(|r| r.key)
            .collect();

        assert_eq!(keys_a, keys_b);
        assert_eq!(keys_a.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_same_index_inserts_both_preserved() {
        let a = ReplicaDocument::new();
        let b = ReplicaDocument::new();
        let mut a_updates = a.subscribe_updates();
        let mut b_updates = b.subscribe_updates();

        a.sequence(SequenceKind::Queue)
            .insert_at(0, &[song("from-a")])
            .await;
        b.sequence(SequenceKind::Queue)
            .insert_at(0, &[song("from-b")])
            .await;

        drain_updates(&mut a_updates, &b).await;
        drain_updates(&mut b_updates, &a).await;

        let snapshot_a = a.sequence(SequenceKind::Queue).snapshot().await;
        let snapshot_b = b.sequence(SequenceKind::Queue).snapshot().await;
        assert_eq!(snapshot_a.len(), 2);
        assert_eq!(snapshot_a, snapshot_b);
    }

    #[tokio::test]
    async fn test_concurrent_deletes_are_idempotent() {
        let a = ReplicaDocument::new();
        let b = ReplicaDocument::new();

        a.sequence(SequenceKind::Queue).push_back(&song("x")).await;
        a.sequence(SequenceKind::Queue).push_back(&song("y")).await;
        b.apply_update(&a.encode_full_state().await).await.unwrap();

        // Both replicas delete the head while apart.
        let mut a_updates = a.subscribe_updates();
        let mut b_updates = b.subscribe_updates();
        a.sequence(SequenceKind::Queue).delete_at(0, 1).await;
        b.sequence(SequenceKind::Queue).delete_at(0, 1).await;

        drain_updates(&mut a_updates, &b).await;
        drain_updates(&mut b_updates, &a).await;

        let keys_a: Vec<_> = a
            .sequence(SequenceKind::Queue)
            .snapshot()
            .await
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys_a, ["y"]);
        assert_eq!(
            a.sequence(SequenceKind::Queue).snapshot().await,
            b.sequence(SequenceKind::Queue).snapshot().await
        );
    }

    #[tokio::test]
    async fn test_replaying_known_update_is_noop() {
        let a = ReplicaDocument::new();
        let b = ReplicaDocument::new();
        let mut a_updates = a.subscribe_updates();

        a.sequence(SequenceKind::Queue).push_back(&song("x")).await;
        let update = a_updates.recv().await.unwrap();

        b.apply_update(&update).await.unwrap();
        b.apply_update(&update).await.unwrap();

        assert_eq!(b.sequence(SequenceKind::Queue).len().await, 1);
    }

    #[tokio::test]
    async fn test_remote_updates_are_not_echoed() {
        let a = ReplicaDocument::new();
        let b = ReplicaDocument::new();

        a.sequence(SequenceKind::Queue).push_back(&song("x")).await;

        let mut b_updates = b.subscribe_updates();
        b.apply_update(&a.encode_full_state().await).await.unwrap();

        assert!(matches!(
            b_updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_malformed_update_is_rejected() {
        let doc = ReplicaDocument::new();
        assert!(matches!(
            doc.apply_update(&[0xff, 0x00, 0x13, 0x37]).await,
            Err(DocError::MalformedUpdate(_) | DocError::ApplyUpdate(_))
        ));
    }

    #[tokio::test]
    async fn test_compound_mutation_is_atomic_per_notification() {
        let doc = ReplicaDocument::new();
        let queue = doc.sequence(SequenceKind::Queue);
        queue.push_back(&song("a")).await;
        queue.push_back(&song("b")).await;

        let mut changes = queue.subscribe();

        // A value move (delete + reinsert) lands as a single notification.
        queue
            .with_mut(|seq| {
                if let Some(record) = seq.get(1) {
                    seq.remove(1, 1);
                    seq.insert(0, &record);
                }
            })
            .await;

        let snapshot = changes.recv().await.unwrap();
        let keys: Vec<_> = snapshot.into_iter().map(|r| r.key).collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
