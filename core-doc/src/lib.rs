//! # Replicated Document
//!
//! The conflict-free replicated state shared by every karaoke replica.
//!
//! ## Overview
//!
//! This crate owns the three ordered sequences the rest of the system is built
//! on:
//!
//! - **Catalog** (`"all-songs"`): every song available for playback
//! - **Queue** (`"song-queue"`): play order, head next
//! - **DownloadRequests** (`"download-requests"`): the download work queue
//!
//! All three live inside a single [`yrs`] CRDT document wrapped by
//! [`ReplicaDocument`]. Components never hold their own copies of sequence
//! contents; they read snapshots, subscribe to change notifications, or run
//! compound mutations inside a single document transaction via
//! [`ReplicaDocument::with_mut`]. Bounds and duplicate checks therefore always
//! see the live array, never a stale cache.
//!
//! ## Replication
//!
//! The document exposes its merge machinery to the sync transport as opaque
//! byte payloads: state vectors describe what a replica already has, diffs
//! carry everything a peer is missing, and incremental updates stream every
//! local mutation. Applying a remote update never fails on concurrent edits -
//! concurrent inserts at the same index are both preserved and repeated
//! deletes are no-ops, which is the single correctness guarantee the queue and
//! download layers rely on.

pub mod document;
pub mod error;
pub mod record;

pub use document::{DocumentWriter, ReplicaDocument, SequenceHandle, SequenceKind, SequenceWriter};
pub use error::{DocError, Result};
pub use record::{DownloadStatus, SongRecord};
