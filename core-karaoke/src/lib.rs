//! # Karaoke Queue Core
//!
//! Application semantics on top of the replicated document.
//!
//! ## Overview
//!
//! This crate turns the raw replicated sequences of `core-doc` into the
//! behavior viewers see:
//!
//! - **Queue Controller** (`controller`): add/remove/promote/demote/pop
//!   operations on the play queue and catalog, duplicate-key rejection,
//!   download submission, and the per-replica "currently playing" slot
//! - **Download Orchestrator** (`orchestrator`): the host-only single writer
//!   that turns pending download requests into catalog entries, one fetch at
//!   a time
//! - **Completion Watcher** (`watcher`): client-side two-phase polling that
//!   reports when a submitted download started, finished or failed
//! - **Session** (`session`): the explicit per-replica object wiring document,
//!   transport, controller and (on the host) orchestrator together
//!
//! ## Single-writer invariant
//!
//! Only the replica constructed with [`SessionRole::Host`] runs the
//! orchestrator, and only the orchestrator rewrites download request entries
//! past `Pending`. Everything else any replica does to DownloadRequests goes
//! through [`QueueController::submit_download`], which rejects keys that are
//! already catalogued or already in flight - so at most one downloader ever
//! works on a key, and at most one fetch is outstanding overall.

pub mod controller;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod watcher;

pub use controller::QueueController;
pub use error::{KaraokeError, Result};
pub use orchestrator::{DownloadOrchestrator, OrchestratorHandle};
pub use session::{KaraokeSession, SessionConfig, SessionRole};
pub use watcher::{CompletionWatcher, WatcherConfig};
