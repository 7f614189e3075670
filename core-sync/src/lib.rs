//! # Sync Transport
//!
//! Exchanges replicated document updates between replicas and a rendezvous
//! relay.
//!
//! ## Overview
//!
//! The transport is deliberately thin: it moves opaque byte payloads produced
//! by `core-doc` and leaves every consistency question to the document's merge
//! semantics. Three frame types cover the whole protocol:
//!
//! 1. On connect, each side announces its **state vector** (what it already
//!    has).
//! 2. A received state vector is answered with the matching **diff**.
//! 3. Thereafter incremental **updates** stream in both directions.
//!
//! Because a state vector describes everything a replica knows, the same
//! handshake that brings up a fresh connection also heals an arbitrary
//! partition: whatever either side wrote while apart is contained in the first
//! diff exchange after reconnect. Redundant delivery is harmless - applying a
//! known update is a no-op.
//!
//! ## Components
//!
//! - **Wire frames** (`protocol`): tagged binary encoding of the three frame
//!   types
//! - **Relay** (`relay`): warp WebSocket endpoint, one room (and room
//!   document) per document id, fanning updates out to all other peers
//! - **Provider** (`provider`): reconnecting client; the document stays
//!   locally writable while offline and flushes on reconnect

pub mod error;
pub mod protocol;
pub mod provider;
pub mod relay;

pub use error::{Result, SyncError};
pub use protocol::SyncMessage;
pub use provider::{ConnectionStatus, ProviderConfig, SyncProvider};
pub use relay::RelayServer;
