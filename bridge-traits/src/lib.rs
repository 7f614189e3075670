//! # Host Bridge Traits
//!
//! External-collaborator traits that must be implemented by each host
//! environment.
//!
//! ## Overview
//!
//! This crate defines the contract between the replicated karaoke core and the
//! machinery that actually touches the outside world. The core never downloads
//! media or scans storage itself; it drives these capabilities through trait
//! objects so that tests can substitute mocks and hosts can substitute
//! whatever download pipeline they ship with.
//!
//! ## Traits
//!
//! - [`MediaFetcher`](fetcher::MediaFetcher) - Fetch a playable asset for a
//!   media key. Invoked only by the host replica's download orchestrator, at
//!   most once concurrently.
//! - [`SongLibrary`](library::SongLibrary) - Enumerate the already-downloaded
//!   songs used to populate the shared catalog at host startup.
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should convert their platform-specific errors into it and
//! keep the messages human-readable: fetch failures are surfaced verbatim to
//! the viewer that requested the download.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so they can be shared across
//! async tasks behind `Arc<dyn ...>`.

pub mod error;
pub mod fetcher;
pub mod library;

pub use error::BridgeError;
pub use fetcher::{FetchedAsset, MediaFetcher};
pub use library::{AvailableSong, SongLibrary};
