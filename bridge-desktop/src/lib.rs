//! # Desktop Bridge
//!
//! Desktop implementations of the `bridge-traits` seams:
//!
//! - [`DirectoryLibrary`]: enumerates downloaded songs from a media directory
//!   whose files are named `<key>.<title>.<ext>`
//! - [`CommandFetcher`]: fetches media by running an external downloader
//!   program (e.g. `yt-dlp`) once per key
//!
//! Hosts with a different storage layout or download pipeline implement the
//! traits themselves; nothing in the core depends on these types.

pub mod command_fetcher;
pub mod directory_library;

pub use command_fetcher::CommandFetcher;
pub use directory_library::DirectoryLibrary;
