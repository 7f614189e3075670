//! Workspace facade crate.
//!
//! Host applications can depend on `karaoke-workspace` alone and reach every
//! workspace crate through the aliases below, instead of wiring each crate
//! individually. A typical host wires a session like this:
//!
//! ```ignore
//! use std::sync::Arc;
//! use karaoke_workspace::{bridge, desktop, karaoke, runtime};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     runtime::init_logging(runtime::LoggingConfig::default())?;
//!
//!     let config = karaoke::SessionConfig::default()
//!         .with_relay_listen(([0, 0, 0, 0], 9528).into());
//!     let session = karaoke::KaraokeSession::start(
//!         config,
//!         karaoke::SessionRole::Host {
//!             fetcher: Arc::new(desktop::CommandFetcher::new("yt-dlp", "media")),
//!             library: Arc::new(desktop::DirectoryLibrary::new("media")),
//!         },
//!     )
//!     .await?;
//!     // ... hand `session` to the UI layer ...
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```

pub use bridge_desktop as desktop;
pub use bridge_traits as bridge;
pub use core_doc as doc;
pub use core_karaoke as karaoke;
pub use core_runtime as runtime;
pub use core_sync as sync;
