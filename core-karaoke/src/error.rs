use thiserror::Error;

#[derive(Error, Debug)]
pub enum KaraokeError {
    #[error("Song {key} is already in the queue")]
    DuplicateKey { key: String },

    #[error("Song {key} already exists in the catalog or download queue")]
    AlreadyExists { key: String },

    #[error("Download for {key} was not picked up within {waited_ms} ms")]
    StartTimeout { key: String, waited_ms: u64 },

    #[error("Download for {key} failed: {message}")]
    DownloadFailed { key: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Document(#[from] core_doc::DocError),

    #[error(transparent)]
    Transport(#[from] core_sync::SyncError),

    #[error(transparent)]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, KaraokeError>;
