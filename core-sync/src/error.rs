use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to bind relay listener: {0}")]
    Bind(String),

    #[error("WebSocket transport error: {0}")]
    Transport(String),

    #[error("Malformed sync frame: {0}")]
    Frame(String),

    #[error(transparent)]
    Document(#[from] core_doc::DocError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
