use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocError {
    #[error("Malformed update payload: {0}")]
    MalformedUpdate(String),

    #[error("Malformed state vector: {0}")]
    MalformedStateVector(String),

    #[error("Failed to apply replicated update: {0}")]
    ApplyUpdate(String),
}

pub type Result<T> = std::result::Result<T, DocError>;
