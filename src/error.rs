// Player error types
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// The collaborator returned no bytes for the requested path
    #[error("Failed to read audio file: {0}")]
    Unreadable(String),

    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("EQ band index {0} out of range")]
    InvalidBand(usize),

    #[error("Audio output error: {0}")]
    Output(String),
}

pub type PlayerResult<T> = Result<T, PlayerError>;
