/// Error types for the chat synchronization engine
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Push channel down or unreachable. Recoverable via reconnect.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Pull API request failed. Recoverable via retry, never proof of an
    /// empty conversation.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Corrupt or unreadable local data. Recoverable by treating as empty.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Rejected before any network call, surfaced synchronously.
    #[error("Validation error: {0}")]
    Validation(String),

    /// `send` invoked while the live channel is not connected.
    #[error("Live channel is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, ChatError>;
