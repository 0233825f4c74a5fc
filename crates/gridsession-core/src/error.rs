//! Error types for session repository operations.

/// Error type for session repository operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The repository or a store was wired with missing or unusable collaborators.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A session id was empty or blank.
    #[error("Session id must be specified")]
    InvalidSessionId,

    /// A full session record could not be decoded.
    #[error("Failed to decode session data: {0}")]
    Decode(String),

    /// A delta referenced a value type this build does not know.
    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    /// Error raised by the backing store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure raised by a backing store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store handle is no longer connected to its server.
    #[error("Store is disconnected from {0}")]
    Disconnected(String),

    /// The backend rejected or failed the operation.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded.
    #[error("Stored record is corrupt: {0}")]
    Codec(String),
}

/// Result type for session repository operations.
pub type Result<T> = std::result::Result<T, Error>;
