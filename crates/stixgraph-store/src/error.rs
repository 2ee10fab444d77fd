//! Store error taxonomy

/// Errors raised by a graph store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connection or transport failure; the whole load may be retried
    #[error("graph store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected an operation
    #[error("graph store error: {0}")]
    Backend(String),

    #[error("unsupported store uri: {0}")]
    UnsupportedUri(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
