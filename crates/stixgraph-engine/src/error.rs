//! Load and embedding errors

use std::path::PathBuf;
use stixgraph_core::CoreError;
use stixgraph_store::StoreError;

/// Errors that abort a bundle load
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("malformed bundle {path}: {reason}")]
    MalformedBundle { path: PathBuf, reason: String },

    #[error("invalid type string {value:?} on {id}")]
    InvalidTypeString { id: String, value: String },

    #[error("edge {edge} references missing node {missing}")]
    DanglingReference { edge: String, missing: String },

    #[error("invalid object {id}: {reason}")]
    InvalidObject { id: String, reason: String },

    /// Store failure; the load may be retried from the start
    #[error("graph store failure: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl From<CoreError> for LoadError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedBundle { path, reason } => LoadError::MalformedBundle { path, reason },
            CoreError::InvalidTypeString(value) => LoadError::InvalidTypeString {
                id: "<unknown>".to_string(),
                value,
            },
            CoreError::InvalidObject { id, reason } => LoadError::InvalidObject { id, reason },
        }
    }
}

/// Errors from an embedding service
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("embedding service returned an empty vector")]
    EmptyVector,

    #[error("graph store failure: {0}")]
    Store(#[from] StoreError),
}
