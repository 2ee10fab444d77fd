//! Error types shared by the core crate

use std::path::PathBuf;

/// Errors raised while reading and classifying STIX content
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The bundle file is missing, not JSON, or has no `objects` array
    #[error("malformed bundle {path}: {reason}")]
    MalformedBundle { path: PathBuf, reason: String },

    /// A type or relationship name cannot be turned into a graph label
    #[error("invalid type string: {0:?}")]
    InvalidTypeString(String),

    /// A single object failed local validation
    #[error("invalid object {id}: {reason}")]
    InvalidObject { id: String, reason: String },
}

impl CoreError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        CoreError::MalformedBundle {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_object(id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidObject {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, CoreError>;
