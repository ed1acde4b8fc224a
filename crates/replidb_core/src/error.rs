//! Error types for replidb core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in replidb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Document is malformed.
    #[error("invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem.
        message: String,
    },

    /// A document with this id already exists.
    #[error("duplicate id {id} in collection {collection}")]
    DuplicateId {
        /// The collection written to.
        collection: String,
        /// The conflicting id.
        id: i64,
    },

    /// Document not found.
    #[error("document {id} not found in collection {collection}")]
    DocumentNotFound {
        /// The collection searched.
        collection: String,
        /// The missing id.
        id: i64,
    },

    /// Collection name is not usable.
    #[error("invalid collection name: {name:?}")]
    InvalidCollectionName {
        /// The rejected name.
        name: String,
    },

    /// Database is already open or locked.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Invalid database format or layout.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}
