//! Error types for the sync engine.

use replidb_core::CoreError;
use replidb_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Malformed request or response body.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Remote rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Remote answered with a non-success status.
    #[error("server error {status}: {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Message from the error body.
        message: String,
    },

    /// A feed could not be applied to a collection.
    #[error("failed to apply changes to {collection}: {message}")]
    Apply {
        /// Collection name.
        collection: String,
        /// Reason.
        message: String,
    },

    /// Local database error.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error outside the database, such as spawning a worker thread.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an apply error.
    pub fn apply(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Apply {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(message.into()),
            _ => Self::ServerError {
                status,
                message: message.into(),
            },
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServerError { status, .. } => *status >= 500 || *status == 409,
            _ => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::from_status(503, "down").is_retryable());
        assert!(SyncError::from_status(409, "locked").is_retryable());
        assert!(!SyncError::from_status(400, "bad").is_retryable());
        assert!(!SyncError::apply("users", "bad doc").is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            SyncError::from_status(401, "nope"),
            SyncError::AuthenticationFailed(_)
        ));
        let err = SyncError::from_status(500, "boom");
        assert_eq!(err.to_string(), "server error 500: boom");
    }

    #[test]
    fn wraps_lower_layers() {
        let err: SyncError = CoreError::DatabaseLocked.into();
        assert!(matches!(err, SyncError::Database(_)));
        let err: SyncError = ProtocolError::InvalidPath("/x".into()).into();
        assert!(matches!(err, SyncError::Protocol(_)));
    }
}
