//! Error types for the sync server.

use replidb_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request body or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or wrong credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Unknown route.
    #[error("not found: {0}")]
    NotFound(String),

    /// The collection is locked by another replica.
    #[error("collection {collection} is locked by {holder}")]
    LockHeld {
        /// Collection name.
        collection: String,
        /// Current lock holder.
        holder: String,
    },

    /// Body encoding not supported.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The server is not accepting sync traffic.
    #[error("server offline")]
    Offline,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::AuthenticationFailed(_) => 401,
            ServerError::NotFound(_) => 404,
            ServerError::LockHeld { .. } => 409,
            ServerError::UnsupportedMediaType(_) => 415,
            ServerError::Offline => 503,
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidPath(path) => ServerError::NotFound(path),
            ProtocolError::UnsupportedContentType(ct) => ServerError::UnsupportedMediaType(ct),
            ProtocolError::CborEncode(msg) => ServerError::Internal(msg),
            other => ServerError::InvalidRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(ServerError::Offline.is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        let held = ServerError::LockHeld {
            collection: "users".into(),
            holder: "replica-b".into(),
        };
        assert_eq!(held.status_code(), 409);
        assert!(held.to_string().contains("replica-b"));
        assert_eq!(ServerError::AuthenticationFailed("x".into()).status_code(), 401);
    }

    #[test]
    fn protocol_errors_map_to_statuses() {
        let err: ServerError = ProtocolError::InvalidPath("/nope".into()).into();
        assert_eq!(err.status_code(), 404);
        let err: ServerError = ProtocolError::UnsupportedContentType("text/xml".into()).into();
        assert_eq!(err.status_code(), 415);
        let err: ServerError = ProtocolError::CborDecode("eof".into()).into();
        assert_eq!(err.status_code(), 400);
    }
}
