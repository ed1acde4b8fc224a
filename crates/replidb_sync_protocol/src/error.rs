//! Error types for the sync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or routing protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CBOR encoding failed.
    #[error("cbor encode error: {0}")]
    CborEncode(String),

    /// CBOR decoding failed.
    #[error("cbor decode error: {0}")]
    CborDecode(String),

    /// Content type is not JSON or CBOR.
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Request path does not name a known endpoint.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}
