//! # replidb Sync Protocol
//!
//! Sync protocol types and wire codecs for replidb.
//!
//! This crate provides:
//! - `ChangeFeed`, the batch of upserts and removals exchanged by replicas
//! - Request/response messages for the remote lock, paging and acks
//! - Route names shared by the HTTP client and the reference server
//! - JSON and CBOR encodings selected by content type
//! - Conflict detection and the merge `ConflictPolicy`
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod codec;
mod conflict;
mod error;
mod messages;

pub use change_feed::ChangeFeed;
pub use codec::WireFormat;
pub use conflict::{content_hash, Conflict, ConflictPolicy, ConflictResolution};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    ChangeAck, ChangedSinceRequest, ClearRequest, Endpoint, ErrorResponse, LockRequest, LockResponse,
    OnlineResponse, PageRequest, PageResponse, ReleaseRequest,
};
