//! # replidb Sync Server
//!
//! Reference sync remote ("gate") for replidb.
//!
//! This crate provides:
//! - A per-collection `RemoteStore` with its own sequence index and tombstones
//! - An owner-scoped, expiring `LockManager`
//! - A transport-agnostic router for the `/gate/{collection}/...` routes
//! - Basic authentication
//!
//! # Architecture
//!
//! The server keeps every collection in memory and stamps each write with
//! a value from its own `SequenceClock`. `changed-since` reserves the
//! returned `sequenceNumber`, so a replica that records it as its cursor
//! never misses a later write.
//!
//! No socket listener is included. An embedder forwards each `POST` to
//! [`SyncServer::handle_post`] and writes back the returned [`Reply`]:
//!
//! ```
//! use replidb_sync_protocol::{Endpoint, OnlineResponse, WireFormat};
//! use replidb_sync_server::{ServerConfig, SyncServer};
//!
//! let server = SyncServer::new(ServerConfig::default());
//! let reply = server.handle_post(&Endpoint::Online.path("users"), &[], b"");
//! assert_eq!(reply.status, 200);
//!
//! let body: OnlineResponse = WireFormat::Json.decode(&reply.body).unwrap();
//! assert!(body.online);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod lock;
mod server;
mod store;

pub use auth::{basic_authorization, parse_basic_authorization, Authenticator};
pub use config::{Credentials, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use lock::LockManager;
pub use server::{Reply, SyncServer};
pub use store::RemoteStore;
