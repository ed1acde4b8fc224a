//! # replidb Sync Engine
//!
//! Replicates replidb collections with a remote peer.
//!
//! This crate provides:
//! - The [`Replicator`]: pull, push, merge and full resets
//! - Contracts for both sides: [`LocalCollection`] and [`RemoteEndpoint`]
//! - [`LocalReplica`], the local side over a `replidb_core` collection
//! - [`HttpRemote`], the remote side over the gate HTTP protocol
//! - Lifecycle events through an [`EventBus`]
//! - Periodic sync with backoff through [`SyncScheduler`]
//!
//! ## Model
//!
//! Each local collection keeps one cursor, `last_synced`, in its
//! attributes. An operation takes the remote lock, moves the changes made
//! after the cursor, and only then advances the cursor. Remote changes are
//! stamped locally as replicated so they are never sent back, and feeds
//! tagged with the local replica id are ignored when they come back.
//!
//! ```no_run
//! use replidb_core::Database;
//! use replidb_sync_engine::{HttpRemote, LocalReplica, ReqwestClient, Replicator, SyncConfig, SyncTarget};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(Path::new("./data"))?;
//! let local = Arc::new(LocalReplica::open(&db, "users")?);
//! let client = ReqwestClient::builder().basic_auth("alice", "secret").build()?;
//! let remote = Arc::new(HttpRemote::new("https://gate.example.com", "users", client));
//!
//! let target = SyncTarget::new(local, remote)?;
//! let replicator = Replicator::new(SyncConfig::default());
//! let outcome = replicator.merge(&target);
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Known limitation
//!
//! Pull and push share the cursor. A `pull` moves it past local writes that
//! were never pushed, and a `push` moves it past remote writes that were
//! never pulled. Use `merge` when both sides write.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used)]

mod config;
mod error;
mod event;
mod http;
mod local;
mod remote;
mod replicator;
mod reqwest_client;
mod scheduler;

pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use event::{EventBus, EventType, ListenerId, SyncEvent, SyncEventListener};
pub use http::{HttpClient, HttpRemote, HttpRequest, HttpResponse, LoopbackClient, LoopbackServer};
pub use local::{LocalCollection, LocalReplica};
pub use remote::RemoteEndpoint;
pub use replicator::{
    Replicator, SyncOperation, SyncOutcome, SyncReport, SyncStats, SyncTarget, SyncType,
};
pub use reqwest_client::{ReqwestClient, ReqwestClientBuilder, UserAgent};
pub use scheduler::SyncScheduler;
