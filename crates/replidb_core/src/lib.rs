//! # replidb Core
//!
//! Embedded document store for replidb.
//!
//! This crate provides:
//! - `DocId` and `Document`, the unit of storage
//! - `Collection`, a sorted map of documents keyed by `DocId`
//! - A removal log of tombstones for local deletions
//! - Per-collection replication attributes
//! - A monotonic `SequenceClock` used for change cursors
//! - On-disk snapshots guarded by an exclusive lock file
//!
//! ## Example
//!
//! ```rust
//! use replidb_core::{Database, Document};
//!
//! let db = Database::open_in_memory();
//! let users = db.collection("users").unwrap();
//!
//! let id = users.insert(Document::new().with("name", "ada")).unwrap();
//! assert_eq!(users.get(id).unwrap().get("name").unwrap(), "ada");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attributes;
mod clock;
mod collection;
mod config;
mod database;
mod dir;
mod document;
mod error;
mod removal;

pub use attributes::CollectionAttributes;
pub use clock::{wall_millis, SequenceClock};
pub use collection::Collection;
pub use config::Config;
pub use database::Database;
pub use document::{
    DocId, Document, DOC_ID, DOC_MODIFIED, DOC_REVISION, DOC_SOURCE, REPLICATOR,
};
pub use error::{CoreError, CoreResult};
pub use removal::{RemovalLog, Tombstone};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
