//! # replidb Testkit
//!
//! Test utilities for replidb.
//!
//! This crate provides:
//! - Database fixtures (in-memory and on-disk with cleanup)
//! - Document and change feed builders
//! - An in-process gate with typed request helpers
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use replidb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         let users = db.collection("users").unwrap();
//!         users.insert(doc_named(1, "alice")).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod gate;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::gate::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use gate::*;
pub use generators::*;
