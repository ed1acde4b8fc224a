//! Test fixtures and database helpers.
//!
//! Provides temporary databases and builders for the documents and change
//! feeds most replication tests start from.

use replidb_core::{Database, DocId, Document};
use replidb_sync_protocol::ChangeFeed;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory(),
            temp_dir: None,
        }
    }

    /// Creates a new database in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("db")).expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("db"))
    }

    /// Flushes, closes and reopens a file database.
    ///
    /// # Panics
    ///
    /// Panics on an in-memory database.
    pub fn reopen(self) -> Self {
        let temp_dir = self.temp_dir.expect("Only file databases can be reopened");
        self.db.close().expect("Failed to close database");
        let db = Database::open(&temp_dir.path().join("db")).expect("Failed to reopen database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a database in a temporary directory.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// A document with an explicit id and a `name` field.
pub fn doc_named(id: i64, name: &str) -> Document {
    let mut doc = Document::new().with("name", name);
    doc.set_id(DocId::from_value(id));
    doc
}

/// A document as another replica would have written it.
pub fn peer_doc(id: i64, name: &str, source: &str, modified: i64) -> Document {
    let mut doc = doc_named(id, name).with("_modified", modified);
    doc.set_source(source);
    doc
}

/// Documents with ids `1..=count`, named `doc-{id}`.
pub fn numbered_docs(count: usize) -> Vec<Document> {
    (1..=count as i64)
        .map(|id| doc_named(id, &format!("doc-{id}")))
        .collect()
}

/// Set of ids from raw values.
pub fn ids(values: &[i64]) -> BTreeSet<DocId> {
    values.iter().copied().map(DocId::from_value).collect()
}

/// A change feed tagged with an originator and sequence number.
pub fn feed_from(originator: &str, sequence: i64, modified: Vec<Document>, removed: &[i64]) -> ChangeFeed {
    ChangeFeed::from_parts(modified, ids(removed))
        .with_originator(originator)
        .with_sequence(sequence)
}

/// Values of the `name` field across documents, in order.
pub fn names(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .filter_map(|d| d.get("name").and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database whose `collection` holds `count` local documents.
    pub fn populated_database(collection: &str, count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        let target = test_db.collection(collection).expect("Failed to open collection");
        for doc in numbered_docs(count) {
            target.upsert(doc).expect("Failed to insert document");
        }
        test_db
    }
}
