//! Database facade.

use crate::clock::SequenceClock;
use crate::collection::{Collection, CollectionSnapshot};
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Current snapshot format version.
const SNAPSHOT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct DatabaseSnapshot {
    version: u16,
    collections: Vec<CollectionSnapshot>,
}

/// The main database handle.
///
/// A database is a set of named collections sharing one [`SequenceClock`].
/// Persistent databases live in a directory holding an exclusive lock and
/// a JSON snapshot written by [`Database::flush`].
///
/// ```rust
/// use replidb_core::{Database, Document};
///
/// let db = Database::open_in_memory();
/// let notes = db.collection("notes").unwrap();
/// notes.insert(Document::new().with("title", "hello")).unwrap();
/// assert_eq!(db.collection_names(), ["notes"]);
/// ```
pub struct Database {
    config: Config,
    dir: Option<DatabaseDir>,
    clock: Arc<SequenceClock>,
    collections: RwLock<BTreeMap<String, Arc<Collection>>>,
}

impl Database {
    /// Opens an in-memory database.
    pub fn open_in_memory() -> Self {
        Self {
            config: Config::default(),
            dir: None,
            clock: Arc::new(SequenceClock::new()),
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    /// Opens a database from a directory path.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database from a directory path with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process has the database locked (`DatabaseLocked`)
    /// - The snapshot is unreadable or of an unknown version
    /// - I/O errors occur
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;

        if config.error_if_exists && !dir.is_new_database() {
            return Err(CoreError::invalid_format(
                "database already exists and error_if_exists is true",
            ));
        }

        let clock = Arc::new(SequenceClock::new());
        let mut collections = BTreeMap::new();

        if let Some(bytes) = dir.load_snapshot()? {
            let snapshot: DatabaseSnapshot = serde_json::from_slice(&bytes)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(CoreError::invalid_format(format!(
                    "unsupported snapshot version {}, expected {}",
                    snapshot.version, SNAPSHOT_VERSION
                )));
            }
            for collection in snapshot.collections {
                let collection = Collection::restore(collection, Arc::clone(&clock))?;
                collections.insert(collection.name().to_string(), Arc::new(collection));
            }
            tracing::debug!(
                path = %path.display(),
                collections = collections.len(),
                "loaded database snapshot"
            );
        }

        Ok(Self {
            config,
            dir: Some(dir),
            clock,
            collections: RwLock::new(collections),
        })
    }

    /// Returns the named collection, creating it if needed.
    pub fn collection(&self, name: &str) -> CoreResult<Arc<Collection>> {
        if name.trim().is_empty() {
            return Err(CoreError::InvalidCollectionName { name: name.into() });
        }

        if let Some(existing) = self.collections.read().get(name) {
            return Ok(Arc::clone(existing));
        }

        let mut collections = self.collections.write();
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Collection::new(name, Arc::clone(&self.clock))));
        Ok(Arc::clone(collection))
    }

    /// Returns the named collection if it exists.
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Returns true if the collection exists.
    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Names of all collections, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Drops a collection with its documents, tombstones and attributes.
    pub fn drop_collection(&self, name: &str) -> bool {
        self.collections.write().remove(name).is_some()
    }

    /// The clock shared by every collection of this database.
    pub fn clock(&self) -> &Arc<SequenceClock> {
        &self.clock
    }

    /// Directory of a persistent database.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns true for databases without a directory.
    pub fn is_in_memory(&self) -> bool {
        self.dir.is_none()
    }

    /// Writes a snapshot of every collection. A no-op in memory.
    pub fn flush(&self) -> CoreResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let snapshot = DatabaseSnapshot {
            version: SNAPSHOT_VERSION,
            collections: self
                .collections
                .read()
                .values()
                .map(|c| c.snapshot())
                .collect(),
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        dir.save_snapshot(&bytes)?;
        tracing::debug!(path = %dir.path().display(), bytes = bytes.len(), "flushed database");
        Ok(())
    }

    /// Flushes and closes the database.
    pub fn close(mut self) -> CoreResult<()> {
        let result = self.flush();
        // Already flushed; skip the flush in Drop.
        self.config.flush_on_close = false;
        result
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.config.flush_on_close && self.dir.is_some() {
            if let Err(e) = self.flush() {
                tracing::warn!(error = %e, "failed to flush database on drop");
            }
        }
    }
}
