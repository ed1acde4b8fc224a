//! Contract of the local collection and its adapter over `replidb_core`.

use crate::error::{SyncError, SyncResult};
use replidb_core::{Collection, CollectionAttributes, Database, Document, SequenceClock};
use replidb_sync_protocol::ChangeFeed;
use std::sync::Arc;

/// A local collection the replicator synchronizes.
pub trait LocalCollection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Local writes and removals with a sequence in `(from, to]`.
    ///
    /// Documents written by the replicator are left out.
    fn changed_since(&self, from: i64, to: i64) -> SyncResult<ChangeFeed>;

    /// Merges a feed into the collection. Returns the number of changes.
    ///
    /// A feed produced by `originator`, and documents tagged with it, are
    /// skipped. Applying the same feed twice leaves the same state as
    /// applying it once.
    fn apply_change(&self, feed: &ChangeFeed, originator: &str) -> SyncResult<usize>;

    /// Reads one page of documents in id order.
    fn find_page(&self, offset: usize, size: usize) -> SyncResult<Vec<Document>>;

    /// Bulk-inserts documents fetched from the remote.
    fn insert_replicated(&self, documents: Vec<Document>) -> SyncResult<usize>;

    /// Removes every document.
    fn clear(&self) -> SyncResult<()>;

    /// Drops removal log entries up to `upto`.
    fn prune_removals(&self, upto: i64) -> SyncResult<usize>;

    /// Next local sequence value.
    fn now(&self) -> i64;

    /// Makes sure later local writes get a sequence greater than `sequence`.
    fn observe_sequence(&self, sequence: i64);

    /// Stored replication attributes.
    fn attributes(&self) -> SyncResult<Option<CollectionAttributes>>;

    /// Stores replication attributes.
    fn set_attributes(&self, attributes: CollectionAttributes) -> SyncResult<()>;

    /// Stored attributes, creating and storing fresh ones if absent.
    fn attributes_or_default(&self) -> SyncResult<CollectionAttributes> {
        match self.attributes()? {
            Some(attributes) => Ok(attributes),
            None => {
                let attributes = CollectionAttributes::new(self.name());
                self.set_attributes(attributes.clone())?;
                Ok(attributes)
            }
        }
    }
}

/// [`LocalCollection`] over a `replidb_core` collection.
#[derive(Debug, Clone)]
pub struct LocalReplica {
    collection: Arc<Collection>,
    clock: Arc<SequenceClock>,
}

impl LocalReplica {
    /// Opens (or creates) a collection of `db` for replication.
    pub fn open(db: &Database, name: &str) -> SyncResult<Self> {
        Ok(Self {
            collection: db.collection(name)?,
            clock: Arc::clone(db.clock()),
        })
    }

    /// Wraps a collection and the clock of its database.
    pub fn new(collection: Arc<Collection>, clock: Arc<SequenceClock>) -> Self {
        Self { collection, clock }
    }

    /// The wrapped collection.
    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }
}

impl LocalCollection for LocalReplica {
    fn name(&self) -> &str {
        self.collection.name()
    }

    fn changed_since(&self, from: i64, to: i64) -> SyncResult<ChangeFeed> {
        Ok(ChangeFeed::from_parts(
            self.collection.modified_between(from, to),
            self.collection.removed_between(from, to),
        ))
    }

    fn apply_change(&self, feed: &ChangeFeed, originator: &str) -> SyncResult<usize> {
        if feed.is_from(originator) {
            tracing::debug!(collection = self.name(), "skipping own change feed");
            return Ok(0);
        }

        let mut changes = 0;
        for doc in &feed.modified {
            if doc.source() == Some(originator) {
                continue;
            }
            let written = self
                .collection
                .put_replicated(doc.clone())
                .map_err(|e| SyncError::apply(self.name(), e.to_string()))?;
            if written {
                changes += 1;
            }
        }
        for &id in &feed.removed {
            if self.collection.remove_replicated(id) {
                changes += 1;
            }
        }
        Ok(changes)
    }

    fn find_page(&self, offset: usize, size: usize) -> SyncResult<Vec<Document>> {
        Ok(self.collection.page(offset, size))
    }

    fn insert_replicated(&self, documents: Vec<Document>) -> SyncResult<usize> {
        self.collection
            .insert_replicated(documents)
            .map_err(|e| SyncError::apply(self.name(), e.to_string()))
    }

    fn clear(&self) -> SyncResult<()> {
        self.collection.clear();
        Ok(())
    }

    fn prune_removals(&self, upto: i64) -> SyncResult<usize> {
        Ok(self.collection.prune_removals(upto))
    }

    fn now(&self) -> i64 {
        self.clock.next()
    }

    fn observe_sequence(&self, sequence: i64) {
        self.clock.observe(sequence);
    }

    fn attributes(&self) -> SyncResult<Option<CollectionAttributes>> {
        Ok(self.collection.attributes())
    }

    fn set_attributes(&self, attributes: CollectionAttributes) -> SyncResult<()> {
        self.collection.set_attributes(attributes);
        Ok(())
    }
}
