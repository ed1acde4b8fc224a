//! In-memory remote collection with its own change index.

use crate::error::{ServerError, ServerResult};
use parking_lot::RwLock;
use replidb_core::{DocId, Document, SequenceClock};
use replidb_sync_protocol::ChangeFeed;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Entry {
    sequence: i64,
    document: Document,
}

#[derive(Debug, Default)]
struct StoreState {
    documents: BTreeMap<DocId, Entry>,
    tombstones: BTreeMap<DocId, i64>,
}

/// One collection held by the gate.
///
/// Every accepted write is stamped with a server sequence value. That
/// value, not the document's `_modified`, drives `changed_since`, so the
/// window is independent of the writers' clocks.
#[derive(Debug)]
pub struct RemoteStore {
    name: String,
    server_id: String,
    clock: Arc<SequenceClock>,
    state: RwLock<StoreState>,
}

impl RemoteStore {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>, server_id: impl Into<String>, clock: Arc<SequenceClock>) -> Self {
        Self {
            name: name.into(),
            server_id: server_id.into(),
            clock,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns every write and removal with a sequence greater than `from`.
    ///
    /// The feed's `sequence_number` is freshly drawn from the clock, so any
    /// write accepted after this call gets a greater sequence.
    pub fn changed_since(&self, from: i64) -> ChangeFeed {
        let state = self.state.read();
        let sequence = self.clock.next();

        let mut entries: Vec<&Entry> = state
            .documents
            .values()
            .filter(|entry| entry.sequence > from)
            .collect();
        entries.sort_by_key(|entry| entry.sequence);

        let removed = state
            .tombstones
            .iter()
            .filter(|(_, seq)| **seq > from)
            .map(|(&id, _)| id)
            .collect();

        ChangeFeed::from_parts(
            entries.into_iter().map(|e| e.document.clone()).collect(),
            removed,
        )
        .with_originator(self.server_id.clone())
        .with_sequence(sequence)
    }

    /// Applies a feed. Returns whether anything changed.
    ///
    /// Upserts are tagged with the feed's originator in `_source`; the
    /// writer's `_modified` is kept. Documents equal to the stored version
    /// and removals of absent ids are skipped, so applying a feed twice
    /// changes nothing the second time.
    pub fn apply_change(&self, feed: &ChangeFeed) -> ServerResult<bool> {
        let mut upserts = Vec::with_capacity(feed.modified.len());
        for doc in &feed.modified {
            doc.validate()
                .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
            let id = doc.id().ok_or_else(|| {
                ServerError::InvalidRequest("document without _id in change feed".into())
            })?;
            let mut doc = doc.clone();
            if let Some(originator) = &feed.originator {
                doc.set_source(originator.clone());
            }
            upserts.push((id, doc));
        }

        let mut state = self.state.write();
        let mut mutated = false;

        for (id, doc) in upserts {
            if state.documents.get(&id).is_some_and(|e| e.document == doc) {
                continue;
            }
            let sequence = self.clock.next();
            state.tombstones.remove(&id);
            state.documents.insert(
                id,
                Entry {
                    sequence,
                    document: doc,
                },
            );
            mutated = true;
        }

        for &id in &feed.removed {
            if state.documents.remove(&id).is_some() {
                let sequence = self.clock.next();
                state.tombstones.insert(id, sequence);
                mutated = true;
            }
        }

        tracing::debug!(
            collection = %self.name,
            upserts = feed.modified.len(),
            removals = feed.removed.len(),
            mutated,
            "applied change feed"
        );
        Ok(mutated)
    }

    /// Returns up to `size` documents in id order, skipping `offset`.
    pub fn page(&self, offset: usize, size: usize) -> Vec<Document> {
        self.state
            .read()
            .documents
            .values()
            .skip(offset)
            .take(size)
            .map(|entry| entry.document.clone())
            .collect()
    }

    /// Removes every document, leaving a tombstone for each.
    ///
    /// Returns whether anything was removed.
    pub fn clear(&self) -> bool {
        let mut state = self.state.write();
        let ids: Vec<DocId> = state.documents.keys().copied().collect();
        for id in &ids {
            let sequence = self.clock.next();
            state.tombstones.insert(*id, sequence);
        }
        state.documents.clear();
        !ids.is_empty()
    }

    /// Drops tombstones with a sequence lower than `before`.
    pub fn prune_tombstones(&self, before: i64) -> usize {
        let mut state = self.state.write();
        let len = state.tombstones.len();
        state.tombstones.retain(|_, seq| *seq >= before);
        len - state.tombstones.len()
    }

    /// Gets a document.
    pub fn get(&self, id: DocId) -> Option<Document> {
        self.state
            .read()
            .documents
            .get(&id)
            .map(|entry| entry.document.clone())
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Returns true if the store has no documents.
    pub fn is_empty(&self) -> bool {
        self.state.read().documents.is_empty()
    }

    /// Number of retained tombstones.
    pub fn tombstone_count(&self) -> usize {
        self.state.read().tombstones.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RemoteStore {
        RemoteStore::new("users", "gate", Arc::new(SequenceClock::new()))
    }

    fn doc(id: i64, name: &str) -> Document {
        let mut d = Document::new().with("name", name);
        d.set_id(DocId::from_value(id));
        d
    }

    fn feed(docs: Vec<Document>, removed: &[i64]) -> ChangeFeed {
        ChangeFeed::from_parts(docs, removed.iter().map(|&i| DocId::from_value(i)).collect())
            .with_originator("replica-a")
    }

    #[test]
    fn apply_stamps_originator() {
        let store = store();
        assert!(store.apply_change(&feed(vec![doc(1, "ada")], &[])).unwrap());
        let stored = store.get(DocId::from_value(1)).unwrap();
        assert_eq!(stored.source(), Some("replica-a"));
        assert_eq!(stored.get("name").unwrap(), "ada");
    }

    #[test]
    fn apply_is_idempotent() {
        let store = store();
        let f = feed(vec![doc(1, "ada"), doc(2, "bob")], &[]);
        assert!(store.apply_change(&f).unwrap());
        let before = store.changed_since(0);
        assert!(!store.apply_change(&f).unwrap());
        let after = store.changed_since(0);
        assert_eq!(before.modified, after.modified);
    }

    #[test]
    fn removals_leave_tombstones() {
        let store = store();
        store.apply_change(&feed(vec![doc(1, "ada")], &[])).unwrap();
        let cursor = store.changed_since(0).sequence_number;

        assert!(store.apply_change(&feed(vec![], &[1])).unwrap());
        assert!(!store.apply_change(&feed(vec![], &[1, 99])).unwrap());

        let changes = store.changed_since(cursor);
        assert!(changes.modified.is_empty());
        assert_eq!(
            changes.removed.into_iter().collect::<Vec<_>>(),
            [DocId::from_value(1)]
        );
    }

    #[test]
    fn cursor_excludes_seen_writes() {
        let store = store();
        store.apply_change(&feed(vec![doc(1, "ada")], &[])).unwrap();
        let first = store.changed_since(0);
        assert_eq!(first.modified.len(), 1);
        assert!(first.is_from("gate"));

        store.apply_change(&feed(vec![doc(2, "bob")], &[])).unwrap();
        let second = store.changed_since(first.sequence_number);
        assert_eq!(second.modified_ids().into_iter().collect::<Vec<_>>(), [DocId::from_value(2)]);
        assert!(second.sequence_number > first.sequence_number);
    }

    #[test]
    fn rewrite_resurrects_removed() {
        let store = store();
        store.apply_change(&feed(vec![doc(1, "ada")], &[])).unwrap();
        store.apply_change(&feed(vec![], &[1])).unwrap();
        store.apply_change(&feed(vec![doc(1, "ada")], &[])).unwrap();
        let changes = store.changed_since(0);
        assert_eq!(changes.modified.len(), 1);
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn rejects_documents_without_id() {
        let store = store();
        let bad = feed(vec![Document::new().with("name", "x")], &[]);
        assert!(matches!(
            store.apply_change(&bad),
            Err(ServerError::InvalidRequest(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn paging_in_id_order() {
        let store = store();
        store
            .apply_change(&feed(vec![doc(3, "c"), doc(1, "a"), doc(2, "b")], &[]))
            .unwrap();
        let ids: Vec<_> = store
            .page(1, 10)
            .iter()
            .filter_map(Document::id)
            .map(|id| id.value())
            .collect();
        assert_eq!(ids, [2, 3]);
        assert!(store.page(5, 10).is_empty());
    }

    #[test]
    fn clear_records_tombstones() {
        let store = store();
        store
            .apply_change(&feed(vec![doc(1, "a"), doc(2, "b")], &[]))
            .unwrap();
        let cursor = store.changed_since(0).sequence_number;
        assert!(store.clear());
        assert!(store.is_empty());
        assert_eq!(store.changed_since(cursor).removed.len(), 2);
        assert!(!store.clear());
    }

    #[test]
    fn prune_drops_old_tombstones() {
        let store = store();
        store.apply_change(&feed(vec![doc(1, "a")], &[])).unwrap();
        store.apply_change(&feed(vec![], &[1])).unwrap();
        assert_eq!(store.tombstone_count(), 1);
        let now = store.changed_since(0).sequence_number;
        assert_eq!(store.prune_tombstones(now), 1);
        assert_eq!(store.tombstone_count(), 0);
    }
}
