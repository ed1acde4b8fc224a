//! Document collections.

use crate::attributes::CollectionAttributes;
use crate::clock::SequenceClock;
use crate::document::{DocId, Document, REPLICATOR};
use crate::error::{CoreError, CoreResult};
use crate::removal::RemovalLog;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A named collection of documents, keyed and ordered by [`DocId`].
///
/// Local writes (`insert`, `update`, `upsert`, `remove`) stamp the reserved
/// fields and feed the change window reported by [`Collection::modified_between`]
/// and [`Collection::removed_between`]. Writes made on behalf of the
/// replicator (`put_replicated`, `remove_replicated`, `insert_replicated`)
/// are tagged with the replicator provenance and stay out of that window, so
/// replicated data is never echoed back to its source.
pub struct Collection {
    name: String,
    clock: Arc<SequenceClock>,
    state: RwLock<CollectionState>,
}

#[derive(Default)]
struct CollectionState {
    documents: BTreeMap<DocId, Document>,
    removals: RemovalLog,
    attributes: Option<CollectionAttributes>,
}

/// Serialized form of a collection inside a database snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionSnapshot {
    pub name: String,
    pub documents: Vec<Document>,
    #[serde(default)]
    pub removals: RemovalLog,
    #[serde(default)]
    pub attributes: Option<CollectionAttributes>,
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>, clock: Arc<SequenceClock>) -> Self {
        Self {
            name: name.into(),
            clock,
            state: RwLock::new(CollectionState::default()),
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a new document and returns its id.
    ///
    /// An id is generated when the document has none. Inserting an id that
    /// already exists fails with `DuplicateId`.
    pub fn insert(&self, document: Document) -> CoreResult<DocId> {
        document.validate()?;
        let mut state = self.state.write();
        self.insert_locked(&mut state, document)
    }

    /// Inserts several documents atomically: either all go in or none do.
    pub fn insert_many(&self, documents: Vec<Document>) -> CoreResult<Vec<DocId>> {
        let mut state = self.state.write();

        let mut seen = BTreeSet::new();
        for doc in &documents {
            doc.validate()?;
            if let Some(id) = doc.id() {
                if state.documents.contains_key(&id) || !seen.insert(id) {
                    return Err(self.duplicate(id));
                }
            }
        }

        documents
            .into_iter()
            .map(|doc| self.insert_locked(&mut state, doc))
            .collect()
    }

    fn insert_locked(&self, state: &mut CollectionState, mut document: Document) -> CoreResult<DocId> {
        let id = match document.id() {
            Some(id) if state.documents.contains_key(&id) => return Err(self.duplicate(id)),
            Some(id) => id,
            None => {
                let id = DocId::new();
                document.set_id(id);
                id
            }
        };

        document.stamp_local(1, self.clock.next());
        state.removals.forget(id);
        state.documents.insert(id, document);
        Ok(id)
    }

    /// Replaces an existing document.
    pub fn update(&self, mut document: Document) -> CoreResult<()> {
        document.validate()?;
        let id = document
            .id()
            .ok_or_else(|| CoreError::invalid_document("update requires an _id"))?;

        let mut state = self.state.write();
        let revision = match state.documents.get(&id) {
            Some(existing) => existing.revision() + 1,
            None => return Err(self.not_found(id)),
        };

        document.stamp_local(revision, self.clock.next());
        state.documents.insert(id, document);
        Ok(())
    }

    /// Inserts or replaces a document.
    pub fn upsert(&self, mut document: Document) -> CoreResult<DocId> {
        document.validate()?;
        let mut state = self.state.write();

        let Some(id) = document.id() else {
            return self.insert_locked(&mut state, document);
        };

        let revision = state
            .documents
            .get(&id)
            .map(|existing| existing.revision() + 1)
            .unwrap_or(1);

        document.stamp_local(revision, self.clock.next());
        state.removals.forget(id);
        state.documents.insert(id, document);
        Ok(id)
    }

    /// Removes a document, recording a tombstone.
    pub fn remove(&self, id: DocId) -> CoreResult<Option<Document>> {
        let mut state = self.state.write();
        let removed = state.documents.remove(&id);
        if removed.is_some() {
            state.removals.record(id, self.clock.next());
        }
        Ok(removed)
    }

    /// Gets a document by id.
    pub fn get(&self, id: DocId) -> Option<Document> {
        self.state.read().documents.get(&id).cloned()
    }

    /// Returns true if the id is present.
    pub fn contains(&self, id: DocId) -> bool {
        self.state.read().documents.contains_key(&id)
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Returns true if the collection holds no documents.
    pub fn is_empty(&self) -> bool {
        self.state.read().documents.is_empty()
    }

    /// Returns at most `size` documents after skipping `offset`, in id order.
    pub fn page(&self, offset: usize, size: usize) -> Vec<Document> {
        self.state
            .read()
            .documents
            .values()
            .skip(offset)
            .take(size)
            .cloned()
            .collect()
    }

    /// Returns every document in id order.
    pub fn find_all(&self) -> Vec<Document> {
        self.state.read().documents.values().cloned().collect()
    }

    /// Documents written locally with `_modified` in `(from, to]`.
    pub fn modified_between(&self, from: i64, to: i64) -> Vec<Document> {
        self.state
            .read()
            .documents
            .values()
            .filter(|doc| !doc.is_replicated())
            .filter(|doc| doc.modified().is_some_and(|m| m > from && m <= to))
            .cloned()
            .collect()
    }

    /// Ids removed locally in `(from, to]`.
    pub fn removed_between(&self, from: i64, to: i64) -> BTreeSet<DocId> {
        self.state.read().removals.removed_between(from, to)
    }

    /// Drops tombstones with `delete_time <= upto`.
    pub fn prune_removals(&self, upto: i64) -> usize {
        self.state.write().removals.prune(upto)
    }

    /// Number of pending tombstones.
    pub fn removal_count(&self) -> usize {
        self.state.read().removals.len()
    }

    /// Writes a document received from a peer.
    ///
    /// The document keeps its fields and is tagged with the replicator
    /// provenance. Returns whether the stored state changed.
    pub fn put_replicated(&self, mut document: Document) -> CoreResult<bool> {
        document.validate()?;
        let id = document
            .id()
            .ok_or_else(|| CoreError::invalid_document("replicated document has no _id"))?;
        document.set_source(REPLICATOR);

        let mut state = self.state.write();
        if state.documents.get(&id) == Some(&document) {
            return Ok(false);
        }
        state.removals.forget(id);
        state.documents.insert(id, document);
        Ok(true)
    }

    /// Removes a document on behalf of a peer, without a tombstone.
    pub fn remove_replicated(&self, id: DocId) -> bool {
        self.state.write().documents.remove(&id).is_some()
    }

    /// Bulk-inserts documents fetched from a peer, replacing any present.
    pub fn insert_replicated(&self, documents: Vec<Document>) -> CoreResult<usize> {
        let mut tagged = Vec::with_capacity(documents.len());
        for mut doc in documents {
            doc.validate()?;
            let id = doc
                .id()
                .ok_or_else(|| CoreError::invalid_document("replicated document has no _id"))?;
            doc.set_source(REPLICATOR);
            tagged.push((id, doc));
        }

        let mut state = self.state.write();
        let count = tagged.len();
        for (id, doc) in tagged {
            state.removals.forget(id);
            state.documents.insert(id, doc);
        }
        Ok(count)
    }

    /// Removes every document and tombstone. Attributes are kept.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.documents.clear();
        state.removals.clear();
    }

    /// Returns the replication attributes, if set.
    pub fn attributes(&self) -> Option<CollectionAttributes> {
        self.state.read().attributes.clone()
    }

    /// Stores replication attributes.
    pub fn set_attributes(&self, attributes: CollectionAttributes) {
        self.state.write().attributes = Some(attributes);
    }

    pub(crate) fn snapshot(&self) -> CollectionSnapshot {
        let state = self.state.read();
        CollectionSnapshot {
            name: self.name.clone(),
            documents: state.documents.values().cloned().collect(),
            removals: state.removals.clone(),
            attributes: state.attributes.clone(),
        }
    }

    pub(crate) fn restore(snapshot: CollectionSnapshot, clock: Arc<SequenceClock>) -> CoreResult<Self> {
        let mut documents = BTreeMap::new();
        for doc in snapshot.documents {
            doc.validate()?;
            let id = doc.id().ok_or_else(|| {
                CoreError::invalid_format(format!(
                    "document without _id in collection {}",
                    snapshot.name
                ))
            })?;
            if let Some(modified) = doc.modified() {
                clock.observe(modified);
            }
            documents.insert(id, doc);
        }
        if let Some(latest) = snapshot.removals.latest() {
            clock.observe(latest);
        }
        Ok(Self {
            name: snapshot.name,
            clock,
            state: RwLock::new(CollectionState {
                documents,
                removals: snapshot.removals,
                attributes: snapshot.attributes,
            }),
        })
    }

    fn duplicate(&self, id: DocId) -> CoreError {
        CoreError::DuplicateId {
            collection: self.name.clone(),
            id: id.value(),
        }
    }

    fn not_found(&self, id: DocId) -> CoreError {
        CoreError::DocumentNotFound {
            collection: self.name.clone(),
            id: id.value(),
        }
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DOC_SOURCE;

    fn collection() -> Collection {
        Collection::new("users", Arc::new(SequenceClock::new()))
    }

    #[test]
    fn insert_assigns_id_and_stamps() {
        let users = collection();
        let id = users.insert(Document::new().with("name", "ada")).unwrap();

        let doc = users.get(id).unwrap();
        assert_eq!(doc.id(), Some(id));
        assert_eq!(doc.revision(), 1);
        assert!(doc.modified().is_some());
        assert!(doc.source().is_none());
    }

    #[test]
    fn duplicate_insert_fails() {
        let users = collection();
        let id = users.insert(Document::new()).unwrap();

        let mut again = Document::new();
        again.set_id(id);
        assert!(matches!(
            users.insert(again),
            Err(CoreError::DuplicateId { .. })
        ));
    }

    #[test]
    fn insert_many_is_all_or_nothing() {
        let users = collection();
        let mut a = Document::new();
        a.set_id(DocId::from_value(1));
        let mut b = Document::new();
        b.set_id(DocId::from_value(1));

        assert!(users.insert_many(vec![a.clone(), b]).is_err());
        assert!(users.is_empty());

        let ids = users.insert_many(vec![a, Document::new()]).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn update_bumps_revision() {
        let users = collection();
        let id = users.insert(Document::new().with("n", 1)).unwrap();

        let mut doc = users.get(id).unwrap();
        let first_modified = doc.modified().unwrap();
        doc.put("n", 2);
        users.update(doc).unwrap();

        let doc = users.get(id).unwrap();
        assert_eq!(doc.revision(), 2);
        assert!(doc.modified().unwrap() > first_modified);
    }

    #[test]
    fn update_missing_fails() {
        let users = collection();
        let mut doc = Document::new();
        doc.set_id(DocId::from_value(77));
        assert!(matches!(
            users.update(doc),
            Err(CoreError::DocumentNotFound { id: 77, .. })
        ));
    }

    #[test]
    fn remove_records_tombstone() {
        let users = collection();
        let id = users.insert(Document::new()).unwrap();
        let before = users.clock.last();

        assert!(users.remove(id).unwrap().is_some());
        assert!(users.remove(id).unwrap().is_none());
        assert_eq!(users.removal_count(), 1);
        assert!(users.removed_between(before, i64::MAX).contains(&id));
    }

    #[test]
    fn modified_window_excludes_replicated() {
        let users = collection();
        let local = users.insert(Document::new().with("k", "local")).unwrap();

        let mut remote = Document::new().with("k", "remote");
        remote.set_id(DocId::from_value(5));
        users.put_replicated(remote).unwrap();

        let changed = users.modified_between(0, i64::MAX);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id(), Some(local));
    }

    #[test]
    fn modified_window_bounds() {
        let users = collection();
        let id = users.insert(Document::new()).unwrap();
        let stamp = users.get(id).unwrap().modified().unwrap();

        assert_eq!(users.modified_between(stamp - 1, stamp).len(), 1);
        assert!(users.modified_between(stamp, i64::MAX).is_empty());
        assert!(users.modified_between(0, stamp - 1).is_empty());
    }

    #[test]
    fn put_replicated_is_idempotent() {
        let users = collection();
        let mut doc = Document::new().with("v", 1);
        doc.set_id(DocId::from_value(3));

        assert!(users.put_replicated(doc.clone()).unwrap());
        assert!(!users.put_replicated(doc).unwrap());

        let stored = users.get(DocId::from_value(3)).unwrap();
        assert_eq!(stored.get(DOC_SOURCE).unwrap(), REPLICATOR);
    }

    #[test]
    fn local_update_clears_replicator_marker() {
        let users = collection();
        let mut doc = Document::new().with("v", 1);
        doc.set_id(DocId::from_value(3));
        users.put_replicated(doc).unwrap();

        let mut doc = users.get(DocId::from_value(3)).unwrap();
        doc.put("v", 2);
        users.update(doc).unwrap();

        assert!(!users.get(DocId::from_value(3)).unwrap().is_replicated());
        assert_eq!(users.modified_between(0, i64::MAX).len(), 1);
    }

    #[test]
    fn remove_replicated_leaves_no_tombstone() {
        let users = collection();
        let id = users.insert(Document::new()).unwrap();
        assert!(users.remove_replicated(id));
        assert!(!users.remove_replicated(id));
        assert_eq!(users.removal_count(), 0);
    }

    #[test]
    fn reinsert_forgets_tombstone() {
        let users = collection();
        let id = users.insert(Document::new()).unwrap();
        users.remove(id).unwrap();

        let mut doc = Document::new();
        doc.set_id(id);
        users.upsert(doc).unwrap();
        assert_eq!(users.removal_count(), 0);
    }

    #[test]
    fn paging_in_id_order() {
        let users = collection();
        for v in [5, 1, 3, 2, 4] {
            let mut doc = Document::new();
            doc.set_id(DocId::from_value(v));
            users.insert(doc).unwrap();
        }

        let page: Vec<_> = users.page(1, 2).iter().filter_map(Document::id).collect();
        assert_eq!(page, [DocId::from_value(2), DocId::from_value(3)]);
        assert!(users.page(10, 5).is_empty());
    }

    #[test]
    fn clear_keeps_attributes() {
        let users = collection();
        users.insert(Document::new()).unwrap();
        users.set_attributes(CollectionAttributes::new("users"));
        users.clear();

        assert!(users.is_empty());
        assert!(users.attributes().is_some());
    }
}
