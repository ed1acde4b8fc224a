//! Removal log (tombstones) for local deletions.

use crate::document::DocId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Record of a document removed by a local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Id of the removed document.
    pub id: DocId,
    /// Sequence value at removal.
    pub delete_time: i64,
}

/// Tombstones kept until peers have observed the deletions.
///
/// Entries are appended in `delete_time` order. A later re-insert of the
/// same id drops its tombstone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemovalLog {
    entries: Vec<Tombstone>,
}

impl RemovalLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a removal.
    pub fn record(&mut self, id: DocId, delete_time: i64) {
        self.forget(id);
        self.entries.push(Tombstone { id, delete_time });
    }

    /// Drops the tombstone for `id`, if any.
    pub fn forget(&mut self, id: DocId) {
        self.entries.retain(|t| t.id != id);
    }

    /// Ids removed in the window `(from, to]`.
    pub fn removed_between(&self, from: i64, to: i64) -> BTreeSet<DocId> {
        self.entries
            .iter()
            .filter(|t| t.delete_time > from && t.delete_time <= to)
            .map(|t| t.id)
            .collect()
    }

    /// Deletes entries with `delete_time <= upto`. Returns how many went.
    pub fn prune(&mut self, upto: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|t| t.delete_time > upto);
        before - self.entries.len()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of tombstones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no tombstones.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over tombstones in removal order.
    pub fn iter(&self) -> impl Iterator<Item = &Tombstone> {
        self.entries.iter()
    }

    /// Highest `delete_time` recorded.
    pub fn latest(&self) -> Option<i64> {
        self.entries.iter().map(|t| t.delete_time).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: i64) -> DocId {
        DocId::from_value(v)
    }

    #[test]
    fn window_is_half_open() {
        let mut log = RemovalLog::new();
        log.record(id(1), 10);
        log.record(id(2), 20);
        log.record(id(3), 30);

        let removed = log.removed_between(10, 30);
        assert_eq!(removed.into_iter().collect::<Vec<_>>(), [id(2), id(3)]);
    }

    #[test]
    fn prune_up_to() {
        let mut log = RemovalLog::new();
        log.record(id(1), 10);
        log.record(id(2), 20);

        assert_eq!(log.prune(10), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.prune(5), 0);
        assert_eq!(log.prune(20), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn rerecord_replaces() {
        let mut log = RemovalLog::new();
        log.record(id(1), 10);
        log.record(id(1), 40);
        assert_eq!(log.len(), 1);
        assert_eq!(log.latest(), Some(40));

        log.forget(id(1));
        assert!(log.is_empty());
    }
}
