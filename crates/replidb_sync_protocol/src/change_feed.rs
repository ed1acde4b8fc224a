//! Change feed exchanged between replicas.

use replidb_core::{DocId, Document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A batch of mutations between two points in time.
///
/// Wire shape:
///
/// ```text
/// {
///   "modified": [ {<document fields...>, "_id": <id>}, ... ],
///   "removed":  [ <id>, ... ],
///   "originator": "<replica-uuid>",
///   "sequenceNumber": <int64>
/// }
/// ```
///
/// `modified` holds upserts (insert-or-replace by id), `removed` the ids
/// deleted in the window. `sequence_number` is the upper bound of the
/// window; a feed is requested with an exclusive lower bound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFeed {
    /// Upserted documents.
    #[serde(default)]
    pub modified: Vec<Document>,
    /// Removed ids.
    #[serde(default)]
    pub removed: BTreeSet<DocId>,
    /// Replica that produced the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originator: Option<String>,
    /// Upper bound of the feed's window.
    #[serde(default)]
    pub sequence_number: i64,
}

impl ChangeFeed {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a feed from its parts.
    pub fn from_parts(modified: Vec<Document>, removed: BTreeSet<DocId>) -> Self {
        Self {
            modified,
            removed,
            ..Self::default()
        }
    }

    /// Sets the originator.
    #[must_use]
    pub fn with_originator(mut self, originator: impl Into<String>) -> Self {
        self.originator = Some(originator.into());
        self
    }

    /// Sets the sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence_number: i64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    /// Returns true if the feed was produced by `originator`.
    pub fn is_from(&self, originator: &str) -> bool {
        self.originator.as_deref() == Some(originator)
    }

    /// Returns true if the feed carries no mutation.
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.removed.is_empty()
    }

    /// Number of mutations.
    pub fn len(&self) -> usize {
        self.modified.len() + self.removed.len()
    }

    /// Ids of the upserted documents.
    pub fn modified_ids(&self) -> BTreeSet<DocId> {
        self.modified.iter().filter_map(Document::id).collect()
    }

    /// Finds an upserted document by id.
    pub fn find_modified(&self, id: DocId) -> Option<&Document> {
        self.modified.iter().find(|doc| doc.id() == Some(id))
    }
}
