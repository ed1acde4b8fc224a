//! Property-based test generators using proptest.
//!
//! Generated documents always carry an id and only user fields, so they can
//! be written to a collection or a gate as they are.

use proptest::prelude::*;
use replidb_core::{DocId, Document};
use replidb_sync_protocol::{ChangeFeed, ConflictPolicy};
use serde_json::Value;
use std::collections::BTreeSet;

/// Strategy for generating document ids from a small range, so that
/// generated batches overlap.
pub fn doc_id_strategy() -> impl Strategy<Value = DocId> {
    (1i64..64).prop_map(DocId::from_value)
}

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating user field names (never starting with `_`).
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}").expect("Invalid regex")
}

/// Strategy for generating scalar field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[ -~]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Strategy for generating a document with the given id.
pub fn document_with_id(id: DocId) -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..6).prop_map(
        move |fields| {
            let mut doc = Document::new();
            for (key, value) in fields {
                doc.put(key, value);
            }
            doc.set_id(id);
            doc
        },
    )
}

/// Strategy for generating a document with an id.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    doc_id_strategy().prop_flat_map(document_with_id)
}

/// Strategy for generating documents with distinct ids.
pub fn distinct_documents_strategy(max: usize) -> impl Strategy<Value = Vec<Document>> {
    prop::collection::btree_set(doc_id_strategy(), 0..max).prop_flat_map(|ids| {
        ids.into_iter()
            .map(document_with_id)
            .collect::<Vec<_>>()
    })
}

/// Strategy for generating a change feed whose removed ids do not overlap
/// its modified documents.
pub fn change_feed_strategy() -> impl Strategy<Value = ChangeFeed> {
    (
        distinct_documents_strategy(12),
        prop::collection::btree_set(doc_id_strategy(), 0..6),
    )
        .prop_map(|(modified, removed)| {
            let modified_ids: BTreeSet<DocId> = modified.iter().filter_map(Document::id).collect();
            let removed = removed.difference(&modified_ids).copied().collect();
            ChangeFeed::from_parts(modified, removed)
        })
}

/// Strategy for generating conflict policies.
pub fn conflict_policy_strategy() -> impl Strategy<Value = ConflictPolicy> {
    prop_oneof![Just(ConflictPolicy::RemoteWins), Just(ConflictPolicy::LastWriteWins)]
}

/// A local mutation for replication property tests.
#[derive(Debug, Clone)]
pub enum LocalOperation {
    /// Insert or replace a document.
    Upsert(Document),
    /// Remove a document by id.
    Remove(DocId),
}

/// Strategy for generating local mutations.
pub fn local_operation_strategy() -> impl Strategy<Value = LocalOperation> {
    prop_oneof![
        3 => document_strategy().prop_map(LocalOperation::Upsert),
        1 => doc_id_strategy().prop_map(LocalOperation::Remove),
    ]
}

/// Strategy for generating a sequence of local mutations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<LocalOperation>> {
    prop::collection::vec(local_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn documents_are_valid(doc in document_strategy()) {
            prop_assert!(doc.id().is_some());
            prop_assert!(doc.validate().is_ok());
            prop_assert!(doc.source().is_none());
        }

        #[test]
        fn distinct_documents_have_unique_ids(docs in distinct_documents_strategy(10)) {
            let ids: BTreeSet<_> = docs.iter().filter_map(Document::id).collect();
            prop_assert_eq!(ids.len(), docs.len());
        }

        #[test]
        fn feeds_do_not_remove_what_they_modify(feed in change_feed_strategy()) {
            prop_assert!(feed.modified_ids().is_disjoint(&feed.removed));
        }

        #[test]
        fn collection_name_is_valid(name in collection_name_strategy()) {
            prop_assert!(name.chars().next().is_some_and(|c| c.is_ascii_lowercase()));
        }
    }
}
