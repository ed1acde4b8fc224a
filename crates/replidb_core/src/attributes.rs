//! Per-collection replication attributes.

use crate::clock::wall_millis;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Replication bookkeeping persisted alongside a collection.
///
/// `uuid` is generated once and identifies this replica of the collection;
/// the replicator uses it as the originator tag of every feed it sends.
/// `last_synced` is the cursor up to which this replica has reconciled with
/// its remote. It only moves forward and is written once, at the end of a
/// successful sync operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionAttributes {
    /// Name of the collection.
    pub collection: String,
    /// Stable replica identifier.
    pub uuid: String,
    /// Creation time in milliseconds.
    pub created_time: i64,
    /// Last time these attributes were written, in milliseconds.
    pub last_modified_time: i64,
    /// Sync cursor.
    #[serde(default)]
    pub last_synced: i64,
}

impl CollectionAttributes {
    /// Creates fresh attributes with a new replica id.
    pub fn new(collection: impl Into<String>) -> Self {
        let now = wall_millis();
        Self {
            collection: collection.into(),
            uuid: Uuid::new_v4().to_string(),
            created_time: now,
            last_modified_time: now,
            last_synced: 0,
        }
    }

    /// Advances the sync cursor. Never moves it backwards.
    pub fn advance_last_synced(&mut self, cursor: i64) {
        if cursor > self.last_synced {
            self.last_synced = cursor;
        }
        self.last_modified_time = wall_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_attributes() {
        let attrs = CollectionAttributes::new("users");
        assert_eq!(attrs.collection, "users");
        assert_eq!(attrs.last_synced, 0);
        assert!(Uuid::parse_str(&attrs.uuid).is_ok());
        assert_ne!(attrs.uuid, CollectionAttributes::new("users").uuid);
    }

    #[test]
    fn cursor_only_moves_forward() {
        let mut attrs = CollectionAttributes::new("users");
        attrs.advance_last_synced(50);
        assert_eq!(attrs.last_synced, 50);
        attrs.advance_last_synced(10);
        assert_eq!(attrs.last_synced, 50);
    }

    #[test]
    fn wire_names() {
        let attrs = CollectionAttributes::new("users");
        let json = serde_json::to_value(&attrs).unwrap();
        assert!(json.get("lastSynced").is_some());
        assert!(json.get("createdTime").is_some());
    }
}
