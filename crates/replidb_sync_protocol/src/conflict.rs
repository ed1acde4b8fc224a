//! Conflict detection and resolution for merges.
//!
//! A conflict exists when the same id appears in both the remote feed and
//! the local feed of one merge. `ConflictPolicy::RemoteWins` keeps both
//! feeds untouched: the local side is pushed, then the remote side is
//! applied locally, so the remote version ends up in the local store while
//! the remote store keeps what was just pushed. `LastWriteWins` rewrites
//! the feeds so both replicas converge on the same version.

use crate::change_feed::ChangeFeed;
use replidb_core::{DocId, Document, DOC_MODIFIED, DOC_REVISION, DOC_SOURCE};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// A conflict between local and remote changes to one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// Document id.
    pub id: DocId,
    /// Hash of the local version, `None` if removed locally.
    pub local_hash: Option<[u8; 32]>,
    /// Hash of the remote version, `None` if removed remotely.
    pub remote_hash: Option<[u8; 32]>,
    /// `_modified` of the local version.
    pub local_modified: Option<i64>,
    /// `_modified` of the remote version.
    pub remote_modified: Option<i64>,
    /// Resolution (if any).
    pub resolution: Option<ConflictResolution>,
}

impl Conflict {
    fn between(id: DocId, local: Option<&Document>, remote: Option<&Document>) -> Self {
        Self {
            id,
            local_hash: local.map(content_hash),
            remote_hash: remote.map(content_hash),
            local_modified: local.and_then(Document::modified),
            remote_modified: remote.and_then(Document::modified),
            resolution: None,
        }
    }

    /// Returns true if both sides updated the document.
    pub fn is_update_conflict(&self) -> bool {
        self.local_hash.is_some() && self.remote_hash.is_some()
    }

    /// Returns true if one side updated and the other removed the document.
    pub fn is_update_delete_conflict(&self) -> bool {
        self.local_hash.is_some() != self.remote_hash.is_some()
    }

    /// Returns true if both sides hold the same content.
    pub fn is_identical(&self) -> bool {
        self.local_hash == self.remote_hash
    }

    /// Resolves the conflict with the given resolution.
    pub fn resolve(&mut self, resolution: ConflictResolution) {
        self.resolution = Some(resolution);
    }

    /// Returns true if the conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Resolution for a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep local version.
    KeepLocal,
    /// Accept remote version.
    AcceptRemote,
}

/// Policy applied to conflicts found during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Push local, then apply remote, without reconciling the feeds.
    #[default]
    RemoteWins,
    /// Newer `_modified` wins; ties and removals go to the remote side.
    LastWriteWins,
}

impl ConflictPolicy {
    /// Returns the policy name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::RemoteWins => "remote-wins",
            ConflictPolicy::LastWriteWins => "last-write-wins",
        }
    }

    /// Resolves a conflict according to this policy.
    pub fn resolve(&self, conflict: &mut Conflict) {
        let resolution = match self {
            ConflictPolicy::RemoteWins => ConflictResolution::AcceptRemote,
            ConflictPolicy::LastWriteWins => match (conflict.local_modified, conflict.remote_modified) {
                (Some(local), Some(remote))
                    if conflict.is_update_conflict() && !conflict.is_identical() && local > remote =>
                {
                    ConflictResolution::KeepLocal
                }
                _ => ConflictResolution::AcceptRemote,
            },
        };
        conflict.resolve(resolution);
    }

    /// Finds conflicts between a remote and a local feed and resolves them.
    ///
    /// Under `LastWriteWins` the losing side of every conflict is dropped
    /// from its feed: a local win keeps the remote version from being
    /// applied locally, a remote win keeps the local version from being
    /// pushed.
    pub fn reconcile(&self, remote: &mut ChangeFeed, local: &mut ChangeFeed) -> Vec<Conflict> {
        let mut conflicts = detect(remote, local);
        for conflict in &mut conflicts {
            self.resolve(conflict);
        }

        if *self == ConflictPolicy::LastWriteWins {
            for conflict in &conflicts {
                let id = conflict.id;
                match conflict.resolution {
                    Some(ConflictResolution::KeepLocal) => {
                        remote.modified.retain(|doc| doc.id() != Some(id));
                        remote.removed.remove(&id);
                    }
                    Some(ConflictResolution::AcceptRemote) => {
                        local.modified.retain(|doc| doc.id() != Some(id));
                        local.removed.remove(&id);
                    }
                    None => {}
                }
            }
        }

        conflicts
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote-wins" => Ok(ConflictPolicy::RemoteWins),
            "last-write-wins" | "lww" => Ok(ConflictPolicy::LastWriteWins),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

fn detect(remote: &ChangeFeed, local: &ChangeFeed) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for remote_doc in &remote.modified {
        let Some(id) = remote_doc.id() else { continue };
        if let Some(local_doc) = local.find_modified(id) {
            conflicts.push(Conflict::between(id, Some(local_doc), Some(remote_doc)));
        } else if local.removed.contains(&id) {
            conflicts.push(Conflict::between(id, None, Some(remote_doc)));
        }
    }

    for &id in &remote.removed {
        if let Some(local_doc) = local.find_modified(id) {
            conflicts.push(Conflict::between(id, Some(local_doc), None));
        }
    }

    conflicts.sort_by_key(|c| c.id);
    conflicts
}

/// SHA-256 over the document's user content.
///
/// Bookkeeping fields (`_revision`, `_modified`, `_source`) are excluded
/// and object keys are sorted, so two replicas holding the same content
/// hash equal regardless of field order.
pub fn content_hash(doc: &Document) -> [u8; 32] {
    let mut content = Map::new();
    let mut keys: Vec<&String> = doc
        .as_map()
        .keys()
        .filter(|k| !matches!(k.as_str(), DOC_REVISION | DOC_MODIFIED | DOC_SOURCE))
        .collect();
    keys.sort();
    for key in keys {
        if let Some(value) = doc.get(key) {
            content.insert(key.clone(), canonical(value));
        }
    }

    let bytes = serde_json::to_vec(&Value::Object(content)).unwrap_or_default();
    Sha256::digest(&bytes).into()
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), canonical(&map[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: i64, name: &str, modified: i64) -> Document {
        let mut d = Document::from_value(json!({
            "name": name,
            "_id": id,
            "_modified": modified,
            "_revision": 1
        }))
        .unwrap();
        d.set_id(DocId::from_value(id));
        d
    }

    fn id(v: i64) -> DocId {
        DocId::from_value(v)
    }

    #[test]
    fn hash_ignores_bookkeeping_and_key_order() {
        let a = Document::from_value(json!({"x": 1, "y": {"b": 2, "a": 1}, "_modified": 5})).unwrap();
        let b = Document::from_value(json!({"y": {"a": 1, "b": 2}, "x": 1, "_modified": 9, "_source": "r"}))
            .unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));

        let c = Document::from_value(json!({"x": 2})).unwrap();
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn detects_update_and_delete_conflicts() {
        let remote = ChangeFeed::from_parts(vec![doc(1, "r", 10), doc(2, "r", 10)], [id(3)].into());
        let local = ChangeFeed::from_parts(vec![doc(1, "l", 20), doc(3, "l", 20)], [id(2)].into());

        let conflicts = detect(&remote, &local);
        assert_eq!(conflicts.len(), 3);
        assert!(conflicts[0].is_update_conflict());
        assert!(conflicts[1].is_update_delete_conflict());
        assert!(conflicts[1].local_hash.is_none());
        assert!(conflicts[2].is_update_delete_conflict());
        assert!(conflicts[2].remote_hash.is_none());
    }

    #[test]
    fn remote_wins_leaves_feeds_alone() {
        let mut remote = ChangeFeed::from_parts(vec![doc(1, "r", 10)], Default::default());
        let mut local = ChangeFeed::from_parts(vec![doc(1, "l", 20)], Default::default());

        let conflicts = ConflictPolicy::RemoteWins.reconcile(&mut remote, &mut local);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resolution, Some(ConflictResolution::AcceptRemote));
        assert_eq!(remote.modified.len(), 1);
        assert_eq!(local.modified.len(), 1);
    }

    #[test]
    fn last_write_wins_newer_local() {
        let mut remote = ChangeFeed::from_parts(vec![doc(1, "r", 10)], Default::default());
        let mut local = ChangeFeed::from_parts(vec![doc(1, "l", 20)], Default::default());

        let conflicts = ConflictPolicy::LastWriteWins.reconcile(&mut remote, &mut local);
        assert_eq!(conflicts[0].resolution, Some(ConflictResolution::KeepLocal));
        assert!(remote.modified.is_empty());
        assert_eq!(local.modified.len(), 1);
    }

    #[test]
    fn last_write_wins_tie_goes_remote() {
        let mut remote = ChangeFeed::from_parts(vec![doc(1, "r", 10)], Default::default());
        let mut local = ChangeFeed::from_parts(vec![doc(1, "l", 10)], Default::default());

        let conflicts = ConflictPolicy::LastWriteWins.reconcile(&mut remote, &mut local);
        assert_eq!(conflicts[0].resolution, Some(ConflictResolution::AcceptRemote));
        assert_eq!(remote.modified.len(), 1);
        assert!(local.modified.is_empty());
    }

    #[test]
    fn last_write_wins_removal_goes_remote() {
        let mut remote = ChangeFeed::from_parts(vec![], [id(1)].into());
        let mut local = ChangeFeed::from_parts(vec![doc(1, "l", 99)], [id(2)].into());
        remote.modified.push(doc(2, "r", 1));

        ConflictPolicy::LastWriteWins.reconcile(&mut remote, &mut local);
        assert!(local.modified.is_empty());
        assert!(local.removed.is_empty());
        assert!(remote.removed.contains(&id(1)));
        assert_eq!(remote.modified.len(), 1);
    }

    #[test]
    fn no_overlap_no_conflict() {
        let mut remote = ChangeFeed::from_parts(vec![doc(1, "r", 10)], Default::default());
        let mut local = ChangeFeed::from_parts(vec![doc(2, "l", 10)], Default::default());
        assert!(ConflictPolicy::LastWriteWins
            .reconcile(&mut remote, &mut local)
            .is_empty());
    }

    #[test]
    fn policy_names() {
        for policy in [ConflictPolicy::RemoteWins, ConflictPolicy::LastWriteWins] {
            assert_eq!(policy.as_str().parse::<ConflictPolicy>().unwrap(), policy);
        }
        assert!("manual".parse::<ConflictPolicy>().is_err());
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::RemoteWins);
    }
}
