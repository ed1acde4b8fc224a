//! Request and response bodies for the remote endpoint routes.
//!
//! Every route is a `POST` to `/gate/{collection}/{endpoint}`. Bodies are
//! encoded with [`WireFormat`](crate::WireFormat); a change feed doubles
//! as the response of `changed-since` and the request of `change`.

use crate::error::{ProtocolError, ProtocolResult};
use replidb_core::Document;
use serde::{Deserialize, Serialize};

/// Path prefix of every route.
const GATE: &str = "gate";

/// Remote endpoint operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Reachability probe.
    Online,
    /// Acquire the per-collection sync lock.
    Lock,
    /// Release the sync lock.
    Unlock,
    /// Fetch the change feed since a sequence.
    ChangedSince,
    /// Apply a change feed.
    Change,
    /// Fetch one page of documents.
    Fetch,
    /// Remove every document.
    Clear,
}

impl Endpoint {
    /// All endpoints.
    pub const ALL: [Endpoint; 7] = [
        Endpoint::Online,
        Endpoint::Lock,
        Endpoint::Unlock,
        Endpoint::ChangedSince,
        Endpoint::Change,
        Endpoint::Fetch,
        Endpoint::Clear,
    ];

    /// Last path segment of the route.
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Online => "online",
            Endpoint::Lock => "lock",
            Endpoint::Unlock => "unlock",
            Endpoint::ChangedSince => "changed-since",
            Endpoint::Change => "change",
            Endpoint::Fetch => "fetch",
            Endpoint::Clear => "clear",
        }
    }

    /// Builds the route path for a collection.
    pub fn path(&self, collection: &str) -> String {
        format!("/{GATE}/{collection}/{}", self.as_str())
    }

    /// Splits a route path into its collection and endpoint.
    pub fn parse_path(path: &str) -> ProtocolResult<(String, Endpoint)> {
        let invalid = || ProtocolError::InvalidPath(path.to_string());
        let path = path.split('?').next().unwrap_or_default();
        let mut segments = path.trim_matches('/').split('/');

        if segments.next() != Some(GATE) {
            return Err(invalid());
        }
        let collection = segments.next().filter(|c| !c.is_empty()).ok_or_else(invalid)?;
        let name = segments.next().ok_or_else(invalid)?;
        if segments.next().is_some() {
            return Err(invalid());
        }
        let endpoint = Endpoint::ALL
            .into_iter()
            .find(|e| e.as_str() == name)
            .ok_or_else(invalid)?;

        Ok((collection.to_string(), endpoint))
    }
}

/// Body of `changed-since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedSinceRequest {
    /// Exclusive lower bound of the window.
    pub from_sequence: i64,
}

/// Body of `lock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    /// Replica asking for the lock.
    pub owner: String,
    /// How long the server may wait for the lock.
    pub max_wait_millis: u64,
}

/// Response of `lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    /// Whether the lock is now held by the requester.
    pub acquired: bool,
}

/// Body of `unlock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    /// Replica releasing the lock.
    pub owner: String,
}

/// Body of `clear`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    /// Replica asking for the reset, checked against the lock holder.
    pub owner: String,
}

/// Response of `change` and `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeAck {
    /// Whether the remote store changed.
    pub mutated: bool,
}

/// Body of `fetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Number of documents to skip.
    pub offset: usize,
    /// Maximum number of documents returned.
    pub size: usize,
}

/// Response of `fetch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    /// Documents in id order.
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// Response of `online`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineResponse {
    /// Whether the remote accepts sync traffic.
    pub online: bool,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Human-readable error.
    pub error: String,
}

impl ErrorResponse {
    /// Creates an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_round_trip() {
        for endpoint in Endpoint::ALL {
            let path = endpoint.path("users");
            assert_eq!(
                Endpoint::parse_path(&path).unwrap(),
                ("users".to_string(), endpoint)
            );
        }
        assert_eq!(Endpoint::ChangedSince.path("notes"), "/gate/notes/changed-since");
    }

    #[test]
    fn bad_paths() {
        for path in [
            "/",
            "/gate",
            "/gate/users",
            "/gate//lock",
            "/other/users/lock",
            "/gate/users/lock/extra",
            "/gate/users/explode",
        ] {
            assert!(
                matches!(Endpoint::parse_path(path), Err(ProtocolError::InvalidPath(_))),
                "{path}"
            );
        }
    }

    #[test]
    fn query_string_ignored() {
        let (collection, endpoint) = Endpoint::parse_path("/gate/users/fetch?x=1").unwrap();
        assert_eq!(collection, "users");
        assert_eq!(endpoint, Endpoint::Fetch);
    }

    #[test]
    fn camel_case_bodies() {
        assert_eq!(
            serde_json::to_value(ChangedSinceRequest { from_sequence: 4 }).unwrap(),
            json!({"fromSequence": 4})
        );
        assert_eq!(
            serde_json::to_value(LockRequest {
                owner: "a".into(),
                max_wait_millis: 250
            })
            .unwrap(),
            json!({"owner": "a", "maxWaitMillis": 250})
        );
        let page: PageResponse = serde_json::from_value(json!({})).unwrap();
        assert!(page.documents.is_empty());
    }
}
