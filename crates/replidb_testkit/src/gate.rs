//! In-process gate helpers.
//!
//! [`TestGate`] wraps a [`SyncServer`] and talks to it through the same
//! `handle_post` entry point a real HTTP listener would use.

use replidb_core::Document;
use replidb_sync_protocol::{
    ChangeAck, ChangeFeed, ChangedSinceRequest, Endpoint, LockRequest, LockResponse, PageRequest,
    PageResponse, ReleaseRequest, WireFormat,
};
use replidb_sync_server::{basic_authorization, Credentials, Reply, ServerConfig, SyncServer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Default server id of test gates.
pub const TEST_GATE_ID: &str = "test-gate";

/// An in-process gate with typed request helpers.
#[derive(Clone)]
pub struct TestGate {
    server: Arc<SyncServer>,
    authorization: Option<String>,
    format: WireFormat,
}

impl TestGate {
    /// Creates a gate without authentication.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::new(TEST_GATE_ID))
    }

    /// Creates a gate from a configuration. If the configuration requires
    /// credentials, requests made through this gate carry them.
    pub fn with_config(config: ServerConfig) -> Self {
        let authorization = config
            .credentials
            .as_ref()
            .map(|c| basic_authorization(&c.username, &c.password));
        Self {
            server: Arc::new(SyncServer::new(config)),
            authorization,
            format: WireFormat::Json,
        }
    }

    /// Creates a gate that requires the given credentials.
    pub fn with_credentials(username: &str, password: &str) -> Self {
        Self::with_config(
            ServerConfig::new(TEST_GATE_ID).with_credentials(Credentials::new(username, password)),
        )
    }

    /// Uses `format` for request and response bodies.
    pub fn using(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// The wrapped server.
    pub fn server(&self) -> &Arc<SyncServer> {
        &self.server
    }

    /// Sends a raw request with the gate's headers.
    pub fn post(&self, collection: &str, endpoint: Endpoint, body: &[u8]) -> Reply {
        let mut headers = vec![(
            "Content-Type".to_string(),
            self.format.content_type().to_string(),
        )];
        if let Some(authorization) = &self.authorization {
            headers.push(("Authorization".to_string(), authorization.clone()));
        }
        self.server
            .handle_post(&endpoint.path(collection), &headers, body)
    }

    /// Sends a typed request and decodes a successful reply.
    ///
    /// # Panics
    ///
    /// Panics if the gate answers with an error status.
    pub fn request<Req, Res>(&self, collection: &str, endpoint: Endpoint, request: &Req) -> Res
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = self.format.encode(request).expect("Failed to encode request");
        let reply = self.post(collection, endpoint, &body);
        assert!(
            reply.is_success(),
            "{} failed with status {}: {}",
            endpoint.as_str(),
            reply.status,
            String::from_utf8_lossy(&reply.body)
        );
        self.format.decode(&reply.body).expect("Failed to decode reply")
    }

    /// Writes documents to the gate as if `originator` pushed them.
    pub fn seed(&self, collection: &str, originator: &str, docs: Vec<Document>) -> bool {
        let feed = ChangeFeed::from_parts(docs, Default::default()).with_originator(originator);
        let ack: ChangeAck = self.request(collection, Endpoint::Change, &feed);
        ack.mutated
    }

    /// Changes after `from_sequence`.
    pub fn changed_since(&self, collection: &str, from_sequence: i64) -> ChangeFeed {
        self.request(collection, Endpoint::ChangedSince, &ChangedSinceRequest { from_sequence })
    }

    /// Documents in id order, up to the gate's page limit.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let page: PageResponse = self.request(
            collection,
            Endpoint::Fetch,
            &PageRequest {
                offset: 0,
                size: usize::MAX,
            },
        );
        page.documents
    }

    /// Takes the collection lock for `owner`.
    pub fn lock(&self, collection: &str, owner: &str, max_wait: Duration) -> bool {
        let response: LockResponse = self.request(
            collection,
            Endpoint::Lock,
            &LockRequest {
                owner: owner.to_string(),
                max_wait_millis: max_wait.as_millis() as u64,
            },
        );
        response.acquired
    }

    /// Releases the collection lock held by `owner`.
    pub fn unlock(&self, collection: &str, owner: &str) -> bool {
        let ack: ChangeAck = self.request(
            collection,
            Endpoint::Unlock,
            &ReleaseRequest {
                owner: owner.to_string(),
            },
        );
        ack.mutated
    }

    /// Takes the gate offline or back online.
    pub fn set_online(&self, online: bool) {
        self.server.set_online(online);
    }
}

impl Default for TestGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{doc_named, names};

    #[test]
    fn test_seed_and_read_back() {
        let gate = TestGate::new();
        assert!(gate.seed("users", "peer", vec![doc_named(2, "b"), doc_named(1, "a")]));

        let docs = gate.documents("users");
        assert_eq!(names(&docs), ["a", "b"]);
        assert!(docs.iter().all(|d| d.source() == Some("peer")));

        let feed = gate.changed_since("users", 0);
        assert_eq!(feed.originator.as_deref(), Some(TEST_GATE_ID));
        assert_eq!(feed.modified.len(), 2);
    }

    #[test]
    fn test_authenticated_gate() {
        let gate = TestGate::with_credentials("alice", "secret");
        assert!(gate.seed("users", "peer", vec![doc_named(1, "a")]));

        let anonymous = gate.server().handle_post(&Endpoint::Fetch.path("users"), &[], b"{}");
        assert_eq!(anonymous.status, 401);
    }

    #[test]
    fn test_cbor_gate() {
        let gate = TestGate::new().using(WireFormat::Cbor);
        gate.seed("users", "peer", vec![doc_named(1, "a")]);
        assert_eq!(gate.documents("users").len(), 1);
    }

    #[test]
    fn test_lock_helpers() {
        let gate = TestGate::new();
        assert!(gate.lock("users", "r1", Duration::ZERO));
        assert!(!gate.lock("users", "r2", Duration::ZERO));
        assert!(gate.unlock("users", "r1"));
        assert!(gate.lock("users", "r2", Duration::ZERO));
    }
}
