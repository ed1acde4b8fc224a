//! HTTP remote.
//!
//! [`HttpRemote`] speaks the gate protocol: one `POST` per operation to
//! `{base_url}/gate/{collection}/{endpoint}`, bodies in JSON or CBOR. The
//! client is abstracted by [`HttpClient`] so that tests can route requests
//! straight into an in-process server.

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteEndpoint;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use replidb_core::Document;
use replidb_sync_protocol::{
    ChangeAck, ChangeFeed, ChangedSinceRequest, ClearRequest, Endpoint, ErrorResponse, LockRequest,
    LockResponse, OnlineResponse, PageRequest, PageResponse, ReleaseRequest, WireFormat,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// An outgoing `POST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Encoded body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Returns the first header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Path component of the URL, without scheme, host or query.
    pub fn path(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let path = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
        path.split('?').next().unwrap_or(path)
    }
}

/// A response to an [`HttpRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only when no response was received.
pub trait HttpClient: Send + Sync {
    /// Sends a `POST` request.
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client is usable.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// [`RemoteEndpoint`] over HTTP.
pub struct HttpRemote<C: HttpClient> {
    base_url: String,
    collection: String,
    client: C,
    format: WireFormat,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a remote for `collection` on the gate at `base_url`.
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>, client: C) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.into(),
            client,
            format: WireFormat::Json,
            last_error: RwLock::new(None),
        }
    }

    /// Sets the body encoding.
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Remote collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Last transport or server error, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path(&self.collection))
    }

    fn send(&self, endpoint: Endpoint, body: Vec<u8>) -> SyncResult<HttpResponse> {
        let request = HttpRequest {
            url: self.url(endpoint),
            headers: vec![
                ("Content-Type".to_string(), self.format.content_type().to_string()),
                ("Accept".to_string(), self.format.content_type().to_string()),
            ],
            body,
        };

        let response = self.client.post(request).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(e)
        })?;
        Ok(response)
    }

    fn call<Req, Res>(&self, endpoint: Endpoint, request: &Req) -> SyncResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = self.format.encode(request)?;
        let response = self.send(endpoint, body)?;

        if !response.is_success() {
            let message = self
                .format
                .decode::<ErrorResponse>(&response.body)
                .map(|e| e.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());
            let err = SyncError::from_status(response.status, message);
            tracing::debug!(
                collection = %self.collection,
                endpoint = endpoint.as_str(),
                status = response.status,
                "gate rejected request: {err}"
            );
            *self.last_error.write() = Some(err.to_string());
            return Err(err);
        }

        *self.last_error.write() = None;
        Ok(self.format.decode(&response.body)?)
    }
}

impl<C: HttpClient> RemoteEndpoint for HttpRemote<C> {
    /// A remote that answers with an authentication failure counts as
    /// online, so the failure surfaces through the operation instead of
    /// being skipped silently.
    fn is_online(&self) -> bool {
        if !self.client.is_healthy() {
            return false;
        }
        match self.send(Endpoint::Online, Vec::new()) {
            Ok(response) if response.is_success() => self
                .format
                .decode::<OnlineResponse>(&response.body)
                .map(|r| r.online)
                .unwrap_or(false),
            Ok(response) => matches!(response.status, 401 | 403),
            Err(_) => false,
        }
    }

    fn try_acquire_lock(&self, max_wait: Duration, owner: &str) -> SyncResult<bool> {
        let request = LockRequest {
            owner: owner.to_string(),
            max_wait_millis: max_wait.as_millis() as u64,
        };
        let response: LockResponse = self.call(Endpoint::Lock, &request)?;
        Ok(response.acquired)
    }

    fn release_lock(&self, owner: &str) -> SyncResult<()> {
        let request = ReleaseRequest {
            owner: owner.to_string(),
        };
        let _: ChangeAck = self.call(Endpoint::Unlock, &request)?;
        Ok(())
    }

    fn changed_since(&self, from_sequence: i64) -> SyncResult<ChangeFeed> {
        self.call(Endpoint::ChangedSince, &ChangedSinceRequest { from_sequence })
    }

    fn apply_change(&self, feed: &ChangeFeed) -> SyncResult<bool> {
        let ack: ChangeAck = self.call(Endpoint::Change, feed)?;
        Ok(ack.mutated)
    }

    fn fetch_page(&self, offset: usize, size: usize) -> SyncResult<Vec<Document>> {
        let page: PageResponse = self.call(Endpoint::Fetch, &PageRequest { offset, size })?;
        Ok(page.documents)
    }

    fn clear(&self, owner: &str) -> SyncResult<()> {
        let request = ClearRequest {
            owner: owner.to_string(),
        };
        let _: ChangeAck = self.call(Endpoint::Clear, &request)?;
        Ok(())
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpRemote<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .field("format", &self.format)
            .finish()
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a `POST` and returns the response.
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

/// An HTTP client that routes requests directly to an in-process server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    authorization: Option<String>,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a client for the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            authorization: None,
        }
    }

    /// Sends HTTP Basic credentials with every request.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{username}:{password}"));
        self.authorization = Some(format!("Basic {token}"));
        self
    }

    /// The wrapped server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn post(&self, mut request: HttpRequest) -> Result<HttpResponse, String> {
        if let Some(authorization) = &self.authorization {
            request
                .headers
                .push(("Authorization".to_string(), authorization.clone()));
        }
        Ok(self.server.handle(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use replidb_core::DocId;

    /// Records requests and answers with a canned response.
    struct TestClient {
        response: Mutex<Result<HttpResponse, String>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl TestClient {
        fn answering(status: u16, body: Vec<u8>) -> Self {
            Self {
                response: Mutex::new(Ok(HttpResponse { status, body })),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                response: Mutex::new(Err(message.to_string())),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for TestClient {
        fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
            self.requests.lock().push(request);
            self.response.lock().clone()
        }
    }

    fn json<T: Serialize>(value: &T) -> Vec<u8> {
        WireFormat::Json.encode(value).unwrap()
    }

    #[test]
    fn request_path_parsing() {
        let request = HttpRequest {
            url: "https://sync.example.com:8443/gate/users/fetch?x=1".into(),
            headers: vec![("content-type".into(), "application/json".into())],
            body: Vec::new(),
        };
        assert_eq!(request.path(), "/gate/users/fetch");
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("accept"), None);
    }

    #[test]
    fn posts_to_endpoint_url() {
        let client = TestClient::answering(200, json(&LockResponse { acquired: true }));
        let remote = HttpRemote::new("https://sync.example.com/", "users", client);
        assert_eq!(remote.base_url(), "https://sync.example.com");

        assert!(remote.try_acquire_lock(Duration::from_millis(250), "replica-1").unwrap());

        let requests = remote.client().requests.lock();
        assert_eq!(requests[0].url, "https://sync.example.com/gate/users/lock");
        let sent: LockRequest = WireFormat::Json.decode(&requests[0].body).unwrap();
        assert_eq!(sent.owner, "replica-1");
        assert_eq!(sent.max_wait_millis, 250);
    }

    #[test]
    fn decodes_change_feed() {
        let mut doc = Document::new().with("name", "a");
        doc.set_id(DocId::from_value(1));
        let feed = ChangeFeed::from_parts(vec![doc], Default::default()).with_sequence(77);
        let remote = HttpRemote::new("http://gate", "users", TestClient::answering(200, json(&feed)));

        let received = remote.changed_since(10).unwrap();
        assert_eq!(received, feed);
    }

    #[test]
    fn transport_failure_is_retryable() {
        let remote = HttpRemote::new("http://gate", "users", TestClient::failing("connection refused"));

        assert!(!remote.is_online());
        let err = remote.changed_since(0).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(remote.last_error().as_deref(), Some("connection refused"));
    }

    #[test]
    fn error_status_carries_server_message() {
        let body = json(&ErrorResponse::new("lock held by replica-2"));
        let remote = HttpRemote::new("http://gate", "users", TestClient::answering(409, body));

        match remote.apply_change(&ChangeFeed::new()) {
            Err(SyncError::ServerError { status, message }) => {
                assert_eq!(status, 409);
                assert_eq!(message, "lock held by replica-2");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn online_probe() {
        let online = HttpRemote::new(
            "http://gate",
            "users",
            TestClient::answering(200, json(&OnlineResponse { online: true })),
        );
        assert!(online.is_online());

        let maintenance = HttpRemote::new(
            "http://gate",
            "users",
            TestClient::answering(200, json(&OnlineResponse { online: false })),
        );
        assert!(!maintenance.is_online());

        let unavailable = HttpRemote::new("http://gate", "users", TestClient::answering(503, Vec::new()));
        assert!(!unavailable.is_online());

        let unauthorized = HttpRemote::new("http://gate", "users", TestClient::answering(401, Vec::new()));
        assert!(unauthorized.is_online());
        assert!(matches!(
            unauthorized.changed_since(0),
            Err(SyncError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn loopback_adds_basic_auth() {
        struct Echo;
        impl LoopbackServer for Echo {
            fn handle(&self, request: &HttpRequest) -> HttpResponse {
                HttpResponse {
                    status: 200,
                    body: request.header("authorization").unwrap_or_default().as_bytes().to_vec(),
                }
            }
        }

        let client = LoopbackClient::new(Echo).with_basic_auth("alice", "secret");
        let response = client
            .post(HttpRequest {
                url: "http://gate/gate/users/online".into(),
                headers: Vec::new(),
                body: Vec::new(),
            })
            .unwrap();
        assert_eq!(response.body, b"Basic YWxpY2U6c2VjcmV0");
    }
}
