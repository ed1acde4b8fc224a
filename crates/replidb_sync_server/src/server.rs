//! The gate server entry point.

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::store::RemoteStore;
use replidb_sync_protocol::{Endpoint, ErrorResponse, WireFormat};
use std::sync::Arc;

/// An HTTP response produced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTTP status code.
    pub status: u16,
    /// Content type of `body`.
    pub content_type: &'static str,
    /// Encoded response body.
    pub body: Vec<u8>,
}

impl Reply {
    fn ok(format: WireFormat, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: format.content_type(),
            body,
        }
    }

    fn error(format: WireFormat, err: &ServerError) -> Self {
        let body = format
            .encode(&ErrorResponse::new(err.to_string()))
            .unwrap_or_default();
        Self {
            status: err.status_code(),
            content_type: format.content_type(),
            body,
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The gate server.
///
/// Handles the `POST /gate/{collection}/{endpoint}` routes independently
/// of any HTTP stack. Request and response bodies share the encoding named
/// by the request's `Content-Type` (JSON when absent).
///
/// # Example
///
/// ```
/// use replidb_sync_protocol::{ChangeAck, ChangeFeed, Endpoint, WireFormat};
/// use replidb_sync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let feed = ChangeFeed::new().with_originator("replica-a");
/// let body = WireFormat::Json.encode(&feed).unwrap();
///
/// let reply = server.handle_post(&Endpoint::Change.path("users"), &[], &body);
/// let ack: ChangeAck = WireFormat::Json.decode(&reply.body).unwrap();
/// assert!(!ack.mutated);
/// ```
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
    auth: Authenticator,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        let auth = Authenticator::new(config.credentials.clone());
        let context = Arc::new(HandlerContext::new(config));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self {
            handler,
            context,
            auth,
        }
    }

    /// Handles one `POST` request.
    ///
    /// `headers` are matched case-insensitively. Errors are turned into a
    /// reply carrying the status code and an `ErrorResponse` body.
    pub fn handle_post(&self, path: &str, headers: &[(String, String)], body: &[u8]) -> Reply {
        let content_type = header(headers, "content-type").unwrap_or_default();
        let format = WireFormat::from_content_type(content_type).unwrap_or_default();

        match self.route(path, headers, body) {
            Ok((format, body)) => Reply::ok(format, body),
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(path, status = err.status_code(), "request failed: {err}");
                } else {
                    tracing::debug!(path, status = err.status_code(), "request rejected: {err}");
                }
                Reply::error(format, &err)
            }
        }
    }

    fn route(
        &self,
        path: &str,
        headers: &[(String, String)],
        body: &[u8],
    ) -> ServerResult<(WireFormat, Vec<u8>)> {
        self.auth.check(header(headers, "authorization"))?;
        let format = WireFormat::from_content_type(header(headers, "content-type").unwrap_or_default())?;
        let (collection, endpoint) = Endpoint::parse_path(path)?;

        tracing::debug!(collection = %collection, endpoint = endpoint.as_str(), "gate request");
        let response = self.handler.dispatch(endpoint, &collection, format, body)?;
        Ok((format, response))
    }

    /// Returns the store for a collection, creating it if needed.
    pub fn store(&self, collection: &str) -> Arc<RemoteStore> {
        self.context.store(collection)
    }

    /// Returns the shared handler context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Switches the server on or off for sync traffic.
    pub fn set_online(&self, online: bool) {
        self.context.set_online(online);
    }
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::basic_authorization;
    use crate::config::Credentials;
    use replidb_sync_protocol::{ChangeFeed, ChangedSinceRequest, LockRequest, LockResponse};

    fn json_headers() -> Vec<(String, String)> {
        vec![("Content-Type".into(), "application/json".into())]
    }

    #[test]
    fn unknown_route_is_404() {
        let server = SyncServer::new(ServerConfig::default());
        let reply = server.handle_post("/gate/users/explode", &[], b"{}");
        assert_eq!(reply.status, 404);
        let err: ErrorResponse = WireFormat::Json.decode(&reply.body).unwrap();
        assert!(err.error.contains("/gate/users/explode"));
    }

    #[test]
    fn bad_body_is_400() {
        let server = SyncServer::new(ServerConfig::default());
        let reply = server.handle_post(&Endpoint::Lock.path("users"), &json_headers(), b"[1,2");
        assert_eq!(reply.status, 400);
    }

    #[test]
    fn unsupported_media_type_is_415() {
        let server = SyncServer::new(ServerConfig::default());
        let headers = vec![("content-type".to_string(), "text/xml".to_string())];
        let reply = server.handle_post(&Endpoint::Online.path("users"), &headers, b"");
        assert_eq!(reply.status, 415);
        assert_eq!(reply.content_type, "application/json");
    }

    #[test]
    fn lock_round_trip_over_cbor() {
        let server = SyncServer::new(ServerConfig::default());
        let headers = vec![("Content-Type".to_string(), "application/cbor".to_string())];
        let body = WireFormat::Cbor
            .encode(&LockRequest {
                owner: "a".into(),
                max_wait_millis: 0,
            })
            .unwrap();

        let reply = server.handle_post(&Endpoint::Lock.path("users"), &headers, &body);
        assert!(reply.is_success());
        assert_eq!(reply.content_type, "application/cbor");
        let response: LockResponse = WireFormat::Cbor.decode(&reply.body).unwrap();
        assert!(response.acquired);
    }

    #[test]
    fn credentials_enforced() {
        let server = SyncServer::new(
            ServerConfig::default().with_credentials(Credentials::new("sync", "secret")),
        );
        let path = Endpoint::Online.path("users");

        assert_eq!(server.handle_post(&path, &[], b"").status, 401);

        let mut headers = json_headers();
        headers.push(("Authorization".into(), basic_authorization("sync", "secret")));
        assert_eq!(server.handle_post(&path, &headers, b"").status, 200);
    }

    #[test]
    fn lock_conflict_is_409() {
        let server = SyncServer::new(ServerConfig::default());
        assert!(server.context().locks.try_acquire("users", "a", Default::default()));

        let body = WireFormat::Json
            .encode(&ChangeFeed::new().with_originator("b"))
            .unwrap();
        let reply = server.handle_post(&Endpoint::Change.path("users"), &json_headers(), &body);
        assert_eq!(reply.status, 409);
    }

    #[test]
    fn offline_is_503() {
        let server = SyncServer::new(ServerConfig::default());
        server.set_online(false);
        let body = WireFormat::Json
            .encode(&ChangedSinceRequest { from_sequence: 0 })
            .unwrap();
        let reply = server.handle_post(&Endpoint::ChangedSince.path("users"), &[], &body);
        assert_eq!(reply.status, 503);
    }
}
