//! Blocking [`HttpClient`] backed by `reqwest`.

use crate::error::{SyncError, SyncResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use std::fmt;
use std::time::Duration;

/// Client identification sent as the `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Id of the installation or device.
    pub client_id: String,
}

impl UserAgent {
    /// Creates a user agent.
    pub fn new(name: impl Into<String>, version: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            client_id: client_id.into(),
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.name, self.version, self.client_id)
    }
}

/// Builder for [`ReqwestClient`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestClientBuilder {
    credentials: Option<(String, String)>,
    proxy: Option<String>,
    trust_all_certs: bool,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    user_agent: Option<UserAgent>,
}

impl ReqwestClientBuilder {
    /// Sends HTTP Basic credentials with every request.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Routes all requests through a proxy, e.g. `http://proxy:3128`.
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    /// Accepts any server certificate. Only for test deployments.
    pub fn trust_all_certs(mut self) -> Self {
        self.trust_all_certs = true;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the timeout for a whole request.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Sets the `User-Agent`.
    pub fn user_agent(mut self, user_agent: UserAgent) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    /// Builds the client.
    pub fn build(self) -> SyncResult<ReqwestClient> {
        let mut builder = reqwest::blocking::Client::builder();

        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = self.read_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.to_string());
        }
        if let Some(url) = &self.proxy {
            let proxy = reqwest::Proxy::all(url.as_str())
                .map_err(|e| SyncError::InvalidConfig(format!("invalid proxy {url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if self.trust_all_certs {
            tracing::warn!("certificate validation disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let inner = builder
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("failed to build http client: {e}")))?;

        Ok(ReqwestClient {
            inner,
            credentials: self.credentials,
        })
    }
}

/// [`HttpClient`] over a blocking `reqwest` client.
///
/// Must not be used from inside an async runtime.
#[derive(Clone)]
pub struct ReqwestClient {
    inner: reqwest::blocking::Client,
    credentials: Option<(String, String)>,
}

impl ReqwestClient {
    /// Starts a builder.
    pub fn builder() -> ReqwestClientBuilder {
        ReqwestClientBuilder::default()
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let mut builder = self.inner.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((username, password)) = &self.credentials {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = builder.body(request.body).send().map_err(|e| {
            if e.is_timeout() {
                format!("request to {} timed out", request.url)
            } else {
                format!("request to {} failed: {e}", request.url)
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| format!("failed to read response from {}: {e}", request.url))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

impl fmt::Debug for ReqwestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestClient")
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}
