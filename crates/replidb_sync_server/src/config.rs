//! Server configuration.

use std::time::Duration;

/// Username and password accepted by basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Originator written into every served change feed.
    pub server_id: String,
    /// How long a sync lock stays valid without being released.
    pub lock_expiry: Duration,
    /// Upper bound on the wait a client may ask for when locking.
    pub max_lock_wait: Duration,
    /// Maximum page size for `fetch`.
    pub max_page_size: usize,
    /// Credentials required on every request, if set.
    pub credentials: Option<Credentials>,
    /// How long tombstones are kept, if pruning is enabled.
    pub tombstone_retention: Option<Duration>,
}

impl ServerConfig {
    /// Creates a configuration with the given server id.
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            lock_expiry: Duration::from_secs(60),
            max_lock_wait: Duration::from_secs(30),
            max_page_size: 1000,
            credentials: None,
            tombstone_retention: None,
        }
    }

    /// Sets the lock expiry.
    pub fn with_lock_expiry(mut self, expiry: Duration) -> Self {
        self.lock_expiry = expiry;
        self
    }

    /// Sets the maximum lock wait.
    pub fn with_max_lock_wait(mut self, wait: Duration) -> Self {
        self.max_lock_wait = wait;
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size;
        self
    }

    /// Requires basic authentication with the given credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Enables tombstone pruning.
    pub fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = Some(retention);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("gate")
    }
}
