//! Basic authentication for the sync server.
//!
//! Clients send `Authorization: Basic base64(username:password)`. When the
//! server has no credentials configured every request is accepted.

use crate::config::Credentials;
use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Builds an `Authorization` header value for basic authentication.
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Parses a basic `Authorization` header value.
pub fn parse_basic_authorization(header: &str) -> Option<Credentials> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some(Credentials::new(username, password))
}

/// Checks request credentials against the configured ones.
#[derive(Debug, Clone)]
pub struct Authenticator {
    expected: Option<Credentials>,
}

impl Authenticator {
    /// Creates an authenticator. `None` disables authentication.
    pub fn new(expected: Option<Credentials>) -> Self {
        Self { expected }
    }

    /// Returns true if requests must carry credentials.
    pub fn is_required(&self) -> bool {
        self.expected.is_some()
    }

    /// Validates the `Authorization` header of a request.
    pub fn check(&self, authorization: Option<&str>) -> ServerResult<()> {
        let Some(expected) = &self.expected else {
            return Ok(());
        };

        let header = authorization
            .ok_or_else(|| ServerError::AuthenticationFailed("missing credentials".into()))?;
        let given = parse_basic_authorization(header)
            .ok_or_else(|| ServerError::AuthenticationFailed("malformed credentials".into()))?;

        // Compare digests so the comparison time does not depend on the
        // position of the first differing byte.
        if digest(&given) != digest(expected) {
            return Err(ServerError::AuthenticationFailed(
                "invalid username or password".into(),
            ));
        }
        Ok(())
    }
}

fn digest(credentials: &Credentials) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(credentials.username.as_bytes());
    hasher.update([0u8]);
    hasher.update(credentials.password.as_bytes());
    hasher.finalize().into()
}
