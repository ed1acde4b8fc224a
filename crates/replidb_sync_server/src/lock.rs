//! Per-collection sync locks.

use crate::error::{ServerError, ServerResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Holder {
    owner: String,
    expires_at: Instant,
}

/// Owner-scoped, expiring locks keyed by collection name.
///
/// A lock is held by one owner at a time. Acquiring again as the current
/// owner succeeds and extends the expiry. Only the owner can release it;
/// a release by anyone else is a no-op. An expired lock counts as free.
#[derive(Debug)]
pub struct LockManager {
    expiry: Duration,
    locks: Mutex<HashMap<String, Holder>>,
    released: Condvar,
}

impl LockManager {
    /// Creates a lock manager whose locks expire after `expiry`.
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Lock lifetime.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Tries to take the lock, waiting up to `max_wait` for it to free up.
    ///
    /// Returns false on timeout.
    pub fn try_acquire(&self, collection: &str, owner: &str, max_wait: Duration) -> bool {
        let deadline = Instant::now() + max_wait;
        let mut locks = self.locks.lock();

        loop {
            let now = Instant::now();
            let held_until = match locks.get(collection) {
                Some(holder) if holder.expires_at > now && holder.owner != owner => {
                    Some(holder.expires_at)
                }
                _ => None,
            };

            match held_until {
                None => {
                    locks.insert(
                        collection.to_string(),
                        Holder {
                            owner: owner.to_string(),
                            expires_at: now + self.expiry,
                        },
                    );
                    tracing::debug!(collection, owner, "sync lock acquired");
                    return true;
                }
                Some(_) if now >= deadline => {
                    tracing::debug!(collection, owner, "sync lock wait timed out");
                    return false;
                }
                Some(expires_at) => {
                    self.released.wait_until(&mut locks, deadline.min(expires_at));
                }
            }
        }
    }

    /// Releases the lock if `owner` holds it. Returns whether it was released.
    pub fn release(&self, collection: &str, owner: &str) -> bool {
        let mut locks = self.locks.lock();
        let owned = locks
            .get(collection)
            .is_some_and(|holder| holder.owner == owner);
        if owned {
            locks.remove(collection);
            self.released.notify_all();
            tracing::debug!(collection, owner, "sync lock released");
        }
        owned
    }

    /// Current unexpired holder of a collection's lock.
    pub fn holder(&self, collection: &str) -> Option<String> {
        let locks = self.locks.lock();
        locks
            .get(collection)
            .filter(|holder| holder.expires_at > Instant::now())
            .map(|holder| holder.owner.clone())
    }

    /// Fails if the lock is held by someone other than `owner`.
    pub fn check_owner(&self, collection: &str, owner: Option<&str>) -> ServerResult<()> {
        match self.holder(collection) {
            Some(holder) if Some(holder.as_str()) != owner => Err(ServerError::LockHeld {
                collection: collection.to_string(),
                holder,
            }),
            _ => Ok(()),
        }
    }
}
