//! Contract of the remote peer driven by the replicator.

use crate::error::SyncResult;
use replidb_core::Document;
use replidb_sync_protocol::ChangeFeed;
use std::time::Duration;

/// A remote collection the replicator synchronizes with.
///
/// Every method except `is_online` may fail with a transport error
/// distinct from an application-level rejection.
pub trait RemoteEndpoint: Send + Sync {
    /// Cheap reachability probe. `false` makes the replicator skip the
    /// operation silently.
    fn is_online(&self) -> bool;

    /// Tries to take the exclusive sync lock, waiting up to `max_wait`.
    ///
    /// Returns `Ok(false)` on timeout.
    fn try_acquire_lock(&self, max_wait: Duration, owner: &str) -> SyncResult<bool>;

    /// Releases the lock if `owner` holds it. Idempotent.
    fn release_lock(&self, owner: &str) -> SyncResult<()>;

    /// Mutations with a sequence greater than `from_sequence`, plus the
    /// sequence to record as the new cursor.
    fn changed_since(&self, from_sequence: i64) -> SyncResult<ChangeFeed>;

    /// Applies a feed. Returns whether the remote changed.
    fn apply_change(&self, feed: &ChangeFeed) -> SyncResult<bool>;

    /// Reads one page of documents in id order.
    fn fetch_page(&self, offset: usize, size: usize) -> SyncResult<Vec<Document>>;

    /// Deletes every document on the remote, on behalf of `owner`.
    fn clear(&self, owner: &str) -> SyncResult<()>;
}
