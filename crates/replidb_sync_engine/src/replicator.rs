//! The sync orchestrator.
//!
//! Every operation is a single pass: probe the remote, take the remote
//! lock, move data, advance the cursor, publish events, release the lock.
//! Failures are reported through `REPLICATION_ERROR` events and the
//! returned [`SyncOutcome`]; the cursor only moves after all data movement
//! succeeded, so a failed or interrupted operation retries the same window.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::event::{EventBus, EventType, SyncEvent};
use crate::local::LocalCollection;
use crate::remote::RemoteEndpoint;
use parking_lot::RwLock;
use replidb_sync_protocol::{ChangeFeed, Conflict};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Direction of a scheduled or CLI-driven sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncType {
    /// Local to remote.
    Push,
    /// Remote to local.
    Pull,
    /// Both directions (merge).
    Both,
}

/// A replicator operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    /// `pull`.
    Pull,
    /// `push`.
    Push,
    /// `merge`.
    Merge,
    /// `reset_local_with_remote`.
    ResetLocal,
    /// `reset_remote_with_local`.
    ResetRemote,
}

impl SyncOperation {
    /// Operation name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Pull => "pull",
            SyncOperation::Push => "push",
            SyncOperation::Merge => "merge",
            SyncOperation::ResetLocal => "reset-local",
            SyncOperation::ResetRemote => "reset-remote",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One local collection bound to one remote endpoint.
///
/// The originator is the replica uuid from the local attributes. It tags
/// every pushed feed, names the lock owner and filters echoes.
#[derive(Clone)]
pub struct SyncTarget {
    local: Arc<dyn LocalCollection>,
    remote: Arc<dyn RemoteEndpoint>,
    originator: String,
}

impl SyncTarget {
    /// Binds a collection to a remote, creating local attributes if needed.
    pub fn new(local: Arc<dyn LocalCollection>, remote: Arc<dyn RemoteEndpoint>) -> SyncResult<Self> {
        let originator = local.attributes_or_default()?.uuid;
        Ok(Self {
            local,
            remote,
            originator,
        })
    }

    /// Replica id used as originator and lock owner.
    pub fn originator(&self) -> &str {
        &self.originator
    }

    /// The local collection.
    pub fn local(&self) -> &Arc<dyn LocalCollection> {
        &self.local
    }

    /// The remote endpoint.
    pub fn remote(&self) -> &Arc<dyn RemoteEndpoint> {
        &self.remote
    }

    /// Name of the local collection.
    pub fn collection_name(&self) -> &str {
        self.local.name()
    }
}

impl fmt::Debug for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTarget")
            .field("collection", &self.local.name())
            .field("originator", &self.originator)
            .finish()
    }
}

/// What a completed operation did.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Operation that ran.
    pub operation: SyncOperation,
    /// Changes applied to the local collection.
    pub pulled: usize,
    /// Mutations sent to the remote.
    pub pushed: usize,
    /// Whether the remote reported a change.
    pub remote_mutated: bool,
    /// Removal log entries dropped.
    pub pruned_removals: usize,
    /// Ids changed on both sides during a merge.
    pub conflicts: Vec<Conflict>,
    /// Cursor after the operation, if the operation moves it.
    pub cursor: Option<i64>,
    /// Wall time spent.
    pub duration: Duration,
}

impl SyncReport {
    fn new(operation: SyncOperation) -> Self {
        Self {
            operation,
            pulled: 0,
            pushed: 0,
            remote_mutated: false,
            pruned_removals: 0,
            conflicts: Vec::new(),
            cursor: None,
            duration: Duration::ZERO,
        }
    }
}

/// Result of one replicator operation.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Remote was offline; nothing happened and no event was published.
    Offline,
    /// The remote lock could not be taken in time; nothing happened.
    LockUnavailable,
    /// The operation finished.
    Completed(SyncReport),
    /// The operation failed; the cursor is unchanged.
    Failed(Arc<SyncError>),
}

impl SyncOutcome {
    /// Returns true for `Completed`.
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }

    /// Returns true for `Failed`.
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }

    /// The report of a completed operation.
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    /// The error of a failed operation.
    pub fn error(&self) -> Option<&Arc<SyncError>> {
        match self {
            SyncOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Cumulative statistics of a replicator.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Operations completed.
    pub operations_completed: u64,
    /// Operations failed.
    pub operations_failed: u64,
    /// Operations skipped (remote offline or lock unavailable).
    pub operations_skipped: u64,
    /// Changes applied locally.
    pub documents_pulled: u64,
    /// Mutations sent to remotes.
    pub documents_pushed: u64,
    /// Conflicts found during merges.
    pub conflicts_encountered: u64,
    /// Last completed operation.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Drives pull, push, merge and full resets for sync targets.
///
/// A replicator holds no per-collection state and can serve any number of
/// targets. Operations on the same local collection must not run
/// concurrently; the remote lock only serializes replicas against each
/// other.
pub struct Replicator {
    config: SyncConfig,
    events: EventBus,
    stats: RwLock<SyncStats>,
}

impl Replicator {
    /// Creates a replicator.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            events: EventBus::new(),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Event bus receiving lifecycle events.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Snapshot of the statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Runs the operation matching `sync_type`.
    pub fn run(&self, target: &SyncTarget, sync_type: SyncType) -> SyncOutcome {
        match sync_type {
            SyncType::Push => self.push(target),
            SyncType::Pull => self.pull(target),
            SyncType::Both => self.merge(target),
        }
    }

    /// Applies remote changes since the cursor to the local collection.
    ///
    /// Local changes are not sent.
    pub fn pull(&self, target: &SyncTarget) -> SyncOutcome {
        self.locked(target, SyncOperation::Pull, |report| {
            let local = target.local();
            let mut attributes = local.attributes_or_default()?;

            let feed = target.remote().changed_since(attributes.last_synced)?;
            local.observe_sequence(feed.sequence_number);
            report.pulled = local.apply_change(&feed, target.originator())?;

            attributes.advance_last_synced(feed.sequence_number);
            report.cursor = Some(attributes.last_synced);
            local.set_attributes(attributes)?;
            Ok(())
        })
    }

    /// Sends local changes since the cursor to the remote.
    ///
    /// Remote changes are not fetched.
    pub fn push(&self, target: &SyncTarget) -> SyncOutcome {
        self.locked(target, SyncOperation::Push, |report| {
            let local = target.local();
            let mut attributes = local.attributes_or_default()?;

            let now = local.now();
            let feed = local
                .changed_since(attributes.last_synced, now)?
                .with_originator(target.originator())
                .with_sequence(now);
            report.pushed = feed.len();

            report.remote_mutated = target.remote().apply_change(&feed)?;
            if report.remote_mutated {
                report.pruned_removals = local.prune_removals(now)?;
            }

            attributes.advance_last_synced(now);
            report.cursor = Some(attributes.last_synced);
            local.set_attributes(attributes)?;
            Ok(())
        })
    }

    /// Exchanges changes in both directions.
    ///
    /// The remote feed is fetched first and fixes the new cursor `S`. Local
    /// changes in `(last_synced, S]` are pushed, then the remote feed is
    /// applied locally. With `ConflictPolicy::RemoteWins`, an id changed on
    /// both sides ends up with the remote version locally while the remote
    /// keeps the pushed local version. Local writes stamped after `S` are
    /// sent by the next merge.
    ///
    /// Documents this replica pushed earlier are dropped from the remote
    /// feed before conflict detection, so they are never reported as
    /// conflicts with the local copy they came from.
    pub fn merge(&self, target: &SyncTarget) -> SyncOutcome {
        self.locked(target, SyncOperation::Merge, |report| {
            let local = target.local();
            let remote = target.remote();
            let originator = target.originator();
            let mut attributes = local.attributes_or_default()?;
            let from = attributes.last_synced;

            let mut remote_feed = remote.changed_since(from)?;
            let sequence = remote_feed.sequence_number;
            // Our own pushes come back in the remote feed; they are not conflicts.
            remote_feed
                .modified
                .retain(|doc| doc.source() != Some(originator));
            local.observe_sequence(sequence);

            let mut local_feed = local
                .changed_since(from, sequence)?
                .with_originator(originator)
                .with_sequence(sequence);

            report.conflicts = self
                .config
                .conflict_policy
                .reconcile(&mut remote_feed, &mut local_feed);
            for conflict in &report.conflicts {
                tracing::warn!(
                    collection = target.collection_name(),
                    id = %conflict.id,
                    resolution = ?conflict.resolution,
                    "document changed on both sides"
                );
            }

            report.pushed = local_feed.len();
            report.remote_mutated = remote.apply_change(&local_feed)?;
            report.pulled = local.apply_change(&remote_feed, originator)?;
            if report.remote_mutated {
                report.pruned_removals = local.prune_removals(sequence)?;
            }

            attributes.advance_last_synced(sequence);
            report.cursor = Some(attributes.last_synced);
            local.set_attributes(attributes)?;
            Ok(())
        })
    }

    /// Replaces the local collection with the remote one.
    ///
    /// Pages through the remote from `offset` in pages of at most `size`
    /// until an empty page. Takes no lock, so a concurrent writer on the
    /// remote may be observed half-way. The cursor is not changed.
    pub fn reset_local_with_remote(&self, target: &SyncTarget, offset: usize, size: usize) -> SyncOutcome {
        let operation = SyncOperation::ResetLocal;
        if !target.remote().is_online() {
            return self.skip(target, operation, SyncOutcome::Offline);
        }

        let started = Instant::now();
        self.publish(target, EventType::InProgress, None);

        let mut report = SyncReport::new(operation);
        let result = (|| -> SyncResult<()> {
            let local = target.local();
            local.clear()?;

            let mut offset = offset;
            loop {
                let page = target.remote().fetch_page(offset, size)?;
                let fetched = page.len();
                if fetched == 0 {
                    break;
                }
                report.pulled += local.insert_replicated(page)?;
                // The remote may cap pages below `size`; only an empty page ends the scan.
                offset += fetched;
            }
            Ok(())
        })();
        report.duration = started.elapsed();

        self.finish(target, operation, result.map(|()| report))
    }

    /// Replaces the remote collection with one page of the local one.
    ///
    /// Only documents in `[offset, offset + size)` are sent; a `size`
    /// smaller than the collection truncates the remote copy. The cursor is
    /// not changed.
    pub fn reset_remote_with_local(&self, target: &SyncTarget, offset: usize, size: usize) -> SyncOutcome {
        self.locked(target, SyncOperation::ResetRemote, |report| {
            let remote = target.remote();
            remote.clear(target.originator())?;

            let local = target.local();
            let documents = local.find_page(offset, size)?;
            let feed = ChangeFeed::from_parts(documents, Default::default())
                .with_originator(target.originator())
                .with_sequence(local.now());
            report.pushed = feed.len();
            report.remote_mutated = remote.apply_change(&feed)?;
            Ok(())
        })
    }

    fn locked<F>(&self, target: &SyncTarget, operation: SyncOperation, body: F) -> SyncOutcome
    where
        F: FnOnce(&mut SyncReport) -> SyncResult<()>,
    {
        let remote = target.remote();
        if !remote.is_online() {
            return self.skip(target, operation, SyncOutcome::Offline);
        }

        let started = Instant::now();
        let outcome = match remote.try_acquire_lock(self.config.lock_wait, target.originator()) {
            Ok(true) => {
                tracing::debug!(
                    collection = target.collection_name(),
                    operation = operation.as_str(),
                    "sync lock acquired"
                );
                self.publish(target, EventType::InProgress, None);

                let mut report = SyncReport::new(operation);
                let result = body(&mut report);
                report.duration = started.elapsed();
                self.finish(target, operation, result.map(|()| report))
            }
            Ok(false) => self.skip(target, operation, SyncOutcome::LockUnavailable),
            Err(err) => self.finish(target, operation, Err(err)),
        };

        if let Err(err) = remote.release_lock(target.originator()) {
            tracing::warn!(
                collection = target.collection_name(),
                operation = operation.as_str(),
                "failed to release sync lock: {err}"
            );
        }
        outcome
    }

    fn skip(&self, target: &SyncTarget, operation: SyncOperation, outcome: SyncOutcome) -> SyncOutcome {
        tracing::debug!(
            collection = target.collection_name(),
            operation = operation.as_str(),
            reason = ?outcome,
            "sync skipped"
        );
        self.stats.write().operations_skipped += 1;
        outcome
    }

    fn finish(
        &self,
        target: &SyncTarget,
        operation: SyncOperation,
        result: SyncResult<SyncReport>,
    ) -> SyncOutcome {
        match result {
            Ok(report) => {
                {
                    let mut stats = self.stats.write();
                    stats.operations_completed += 1;
                    stats.documents_pulled += report.pulled as u64;
                    stats.documents_pushed += report.pushed as u64;
                    stats.conflicts_encountered += report.conflicts.len() as u64;
                    stats.last_sync_time = Some(Instant::now());
                    stats.last_error = None;
                }
                tracing::info!(
                    collection = target.collection_name(),
                    operation = operation.as_str(),
                    pulled = report.pulled,
                    pushed = report.pushed,
                    cursor = ?report.cursor,
                    "sync completed"
                );
                self.publish(target, EventType::Completed, None);
                SyncOutcome::Completed(report)
            }
            Err(err) => {
                let err = Arc::new(err);
                {
                    let mut stats = self.stats.write();
                    stats.operations_failed += 1;
                    stats.last_error = Some(err.to_string());
                }
                tracing::error!(
                    collection = target.collection_name(),
                    operation = operation.as_str(),
                    "replication error: {err}"
                );
                self.publish(target, EventType::ReplicationError, Some(Arc::clone(&err)));
                SyncOutcome::Failed(err)
            }
        }
    }

    pub(crate) fn publish(&self, target: &SyncTarget, event_type: EventType, error: Option<Arc<SyncError>>) {
        self.events.publish(SyncEvent {
            event_type,
            collection_name: target.collection_name().to_string(),
            error,
        });
    }
}

impl fmt::Debug for Replicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicator")
            .field("config", &self.config)
            .field("events", &self.events)
            .finish()
    }
}
