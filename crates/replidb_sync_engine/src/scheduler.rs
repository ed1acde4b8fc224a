//! Periodic background sync.

use crate::error::SyncResult;
use crate::event::EventType;
use crate::replicator::{Replicator, SyncOutcome, SyncTarget, SyncType};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Signal {
    stopped: bool,
    triggered: bool,
}

#[derive(Debug, Default)]
struct Control {
    signal: Mutex<Signal>,
    wake: Condvar,
}

impl Control {
    /// Sleeps until `deadline`, a trigger or a stop. Returns false on stop.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut signal = self.signal.lock();
        while !signal.stopped && !signal.triggered {
            if self.wake.wait_until(&mut signal, deadline).timed_out() {
                break;
            }
        }
        signal.triggered = false;
        !signal.stopped
    }
}

/// Runs a sync on one target at a fixed interval on a background thread.
///
/// A `STARTED` event is published when the worker starts. After a failed
/// operation the next attempt follows the retry backoff instead of the
/// interval; once `max_attempts` consecutive failures are reached the
/// worker falls back to the regular interval. Dropping the scheduler stops
/// the worker.
pub struct SyncScheduler {
    control: Arc<Control>,
    handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Starts the worker. The first sync runs immediately.
    pub fn start(replicator: Arc<Replicator>, target: SyncTarget, sync_type: SyncType) -> SyncResult<Self> {
        let control = Arc::new(Control::default());
        let worker_control = Arc::clone(&control);
        let name = format!("replidb-sync-{}", target.collection_name());

        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || run_worker(&replicator, &target, sync_type, &worker_control))?;

        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Runs the next sync now instead of waiting for the interval.
    pub fn trigger(&self) {
        self.control.signal.lock().triggered = true;
        self.control.wake.notify_all();
    }

    /// Returns true until `stop` is called or the worker exits.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker and waits for the current operation to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.control.signal.lock().stopped = true;
        self.control.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("sync worker panicked");
            }
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(replicator: &Replicator, target: &SyncTarget, sync_type: SyncType, control: &Control) {
    let config = replicator.config();
    replicator.publish(target, EventType::Started, None);
    tracing::info!(
        collection = target.collection_name(),
        interval_ms = config.sync_interval.as_millis() as u64,
        "sync scheduler started"
    );

    let mut failures = 0u32;
    loop {
        let delay = match replicator.run(target, sync_type) {
            SyncOutcome::Failed(_) if failures < config.retry.max_attempts => {
                let delay = config.retry.delay_for_attempt(failures);
                failures += 1;
                tracing::debug!(
                    collection = target.collection_name(),
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    "retrying failed sync"
                );
                delay
            }
            _ => {
                failures = 0;
                config.sync_interval
            }
        };

        if !control.wait_until(Instant::now() + delay) {
            break;
        }
    }

    tracing::info!(collection = target.collection_name(), "sync scheduler stopped");
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("running", &self.is_running())
            .finish()
    }
}
