//! Sync command implementation.

use clap::ValueEnum;
use replidb_core::Database;
use replidb_sync_engine::{
    HttpRemote, LocalReplica, Replicator, ReqwestClient, SyncConfig, SyncOutcome, SyncReport,
    SyncTarget, UserAgent,
};
use replidb_sync_protocol::{ConflictPolicy, WireFormat};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Which replicator operation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SyncMode {
    /// Remote changes to local.
    Pull,
    /// Local changes to remote.
    Push,
    /// Both directions.
    Merge,
    /// Replace the local collection with the remote one.
    ResetLocal,
    /// Replace the remote collection with the local one.
    ResetRemote,
}

/// Options of one sync run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Gate base URL.
    pub url: String,
    /// Collection to sync.
    pub collection: String,
    /// Operation.
    pub mode: SyncMode,
    /// Basic-auth user.
    pub user: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Conflict policy name.
    pub policy: String,
    /// Use CBOR bodies.
    pub cbor: bool,
    /// First document of a reset.
    pub offset: usize,
    /// Page size of reset-local, window of reset-remote.
    pub size: Option<usize>,
    /// How long to wait for the remote lock.
    pub lock_wait: Duration,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Skip certificate validation.
    pub trust_all_certs: bool,
}

/// Printable summary of a completed run.
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    /// Operation name.
    pub operation: String,
    /// Changes applied locally.
    pub pulled: usize,
    /// Mutations sent.
    pub pushed: usize,
    /// Conflicting ids.
    pub conflicts: Vec<i64>,
    /// Cursor after the run, if moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<i64>,
    /// Elapsed milliseconds.
    pub duration_ms: u64,
}

impl From<&SyncReport> for SyncSummary {
    fn from(report: &SyncReport) -> Self {
        Self {
            operation: report.operation.to_string(),
            pulled: report.pulled,
            pushed: report.pushed,
            conflicts: report.conflicts.iter().map(|c| c.id.value()).collect(),
            cursor: report.cursor,
            duration_ms: report.duration.as_millis() as u64,
        }
    }
}

/// Builds the sync configuration from command-line options.
pub fn sync_config(options: &SyncOptions) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let policy: ConflictPolicy = options.policy.parse()?;
    let format = if options.cbor {
        WireFormat::Cbor
    } else {
        WireFormat::Json
    };
    let mut config = SyncConfig::default()
        .with_conflict_policy(policy)
        .with_wire_format(format)
        .with_lock_wait(options.lock_wait);
    if let Some(size) = options.size {
        if size == 0 {
            return Err("page size must be positive".into());
        }
        config = config.with_page_size(size);
    }
    Ok(config)
}

/// Window of a remote reset: `--size`, or the whole local collection.
pub fn reset_remote_window(options: &SyncOptions, local_len: usize) -> usize {
    options.size.unwrap_or(local_len)
}

/// Runs the sync command.
pub fn run(path: &Path, options: &SyncOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = sync_config(options)?;

    let mut client = ReqwestClient::builder()
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(config.timeout)
        .user_agent(UserAgent::new(
            "replidb-cli",
            env!("CARGO_PKG_VERSION"),
            options.collection.clone(),
        ));
    match (&options.user, &options.password) {
        (Some(user), Some(password)) => client = client.basic_auth(user, password),
        (Some(_), None) | (None, Some(_)) => {
            return Err("--user and --password must be given together".into())
        }
        (None, None) => {}
    }
    if let Some(proxy) = &options.proxy {
        client = client.proxy(proxy);
    }
    if options.trust_all_certs {
        client = client.trust_all_certs();
    }

    let db = Database::open(path)?;
    let local = Arc::new(LocalReplica::open(&db, &options.collection)?);
    let remote = Arc::new(
        HttpRemote::new(&options.url, &options.collection, client.build()?)
            .with_format(config.wire_format),
    );
    let target = SyncTarget::new(local.clone(), remote)?;
    let page_size = config.page_size;
    let replicator = Replicator::new(config);

    tracing::info!(
        collection = %options.collection,
        url = %options.url,
        mode = ?options.mode,
        "starting sync"
    );
    let outcome = match options.mode {
        SyncMode::Pull => replicator.pull(&target),
        SyncMode::Push => replicator.push(&target),
        SyncMode::Merge => replicator.merge(&target),
        SyncMode::ResetLocal => replicator.reset_local_with_remote(&target, options.offset, page_size),
        SyncMode::ResetRemote => {
            let window = reset_remote_window(options, local.collection().len());
            replicator.reset_remote_with_local(&target, options.offset, window)
        }
    };
    db.close()?;

    match outcome {
        SyncOutcome::Completed(report) => {
            let summary = SyncSummary::from(&report);
            match format {
                "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
                _ => print_text_output(&summary),
            }
            Ok(())
        }
        SyncOutcome::Offline => Err(format!("remote {} is offline", options.url).into()),
        SyncOutcome::LockUnavailable => {
            Err(format!("sync lock for {} is held by another replica", options.collection).into())
        }
        SyncOutcome::Failed(err) => Err(format!("sync failed: {err}").into()),
    }
}

fn print_text_output(summary: &SyncSummary) {
    println!("{} completed in {} ms", summary.operation, summary.duration_ms);
    println!("  pulled:    {}", summary.pulled);
    println!("  pushed:    {}", summary.pushed);
    if !summary.conflicts.is_empty() {
        println!("  conflicts: {:?}", summary.conflicts);
    }
    if let Some(cursor) = summary.cursor {
        println!("  cursor:    {cursor}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SyncOptions {
        SyncOptions {
            url: "http://127.0.0.1:1".into(),
            collection: "users".into(),
            mode: SyncMode::Merge,
            user: None,
            password: None,
            policy: "remote-wins".into(),
            cbor: false,
            offset: 0,
            size: None,
            lock_wait: Duration::from_secs(1),
            proxy: None,
            trust_all_certs: false,
        }
    }

    #[test]
    fn builds_config_from_options() {
        let mut opts = options();
        opts.policy = "lww".into();
        opts.cbor = true;
        opts.size = Some(25);
        let config = sync_config(&opts).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::LastWriteWins);
        assert_eq!(config.wire_format, WireFormat::Cbor);
        assert_eq!(config.page_size, 25);
    }

    #[test]
    fn rejects_bad_options() {
        let mut opts = options();
        opts.policy = "newest".into();
        assert!(sync_config(&opts).is_err());

        let mut opts = options();
        opts.size = Some(0);
        assert!(sync_config(&opts).is_err());
    }

    #[test]
    fn reset_remote_window_covers_local_collection_by_default() {
        let mut opts = options();
        opts.mode = SyncMode::ResetRemote;
        assert_eq!(reset_remote_window(&opts, 2_500), 2_500);

        opts.size = Some(10);
        assert_eq!(reset_remote_window(&opts, 2_500), 10);
    }

    #[test]
    fn unreachable_gate_reports_offline() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = run(&dir.path().join("db"), &options(), "text").unwrap_err();
        assert!(err.to_string().contains("offline"));
    }
}
