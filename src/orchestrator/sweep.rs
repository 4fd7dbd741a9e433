//! Expiry of jobs and published exports.

use super::store::JobStore;
use crate::config::ExportConfig;
use crate::error::Result;
use crate::pipeline::{ExportMeta, META_FILE, STAGING_PREFIX};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub jobs_removed: usize,
    pub dirs_removed: usize,
}

/// Delete export directories under `root` that have expired at `now`.
///
/// A directory with a metadata sidecar expires at its `expiresAt`; one
/// without (a staging directory or a foreign leftover) once it has not been
/// modified for `orphan_ttl`. Staging directories whose job id satisfies
/// `is_active` are never removed.
pub fn sweep_exports(
    root: &Path,
    now: DateTime<Utc>,
    orphan_ttl: Duration,
    is_active: &dyn Fn(&str) -> bool,
) -> Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(job_id) = name.to_str().and_then(|n| n.strip_prefix(STAGING_PREFIX)) {
            if is_active(job_id) {
                continue;
            }
        }

        let expired = match read_meta(&path) {
            Some(meta) => now.timestamp_millis() > meta.expires_at,
            None => {
                let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
                chrono::Duration::from_std(orphan_ttl)
                    .map(|ttl| now - modified > ttl)
                    .unwrap_or(false)
            }
        };
        if !expired {
            continue;
        }

        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::debug!(dir = %path.display(), "expired export removed");
                removed += 1;
            }
            Err(e) => tracing::warn!(dir = %path.display(), error = %e, "failed to remove expired export"),
        }
    }
    Ok(removed)
}

fn read_meta(dir: &Path) -> Option<ExportMeta> {
    let text = std::fs::read(dir.join(META_FILE)).ok()?;
    match serde_json::from_slice(&text) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "unreadable export metadata");
            None
        }
    }
}

/// One full cleanup pass over jobs and export directories.
pub fn sweep_once(config: &ExportConfig, store: &dyn JobStore) -> SweepReport {
    let now = Utc::now();
    let jobs_removed = store.remove_expired(now, config.completed_job_ttl(), config.failed_job_ttl());
    let is_active = |id: &str| store.get(id).is_some_and(|job| job.status.is_pending());
    let dirs_removed = match sweep_exports(&config.export_root, now, config.orphan_dir_ttl(), &is_active) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(root = %config.export_root.display(), error = %e, "export sweep failed");
            0
        }
    };
    SweepReport {
        jobs_removed,
        dirs_removed,
    }
}

/// Run [`sweep_once`] every `sweep_interval` until the task is aborted.
pub fn spawn_sweeper(config: ExportConfig, store: Arc<dyn JobStore>) -> JoinHandle<()> {
    let period = config.sweep_interval();
    tracing::info!(interval_secs = period.as_secs(), "export sweeper started");

    tokio::spawn(async move {
        let config = Arc::new(config);
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let config = Arc::clone(&config);
            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || sweep_once(&config, store.as_ref())).await {
                Ok(report) if report != SweepReport::default() => {
                    tracing::info!(jobs = report.jobs_removed, dirs = report.dirs_removed, "sweep finished");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "sweep task failed"),
            }
        }
    })
}
