//! Job bookkeeping.

use super::job::ExportJob;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of [`JobStore::insert_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// The job was stored.
    Inserted,
    /// A pending job with this id already owns the input key.
    Existing(String),
}

/// Shared job state.
///
/// The duplicate check and the insert of [`insert_if_absent`](JobStore::insert_if_absent)
/// happen in one critical section.
pub trait JobStore: Send + Sync {
    fn insert_if_absent(&self, job: ExportJob) -> Insertion;

    fn get(&self, id: &str) -> Option<ExportJob>;

    /// Apply `f` to a stored job. Returns `false` when the id is unknown.
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut ExportJob)) -> bool;

    /// Drop finished jobs past their retention. Returns how many were removed.
    fn remove_expired(&self, now: DateTime<Utc>, completed_ttl: Duration, failed_ttl: Duration) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct Jobs {
    by_id: HashMap<String, ExportJob>,
    /// Input key to the id of its pending job.
    pending: HashMap<String, String>,
}

/// In-process job store.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<Jobs>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn insert_if_absent(&self, job: ExportJob) -> Insertion {
        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.pending.get(&job.input_key) {
            return Insertion::Existing(existing.clone());
        }
        if job.status.is_pending() {
            jobs.pending.insert(job.input_key.clone(), job.id.clone());
        }
        jobs.by_id.insert(job.id.clone(), job);
        Insertion::Inserted
    }

    fn get(&self, id: &str) -> Option<ExportJob> {
        self.jobs.lock().by_id.get(id).cloned()
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut ExportJob)) -> bool {
        let mut guard = self.jobs.lock();
        let jobs = &mut *guard;
        let Some(job) = jobs.by_id.get_mut(id) else {
            return false;
        };
        f(job);
        if job.status.is_finished() && jobs.pending.get(&job.input_key).map(String::as_str) == Some(id) {
            jobs.pending.remove(&job.input_key);
        }
        true
    }

    fn remove_expired(&self, now: DateTime<Utc>, completed_ttl: Duration, failed_ttl: Duration) -> usize {
        let mut jobs = self.jobs.lock();
        let before = jobs.by_id.len();
        jobs.by_id
            .retain(|_, job| !job.is_expired(now, completed_ttl, failed_ttl));
        before - jobs.by_id.len()
    }

    fn len(&self) -> usize {
        self.jobs.lock().by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::job::JobStatus;
    use crate::pipeline::ExportRequest;
    use std::sync::Arc;

    fn job(id: &str, key: &str) -> ExportJob {
        ExportJob::new(id, &ExportRequest::new(key))
    }

    #[test]
    fn test_duplicate_pending_key_returns_existing() {
        let store = MemoryJobStore::new();
        assert_eq!(store.insert_if_absent(job("a", "scene")), Insertion::Inserted);
        assert_eq!(
            store.insert_if_absent(job("b", "scene")),
            Insertion::Existing("a".to_string())
        );
        assert_eq!(store.insert_if_absent(job("c", "other")), Insertion::Inserted);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_finished_job_releases_key() {
        let store = MemoryJobStore::new();
        store.insert_if_absent(job("a", "scene"));
        assert!(store.update("a", &mut |j| {
            j.start();
            j.fail("boom");
        }));
        assert_eq!(store.get("a").unwrap().status, JobStatus::Failed);
        assert_eq!(store.insert_if_absent(job("b", "scene")), Insertion::Inserted);
        assert!(!store.update("missing", &mut |_| {}));
    }

    #[test]
    fn test_concurrent_inserts_keep_one_job() {
        let store = Arc::new(MemoryJobStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.insert_if_absent(job(&format!("j{}", i), "scene")))
            })
            .collect();
        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| *r == Insertion::Inserted)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_expired() {
        let store = MemoryJobStore::new();
        store.insert_if_absent(job("done", "a"));
        store.insert_if_absent(job("running", "b"));
        store.update("done", &mut |j| {
            j.start();
            j.fail("boom");
        });
        store.update("running", &mut |j| {
            j.start();
        });

        let later = Utc::now() + chrono::Duration::hours(2);
        let removed = store.remove_expired(later, Duration::from_secs(3600), Duration::from_secs(1800));
        assert_eq!(removed, 1);
        assert!(store.get("done").is_none());
        assert!(store.get("running").is_some());
    }
}
