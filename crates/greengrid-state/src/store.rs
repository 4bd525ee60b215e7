//! JobStore: redb-backed persistence for GreenGrid.
//!
//! Provides typed CRUD over jobs plus the intensity history. All values
//! are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).
//!
//! redb admits one write transaction at a time, so [`JobStore::modify_job`]
//! gives an atomic read-modify-write on a single record without any
//! application-level lock.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Result of [`JobStore::modify_job`].
#[derive(Debug, Clone, PartialEq)]
pub enum Modified {
    /// No job with that ID exists.
    NotFound,
    /// The closure declined to write; the job is returned as read.
    Unchanged(Job),
    /// The closure's changes were committed; the job is returned as written.
    Written(Job),
}

/// Thread-safe job store backed by redb.
#[derive(Clone)]
pub struct JobStore {
    db: Arc<Database>,
}

impl JobStore {
    /// Open (or create) a persistent job store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "job store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory job store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory job store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(JOBS).map_err(map_err!(Table))?;
        txn.open_table(JOBS_BY_CREATED).map_err(map_err!(Table))?;
        txn.open_table(INTENSITY_SAMPLES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Jobs ───────────────────────────────────────────────────────

    /// Insert a new job. Fails if a job with the same ID already exists.
    pub fn create_job(&self, job: &Job) -> StateResult<()> {
        let value = serde_json::to_vec(job).map_err(map_err!(Serialize))?;
        let index_key = job.index_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut jobs = txn.open_table(JOBS).map_err(map_err!(Table))?;
            if jobs.get(job.id.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::AlreadyExists(job.id.clone()));
            }
            jobs.insert(job.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let mut index = txn.open_table(JOBS_BY_CREATED).map_err(map_err!(Table))?;
            index
                .insert(index_key.as_str(), job.id.as_str())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(job_id = %job.id, "job created");
        Ok(())
    }

    /// Get a job by ID.
    pub fn get_job(&self, id: &str) -> StateResult<Option<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let job: Job =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Overwrite an existing job. Returns false if it does not exist.
    ///
    /// Prefer [`JobStore::modify_job`] for anything that depends on the
    /// record's current state.
    pub fn update_job(&self, job: &Job) -> StateResult<bool> {
        let value = serde_json::to_vec(job).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            existed = table.get(job.id.as_str()).map_err(map_err!(Read))?.is_some();
            if existed {
                table
                    .insert(job.id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        if existed {
            txn.commit().map_err(map_err!(Transaction))?;
        } else {
            txn.abort().map_err(map_err!(Transaction))?;
        }
        Ok(existed)
    }

    /// Atomically read, mutate and write back a single job.
    ///
    /// `f` returns whether its changes should be committed. It must not
    /// change `id` or `created_at`.
    pub fn modify_job<F>(&self, id: &str, f: F) -> StateResult<Modified>
    where
        F: FnOnce(&mut Job) -> bool,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            let current = table
                .get(id)
                .map_err(map_err!(Read))?
                .map(|guard| guard.value().to_vec());
            match current {
                None => Modified::NotFound,
                Some(bytes) => {
                    let mut job: Job =
                        serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
                    if f(&mut job) {
                        let value = serde_json::to_vec(&job).map_err(map_err!(Serialize))?;
                        table.insert(id, value.as_slice()).map_err(map_err!(Write))?;
                        Modified::Written(job)
                    } else {
                        Modified::Unchanged(job)
                    }
                }
            }
        };
        match outcome {
            Modified::Written(_) => txn.commit().map_err(map_err!(Transaction))?,
            _ => txn.abort().map_err(map_err!(Transaction))?,
        }
        Ok(outcome)
    }

    /// Move a job to `Stopped` and stamp its completion time.
    ///
    /// Stopping an already-stopped job leaves it untouched. Returns `None`
    /// if the job does not exist.
    pub fn stop_job(&self, id: &str, now: DateTime<Utc>) -> StateResult<Option<Job>> {
        let outcome = self.modify_job(id, |job| {
            if job.status == JobStatus::Stopped {
                return false;
            }
            job.status = JobStatus::Stopped;
            job.completed_at = Some(now);
            true
        })?;
        Ok(match outcome {
            Modified::NotFound => None,
            Modified::Unchanged(job) => Some(job),
            Modified::Written(job) => {
                debug!(job_id = %job.id, "job stopped");
                Some(job)
            }
        })
    }

    /// Delete a job by ID. Returns true if it existed.
    pub fn delete_job(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut jobs = txn.open_table(JOBS).map_err(map_err!(Table))?;
            let removed = jobs
                .remove(id)
                .map_err(map_err!(Write))?
                .map(|guard| guard.value().to_vec());
            existed = removed.is_some();
            if let Some(bytes) = removed {
                let job: Job = serde_json::from_slice(&bytes).map_err(map_err!(Deserialize))?;
                let mut index = txn.open_table(JOBS_BY_CREATED).map_err(map_err!(Table))?;
                index
                    .remove(job.index_key().as_str())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(job_id = %id, existed, "job deleted");
        Ok(existed)
    }

    /// List jobs newest first, skipping `offset` and returning at most `limit`.
    pub fn list_jobs(&self, offset: usize, limit: usize) -> StateResult<Vec<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(JOBS_BY_CREATED).map_err(map_err!(Table))?;
        let jobs = txn.open_table(JOBS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in index.iter().map_err(map_err!(Read))?.rev().skip(offset).take(limit) {
            let (_, id) = entry.map_err(map_err!(Read))?;
            // Index and record are written in one transaction, so a miss
            // here means the record is gone; skip it.
            if let Some(guard) = jobs.get(id.value()).map_err(map_err!(Read))? {
                let job: Job =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                results.push(job);
            }
        }
        Ok(results)
    }

    /// List every job, in no particular order.
    pub fn all_jobs(&self) -> StateResult<Vec<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let job: Job = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(job);
        }
        Ok(results)
    }

    /// List jobs whose status is one of `statuses`.
    pub fn list_jobs_with_status(&self, statuses: &[JobStatus]) -> StateResult<Vec<Job>> {
        Ok(self
            .all_jobs()?
            .into_iter()
            .filter(|job| statuses.contains(&job.status))
            .collect())
    }

    // ── Intensity history ──────────────────────────────────────────

    /// Insert an intensity sample.
    pub fn put_intensity_sample(&self, sample: &IntensitySample) -> StateResult<()> {
        let key = sample.table_key();
        let value = serde_json::to_vec(sample).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INTENSITY_SAMPLES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// The most recent `limit` samples, oldest first.
    pub fn recent_intensity_samples(&self, limit: usize) -> StateResult<Vec<IntensitySample>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INTENSITY_SAMPLES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev().take(limit) {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let sample: IntensitySample =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(sample);
        }
        results.reverse();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greengrid_core::RegionReading;

    fn test_job(name: &str, created_secs: i64) -> Job {
        let mut job = Job::new(name, "CAISO_NORTH", 1.0, Priority::Low);
        job.created_at = DateTime::from_timestamp(created_secs, 0).unwrap();
        job
    }

    fn test_sample(secs: i64, average: f64) -> IntensitySample {
        IntensitySample {
            taken_at: DateTime::from_timestamp(secs, 0).unwrap(),
            average,
            readings: vec![RegionReading {
                region: "NO1".to_string(),
                intensity: average,
            }],
        }
    }

    // ── Job CRUD ───────────────────────────────────────────────────

    #[test]
    fn job_create_and_get() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job("etl", 1000);

        store.create_job(&job).unwrap();
        let retrieved = store.get_job(&job.id).unwrap();

        assert_eq!(retrieved, Some(job));
    }

    #[test]
    fn job_get_nonexistent_returns_none() {
        let store = JobStore::open_in_memory().unwrap();
        assert!(store.get_job("nope").unwrap().is_none());
    }

    #[test]
    fn job_create_duplicate_is_rejected() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job("etl", 1000);
        store.create_job(&job).unwrap();

        assert!(matches!(
            store.create_job(&job),
            Err(StateError::AlreadyExists(_))
        ));
    }

    #[test]
    fn job_update_in_place() {
        let store = JobStore::open_in_memory().unwrap();
        let mut job = test_job("etl", 1000);
        store.create_job(&job).unwrap();

        job.status = JobStatus::Running;
        job.execution_region = Some("NO1".to_string());
        assert!(store.update_job(&job).unwrap());

        let retrieved = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(retrieved.status, JobStatus::Running);
        assert_eq!(retrieved.execution_region.as_deref(), Some("NO1"));
    }

    #[test]
    fn job_update_missing_returns_false() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job("ghost", 1000);
        assert!(!store.update_job(&job).unwrap());
        assert!(store.get_job(&job.id).unwrap().is_none());
    }

    #[test]
    fn job_delete() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job("etl", 1000);
        store.create_job(&job).unwrap();

        assert!(store.delete_job(&job.id).unwrap());
        assert!(!store.delete_job(&job.id).unwrap());
        assert!(store.get_job(&job.id).unwrap().is_none());
        assert!(store.list_jobs(0, 50).unwrap().is_empty());
    }

    // ── Listing ────────────────────────────────────────────────────

    #[test]
    fn list_jobs_newest_first_with_pagination() {
        let store = JobStore::open_in_memory().unwrap();
        for (name, secs) in [("a", 1000), ("c", 3000), ("b", 2000), ("d", 4000)] {
            store.create_job(&test_job(name, secs)).unwrap();
        }

        let names = |jobs: Vec<Job>| jobs.into_iter().map(|j| j.name).collect::<Vec<_>>();

        assert_eq!(names(store.list_jobs(0, 50).unwrap()), vec!["d", "c", "b", "a"]);
        assert_eq!(names(store.list_jobs(1, 2).unwrap()), vec!["c", "b"]);
        assert!(store.list_jobs(10, 5).unwrap().is_empty());
    }

    #[test]
    fn list_jobs_with_status_filters() {
        let store = JobStore::open_in_memory().unwrap();
        let mut running = test_job("run", 1000);
        running.status = JobStatus::Running;
        let mut delayed = test_job("wait", 2000);
        delayed.status = JobStatus::Delayed;
        store.create_job(&running).unwrap();
        store.create_job(&delayed).unwrap();
        store.create_job(&test_job("new", 3000)).unwrap();

        let active = store
            .list_jobs_with_status(&[JobStatus::Pending, JobStatus::Delayed])
            .unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|j| j.status != JobStatus::Running));
        assert_eq!(store.all_jobs().unwrap().len(), 3);
    }

    // ── Read-modify-write ──────────────────────────────────────────

    #[test]
    fn modify_job_commits_when_closure_accepts() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job("etl", 1000);
        store.create_job(&job).unwrap();

        let outcome = store
            .modify_job(&job.id, |j| {
                j.carbon_saved += 42.0;
                true
            })
            .unwrap();

        assert!(matches!(outcome, Modified::Written(ref j) if j.carbon_saved == 42.0));
        assert_eq!(store.get_job(&job.id).unwrap().unwrap().carbon_saved, 42.0);
    }

    #[test]
    fn modify_job_discards_when_closure_declines() {
        let store = JobStore::open_in_memory().unwrap();
        let job = test_job("etl", 1000);
        store.create_job(&job).unwrap();

        let outcome = store
            .modify_job(&job.id, |j| {
                j.carbon_saved = 99.0;
                false
            })
            .unwrap();

        assert!(matches!(outcome, Modified::Unchanged(_)));
        assert_eq!(store.get_job(&job.id).unwrap().unwrap().carbon_saved, 0.0);
    }

    #[test]
    fn modify_missing_job_is_not_found() {
        let store = JobStore::open_in_memory().unwrap();
        let outcome = store.modify_job("missing", |_| true).unwrap();
        assert_eq!(outcome, Modified::NotFound);
    }

    #[test]
    fn stop_sets_completion_once() {
        let store = JobStore::open_in_memory().unwrap();
        let mut job = test_job("etl", 1000);
        job.status = JobStatus::Running;
        store.create_job(&job).unwrap();

        let first = DateTime::from_timestamp(5000, 0).unwrap();
        let second = DateTime::from_timestamp(6000, 0).unwrap();

        let stopped = store.stop_job(&job.id, first).unwrap().unwrap();
        assert_eq!(stopped.status, JobStatus::Stopped);
        assert_eq!(stopped.completed_at, Some(first));

        let again = store.stop_job(&job.id, second).unwrap().unwrap();
        assert_eq!(again.completed_at, Some(first));

        assert!(store.stop_job("missing", second).unwrap().is_none());
    }

    // ── Intensity history ──────────────────────────────────────────

    #[test]
    fn recent_samples_are_oldest_first() {
        let store = JobStore::open_in_memory().unwrap();
        for (secs, avg) in [(1000, 10.0), (2000, 20.0), (3000, 30.0)] {
            store.put_intensity_sample(&test_sample(secs, avg)).unwrap();
        }

        let recent = store.recent_intensity_samples(2).unwrap();
        let averages: Vec<f64> = recent.iter().map(|s| s.average).collect();
        assert_eq!(averages, vec![20.0, 30.0]);

        assert_eq!(store.recent_intensity_samples(10).unwrap().len(), 3);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");
        let job = test_job("durable", 1000);

        {
            let store = JobStore::open(&db_path).unwrap();
            store.create_job(&job).unwrap();
        }

        let store = JobStore::open(&db_path).unwrap();
        let retrieved = store.get_job(&job.id).unwrap();
        assert_eq!(retrieved.map(|j| j.name), Some("durable".to_string()));
        assert_eq!(store.list_jobs(0, 10).unwrap().len(), 1);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = JobStore::open_in_memory().unwrap();

        assert!(store.list_jobs(0, 50).unwrap().is_empty());
        assert!(store.all_jobs().unwrap().is_empty());
        assert!(store.recent_intensity_samples(48).unwrap().is_empty());
        assert!(!store.delete_job("nope").unwrap());
    }
}
