use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{JobError, Result};
use crate::jobs::types::{JobId, JobRecord, JobSnapshot, JobStatus};

type Entry = Arc<Mutex<JobRecord>>;

/// Concurrency-safe store of job records
///
/// The map lock is held only to find or insert an entry; each record has its
/// own lock, so a runner updating one job never blocks pollers of another.
/// Readers always receive a whole cloned record.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Entry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: JobId) -> Result<Entry> {
        self.jobs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| JobError::NotFound { id: id.to_string() }.into())
    }

    /// Insert a new record; an id can only be registered once
    pub fn create(&self, record: JobRecord) -> Result<JobSnapshot> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&record.id) {
            return Err(JobError::AlreadyExists { id: record.id.to_string() }.into());
        }
        let snapshot = record.snapshot();
        jobs.insert(record.id, Arc::new(Mutex::new(record)));
        Ok(snapshot)
    }

    pub fn get(&self, id: JobId) -> Result<JobSnapshot> {
        Ok(self.entry(id)?.lock().snapshot())
    }

    /// Full copy of the record, including parameters and paths
    pub fn record(&self, id: JobId) -> Result<JobRecord> {
        Ok(self.entry(id)?.lock().clone())
    }

    /// Move a job to `status`, optionally setting progress and error text
    ///
    /// Fails with [`JobError::TerminalState`] once the job is Completed or Failed.
    pub fn update_status(
        &self,
        id: JobId,
        status: JobStatus,
        progress: Option<u8>,
        error: Option<String>,
    ) -> Result<JobSnapshot> {
        self.modify(id, |record| {
            let now = Utc::now();
            record.status = status;
            if let Some(progress) = progress {
                record.progress = progress.min(100);
            }
            record.error = if status == JobStatus::Failed { error } else { None };
            if status == JobStatus::Processing && record.started_at.is_none() {
                record.started_at = Some(now);
            }
            if status.is_terminal() {
                record.finished_at = Some(now);
            }
        })
    }

    /// Record a successful run
    pub fn complete(&self, id: JobId, frames_written: u64) -> Result<JobSnapshot> {
        self.modify(id, |record| {
            let now = Utc::now();
            record.status = JobStatus::Completed;
            record.progress = 100;
            record.error = None;
            record.frames_written = Some(frames_written);
            record.finished_at = Some(now);
        })
    }

    pub fn fail(&self, id: JobId, error: String) -> Result<JobSnapshot> {
        self.update_status(id, JobStatus::Failed, None, Some(error))
    }

    /// Set progress; returns false when the value is unchanged and nothing was written
    pub fn update_progress(&self, id: JobId, progress: u8) -> Result<bool> {
        let entry = self.entry(id)?;
        let mut record = entry.lock();
        if record.status.is_terminal() {
            return Err(JobError::TerminalState {
                id: id.to_string(),
                status: record.status.to_string(),
            }
            .into());
        }

        let progress = progress.min(100);
        if record.progress == progress {
            return Ok(false);
        }
        record.progress = progress;
        record.updated_at = Utc::now();
        Ok(true)
    }

    fn modify<F>(&self, id: JobId, apply: F) -> Result<JobSnapshot>
    where
        F: FnOnce(&mut JobRecord),
    {
        let entry = self.entry(id)?;
        let mut record = entry.lock();
        if record.status.is_terminal() {
            return Err(JobError::TerminalState {
                id: id.to_string(),
                status: record.status.to_string(),
            }
            .into());
        }

        apply(&mut record);
        record.updated_at = Utc::now();
        debug!("Job {} -> {} ({}%)", id, record.status, record.progress);
        Ok(record.snapshot())
    }

    /// Remove a record and hand it back
    pub fn delete(&self, id: JobId) -> Result<JobRecord> {
        let entry = self
            .jobs
            .write()
            .remove(&id)
            .ok_or_else(|| JobError::NotFound { id: id.to_string() })?;
        let record = entry.lock().clone();
        Ok(record)
    }

    pub fn list(&self) -> Vec<JobSnapshot> {
        let entries: Vec<Entry> = self.jobs.read().values().cloned().collect();
        entries.iter().map(|entry| entry.lock().snapshot()).collect()
    }

    /// Terminal jobs that finished at least `retention` ago
    pub fn expired(&self, retention: Duration) -> Vec<JobId> {
        let now = Utc::now();
        let entries: Vec<Entry> = self.jobs.read().values().cloned().collect();
        entries
            .iter()
            .filter_map(|entry| {
                let record = entry.lock();
                let finished = record.finished_at.filter(|_| record.status.is_terminal())?;
                let age = now.signed_duration_since(finished).to_std().ok()?;
                (age >= retention).then_some(record.id)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::jobs::params::{TransformParams, TransformRequest};

    fn record() -> JobRecord {
        let params = TransformParams::from_request(&TransformRequest::default()).unwrap();
        JobRecord::new(JobId::new(), params, "in.mp4".into(), "out.mp4".into())
    }

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let record = record();
        let id = record.id;
        registry.create(record).unwrap();

        let snapshot = registry.get(id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = JobRegistry::new();
        let record = record();
        registry.create(record.clone()).unwrap();
        assert!(matches!(
            registry.create(record),
            Err(EngineError::Job(JobError::AlreadyExists { .. }))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_id_not_found() {
        let registry = JobRegistry::new();
        assert!(matches!(registry.get(JobId::new()), Err(EngineError::Job(JobError::NotFound { .. }))));
        assert!(registry.delete(JobId::new()).is_err());
    }

    #[test]
    fn test_lifecycle_and_terminal_lock() {
        let registry = JobRegistry::new();
        let record = record();
        let id = record.id;
        registry.create(record).unwrap();

        let processing = registry.update_status(id, JobStatus::Processing, Some(0), None).unwrap();
        assert!(registry.record(id).unwrap().started_at.is_some());
        assert_eq!(processing.status, JobStatus::Processing);

        assert!(registry.update_progress(id, 40).unwrap());
        assert!(!registry.update_progress(id, 40).unwrap());

        let failed = registry.fail(id, "decoder crashed".to_string()).unwrap();
        assert_eq!(failed.error.as_deref(), Some("decoder crashed"));
        assert!(failed.finished_at.is_some());

        // Terminal state and fields never regress
        assert!(registry.update_status(id, JobStatus::Processing, None, None).is_err());
        assert!(registry.complete(id, 10).is_err());
        assert!(registry.update_progress(id, 90).is_err());
        let again = registry.get(id).unwrap();
        assert_eq!(again.status, JobStatus::Failed);
        assert_eq!(again.error, failed.error);
        assert_eq!(again.progress, 40);
    }

    #[test]
    fn test_complete_sets_progress_and_frames() {
        let registry = JobRegistry::new();
        let record = record();
        let id = record.id;
        registry.create(record).unwrap();
        registry.update_status(id, JobStatus::Processing, None, None).unwrap();

        let done = registry.complete(id, 150).unwrap();
        assert_eq!(done.progress, 100);
        assert_eq!(done.frames_written, Some(150));
        assert_eq!(done.output_path, Some("out.mp4".into()));
    }

    #[test]
    fn test_expired_only_returns_finished_jobs() {
        let registry = JobRegistry::new();
        let running = record();
        let finished = record();
        let (running_id, finished_id) = (running.id, finished.id);
        registry.create(running).unwrap();
        registry.create(finished).unwrap();
        registry.fail(finished_id, "boom".to_string()).unwrap();

        assert_eq!(registry.expired(Duration::ZERO), vec![finished_id]);
        assert!(registry.expired(Duration::from_secs(3600)).is_empty());
        assert!(!registry.expired(Duration::ZERO).contains(&running_id));
    }

    #[test]
    fn test_concurrent_updates_and_reads() {
        let registry = Arc::new(JobRegistry::new());
        let ids: Vec<JobId> = (0..8)
            .map(|_| {
                let record = record();
                let id = record.id;
                registry.create(record).unwrap();
                registry.update_status(id, JobStatus::Processing, None, None).unwrap();
                id
            })
            .collect();

        std::thread::scope(|scope| {
            for &id in &ids {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    for progress in 0..=100u8 {
                        registry.update_progress(id, progress).unwrap();
                    }
                    registry.complete(id, 100).unwrap();
                });
            }
            for _ in 0..4 {
                let registry = Arc::clone(&registry);
                let ids = ids.clone();
                scope.spawn(move || {
                    for _ in 0..200 {
                        for &id in &ids {
                            let snapshot = registry.get(id).unwrap();
                            // A reader never sees Completed without its final fields
                            if snapshot.status == JobStatus::Completed {
                                assert_eq!(snapshot.progress, 100);
                                assert_eq!(snapshot.frames_written, Some(100));
                            }
                        }
                    }
                });
            }
        });

        assert!(registry.list().iter().all(|s| s.status == JobStatus::Completed));
    }
}
