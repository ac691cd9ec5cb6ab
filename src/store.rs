//! In-memory job store.
//!
//! Jobs live only for the lifetime of the process; callers poll snapshots
//! through [`JobStorePort`]. A persistent store would slot in behind the same
//! trait.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::JobState;
use crate::ports::JobStorePort;

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, JobState>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStorePort for InMemoryJobStore {
    fn create(&self, job: JobState) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.job_id.clone(), job);
    }

    fn get(&self, job_id: &str) -> Option<JobState> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.get(job_id).cloned()
    }

    fn update(&self, job: JobState) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.job_id.clone(), job);
    }
}
