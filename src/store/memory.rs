use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::errors::{MailburstError, Result};
use crate::job::{Job, JobStatus};

use super::{validate_total_emails, JobStore};

/// In-process job store for tests and local development.
///
/// Semantics match the durable backends, including the monotonic clamp in
/// `update_progress`.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, total_emails: i32) -> Result<Job> {
        validate_total_emails(total_emails)?;

        let job = Job::fresh(total_emails);
        self.jobs
            .lock()
            .expect("job store mutex poisoned")
            .insert(*job.id(), job.clone());
        Ok(job)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Job> {
        self.jobs
            .lock()
            .expect("job store mutex poisoned")
            .get(&id)
            .cloned()
            .ok_or(MailburstError::JobNotFound(id))
    }

    async fn list_all(&self) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .lock()
            .expect("job store mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn update_progress(&self, id: Uuid, processed_emails: i32) -> Result<Job> {
        let mut jobs = self.jobs.lock().expect("job store mutex poisoned");
        let job = jobs.get(&id).ok_or(MailburstError::JobNotFound(id))?;

        let clamped = processed_emails
            .min(*job.total_emails())
            .max(*job.processed_emails());
        let status = if clamped >= *job.total_emails() {
            JobStatus::Completed
        } else {
            JobStatus::InProgress
        };

        let updated = Job::new(
            id,
            *job.total_emails(),
            clamped,
            status,
            *job.created_at(),
            Utc::now(),
        );
        jobs.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .jobs
            .lock()
            .expect("job store mutex poisoned")
            .remove(&id)
            .is_some())
    }
}
