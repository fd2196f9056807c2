use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::errors::{MailburstError, Result};
use crate::job::{Job, WorkEvent};
use crate::notify::ChangeNotifier;
use crate::queue::WorkQueue;
use crate::store::JobStore;

/// Client-facing facade: persist-then-enqueue on create, plain pass-through
/// reads and deletes.
///
/// The facade never updates progress; the processor owns that mutation path,
/// so there is no write-write race between the two. Deleting a job with an
/// in-flight consumption is allowed: the processor observes the deletion on
/// its next progress update and stops.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    notifier: ChangeNotifier,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        notifier: ChangeNotifier,
    ) -> Self {
        JobService {
            store,
            queue,
            notifier,
        }
    }

    /// Create a `pending` job and publish its work event. A publish failure
    /// surfaces as the creation error: the caller must know the job will not
    /// be processed.
    pub async fn create_job(&self, total_emails: i32) -> Result<Job> {
        if total_emails <= 0 {
            return Err(MailburstError::InvalidTotalEmails(total_emails));
        }

        let job = self.store.create(total_emails).await?;

        self.queue
            .publish(&WorkEvent {
                job_id: *job.id(),
                total_emails,
            })
            .await?;

        self.notifier.job_created(&job);
        info!(job_id = %job.id(), total_emails, "Job created and enqueued");

        Ok(job)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        self.store.get_by_id(id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.store.list_all().await
    }

    /// Returns whether a job existed. Independent of in-flight processing;
    /// see [`crate::processor::JobProcessor::process_event`] for how the
    /// race resolves.
    pub async fn delete_job(&self, id: Uuid) -> Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            info!(job_id = %id, "Job deleted");
        }
        Ok(deleted)
    }
}
