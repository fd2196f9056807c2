//! Durable CRUD and atomic progress updates over [`Job`] records.
//!
//! Two interchangeable production backends implement the same contract, a
//! relational table on Postgres and a document layout on redis, plus an
//! in-process backend for tests and local development. Callers hold an
//! `Arc<dyn JobStore>` and never know which backend is active.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{MailburstError, Result};
use crate::job::Job;

mod memory;
mod postgres;
mod redis;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;
pub use redis::RedisJobStore;

/// Storage contract for job records.
///
/// `update_progress` is the single mutation path used by the processor. It
/// clamps the requested count to `[stored, total]` so stale or duplicated
/// deliveries can never lower progress or regress a `completed` status, and
/// derives the status from the clamped value.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new `pending` job. Fails with
    /// [`MailburstError::InvalidTotalEmails`] unless `total_emails > 0`.
    async fn create(&self, total_emails: i32) -> Result<Job>;

    /// Fetch one job, [`MailburstError::JobNotFound`] if absent.
    async fn get_by_id(&self, id: Uuid) -> Result<Job>;

    /// All jobs, in no particular order.
    async fn list_all(&self) -> Result<Vec<Job>>;

    /// Apply a progress value and derive the status. Idempotent and
    /// monotonic: re-applying an equal or smaller value leaves the record
    /// unchanged apart from `updated_at`.
    async fn update_progress(&self, id: Uuid, processed_emails: i32) -> Result<Job>;

    /// Remove a job. Returns whether a record existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

pub(crate) fn validate_total_emails(total_emails: i32) -> Result<()> {
    if total_emails <= 0 {
        return Err(MailburstError::InvalidTotalEmails(total_emails));
    }
    Ok(())
}
