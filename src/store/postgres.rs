use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indoc::indoc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, query_as, FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::errors::{MailburstError, Result};
use crate::job::{Job, JobStatus};

use super::{validate_total_emails, JobStore};

/// Relational job store backed by a single Postgres table.
///
/// All operations are single statements; `update_progress` folds the
/// monotonic clamp and status derivation into one atomic
/// `UPDATE ... RETURNING` so concurrent or out-of-order calls cannot
/// regress a record.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

/// `JobRow` is the job as stored in the database; the textual status is
/// parsed when converting into the domain [`Job`].
#[derive(FromRow, Debug)]
struct JobRow {
    id: Uuid,
    total_emails: i32,
    processed_emails: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let status: JobStatus = self
            .status
            .parse()
            .map_err(|e| MailburstError::Sql(sqlx::Error::Decode(Box::new(e))))?;

        Ok(Job::new(
            self.id,
            self.total_emails,
            self.processed_emails,
            status,
            self.created_at,
            self.updated_at,
        ))
    }
}

impl PgJobStore {
    /// Connect a fresh pool and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and apply the schema.
    pub async fn with_pool(pool: PgPool) -> Result<Self> {
        let store = PgJobStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let sql = indoc! {r#"
            create table if not exists mailburst_jobs (
                id uuid primary key,
                total_emails integer not null,
                processed_emails integer not null default 0,
                status text not null default 'pending',
                created_at timestamptz not null default now(),
                updated_at timestamptz not null default now()
            )
        "#};
        query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, total_emails: i32) -> Result<Job> {
        validate_total_emails(total_emails)?;

        let job = Job::fresh(total_emails);
        let sql = indoc! {r#"
            insert into mailburst_jobs
                (id, total_emails, processed_emails, status, created_at, updated_at)
                values ($1, $2, $3, $4, $5, $6)
                returning *
        "#};

        let row: JobRow = query_as(sql)
            .bind(job.id())
            .bind(job.total_emails())
            .bind(job.processed_emails())
            .bind(job.status().as_str())
            .bind(job.created_at())
            .bind(job.updated_at())
            .fetch_one(&self.pool)
            .await?;

        info!(job_id = %job.id(), total_emails, "Job persisted");

        row.into_job()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Job> {
        let row: Option<JobRow> = query_as("select * from mailburst_jobs where id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(MailburstError::JobNotFound(id))?.into_job()
    }

    async fn list_all(&self) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = query_as("select * from mailburst_jobs")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn update_progress(&self, id: Uuid, processed_emails: i32) -> Result<Job> {
        let sql = indoc! {r#"
            update mailburst_jobs
                set
                    processed_emails = greatest(processed_emails, least($2, total_emails)),
                    status = case
                        when greatest(processed_emails, least($2, total_emails)) >= total_emails
                            then 'completed'
                        else 'in-progress'
                    end,
                    updated_at = now()
                where id = $1
                returning *
        "#};

        let row: Option<JobRow> = query_as(sql)
            .bind(id)
            .bind(processed_emails)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(MailburstError::JobNotFound(id))?.into_job()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = query("delete from mailburst_jobs where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
