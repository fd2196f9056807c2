//! Exercises the relational backend against a live database.
//!
//! Run with a provisioned `DATABASE_URL`:
//! `cargo test --test postgres_store -- --ignored`

use mailburst::store::JobStore;
use mailburst::{JobStatus, MailburstError, PgJobStore};
use uuid::Uuid;

async fn connect() -> PgJobStore {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgJobStore::connect(&database_url)
        .await
        .expect("Failed to connect to postgres")
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn create_get_and_delete_round_trip() {
    let store = connect().await;

    let job = store.create(250).await.expect("Failed to create job");
    assert_eq!(*job.status(), JobStatus::Pending);
    assert_eq!(*job.processed_emails(), 0);

    let fetched = store.get_by_id(*job.id()).await.unwrap();
    assert_eq!(fetched, job);

    let all = store.list_all().await.unwrap();
    assert!(all.iter().any(|j| j.id() == job.id()));

    assert!(store.delete(*job.id()).await.unwrap());
    assert!(!store.delete(*job.id()).await.unwrap());
    assert!(matches!(
        store.get_by_id(*job.id()).await.unwrap_err(),
        MailburstError::JobNotFound(_)
    ));
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn update_progress_is_atomic_monotonic_and_capped() {
    let store = connect().await;
    let job = store.create(250).await.unwrap();
    let id = *job.id();

    let job = store.update_progress(id, 100).await.unwrap();
    assert_eq!(*job.status(), JobStatus::InProgress);
    assert_eq!(*job.processed_emails(), 100);

    // stale, smaller value is a no-op on progress
    let job = store.update_progress(id, 50).await.unwrap();
    assert_eq!(*job.processed_emails(), 100);

    // overshoot is capped at the total and completes the job
    let job = store.update_progress(id, 400).await.unwrap();
    assert_eq!(*job.status(), JobStatus::Completed);
    assert_eq!(*job.processed_emails(), 250);

    // completion never regresses
    let job = store.update_progress(id, 100).await.unwrap();
    assert_eq!(*job.status(), JobStatus::Completed);
    assert_eq!(*job.processed_emails(), 250);

    store.delete(id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn update_progress_for_missing_job_is_not_found() {
    let store = connect().await;
    assert!(matches!(
        store.update_progress(Uuid::now_v7(), 100).await.unwrap_err(),
        MailburstError::JobNotFound(_)
    ));
}
