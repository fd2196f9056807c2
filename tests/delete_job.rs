use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailburst::store::JobStore;
use mailburst::{
    shutdown, ChangeNotifier, Job, JobProcessor, MailburstError, MemoryJobStore, MemoryWorkQueue,
    WorkEvent,
};
use uuid::Uuid;

use crate::helpers::{drain_events, test_stack};

mod helpers;

#[tokio::test]
async fn delete_job_reports_whether_a_record_existed() {
    let stack = test_stack();
    let job = stack.service.create_job(100).await.unwrap();

    assert!(stack.service.delete_job(*job.id()).await.unwrap());
    assert!(!stack.service.delete_job(*job.id()).await.unwrap());
    assert!(matches!(
        stack.service.get_job(*job.id()).await.unwrap_err(),
        MailburstError::JobNotFound(_)
    ));
}

#[tokio::test]
async fn event_for_deleted_job_is_discarded_without_error() {
    let stack = test_stack();
    let job = stack.service.create_job(100).await.unwrap();
    stack.service.delete_job(*job.id()).await.unwrap();

    let mut rx = stack.notifier.subscribe();
    stack
        .processor
        .process_event(
            WorkEvent {
                job_id: *job.id(),
                total_emails: 100,
            },
            shutdown::never(),
        )
        .await
        .expect("Deleted job must be a silent discard");

    assert!(drain_events(&mut rx).is_empty());
}

/// Store that deletes the job underneath the processor after a fixed number
/// of progress updates, making the mid-loop deletion race deterministic.
struct DeleteMidLoopStore {
    inner: MemoryJobStore,
    updates_before_delete: u32,
    updates_seen: AtomicU32,
}

#[async_trait]
impl JobStore for DeleteMidLoopStore {
    async fn create(&self, total_emails: i32) -> mailburst::Result<Job> {
        self.inner.create(total_emails).await
    }

    async fn get_by_id(&self, id: Uuid) -> mailburst::Result<Job> {
        self.inner.get_by_id(id).await
    }

    async fn list_all(&self) -> mailburst::Result<Vec<Job>> {
        self.inner.list_all().await
    }

    async fn update_progress(&self, id: Uuid, processed_emails: i32) -> mailburst::Result<Job> {
        if self.updates_seen.fetch_add(1, Ordering::SeqCst) == self.updates_before_delete {
            self.inner.delete(id).await?;
        }
        self.inner.update_progress(id, processed_emails).await
    }

    async fn delete(&self, id: Uuid) -> mailburst::Result<bool> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn deletion_mid_loop_stops_processing_without_error() {
    let store = Arc::new(DeleteMidLoopStore {
        inner: MemoryJobStore::new(),
        // initial in-progress write plus one chunk land, then the delete
        updates_before_delete: 2,
        updates_seen: AtomicU32::new(0),
    });
    let notifier = ChangeNotifier::new(16);
    let processor = JobProcessor::new(
        store.clone(),
        Arc::new(MemoryWorkQueue::new()),
        notifier.clone(),
        100,
        Duration::ZERO,
    );

    let job = store.create(500).await.unwrap();
    processor
        .process_event(
            WorkEvent {
                job_id: *job.id(),
                total_emails: 500,
            },
            shutdown::never(),
        )
        .await
        .expect("Mid-loop deletion must not escalate");

    assert!(matches!(
        store.get_by_id(*job.id()).await.unwrap_err(),
        MailburstError::JobNotFound(_)
    ));
}

#[tokio::test]
async fn unexpected_store_failure_is_a_processing_fault() {
    struct FailingUpdateStore {
        inner: MemoryJobStore,
    }

    #[async_trait]
    impl JobStore for FailingUpdateStore {
        async fn create(&self, total_emails: i32) -> mailburst::Result<Job> {
            self.inner.create(total_emails).await
        }

        async fn get_by_id(&self, id: Uuid) -> mailburst::Result<Job> {
            self.inner.get_by_id(id).await
        }

        async fn list_all(&self) -> mailburst::Result<Vec<Job>> {
            self.inner.list_all().await
        }

        async fn update_progress(&self, _id: Uuid, _processed: i32) -> mailburst::Result<Job> {
            Err(MailburstError::Delivery("store connection lost".into()))
        }

        async fn delete(&self, id: Uuid) -> mailburst::Result<bool> {
            self.inner.delete(id).await
        }
    }

    let store = Arc::new(FailingUpdateStore {
        inner: MemoryJobStore::new(),
    });
    let processor = JobProcessor::new(
        store.clone(),
        Arc::new(MemoryWorkQueue::new()),
        ChangeNotifier::new(16),
        100,
        Duration::ZERO,
    );

    let job = store.create(100).await.unwrap();
    let result = processor
        .process_event(
            WorkEvent {
                job_id: *job.id(),
                total_emails: 100,
            },
            shutdown::never(),
        )
        .await;

    assert!(result.is_err(), "processing fault must not be acknowledged");
}
