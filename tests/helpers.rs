#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mailburst::notify::JobEvent;
use mailburst::{
    ChangeNotifier, JobProcessor, JobService, MemoryJobStore, MemoryWorkQueue,
};
use tokio::sync::broadcast;
use tokio::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const TEST_CHUNK_SIZE: i32 = 100;

/// Full in-memory pipeline wired the way production wires the durable
/// backends, with a zero chunk delay so tests run instantly.
pub struct TestStack {
    pub store: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryWorkQueue>,
    pub notifier: ChangeNotifier,
    pub service: JobService,
    pub processor: Arc<JobProcessor>,
}

pub fn test_stack() -> TestStack {
    test_stack_with_delay(Duration::ZERO)
}

pub fn test_stack_with_delay(chunk_delay: Duration) -> TestStack {
    let store = Arc::new(MemoryJobStore::new());
    let queue = Arc::new(MemoryWorkQueue::new());
    let notifier = ChangeNotifier::new(64);
    let service = JobService::new(store.clone(), queue.clone(), notifier.clone());
    let processor = Arc::new(JobProcessor::new(
        store.clone(),
        queue.clone(),
        notifier.clone(),
        TEST_CHUNK_SIZE,
        chunk_delay,
    ));

    TestStack {
        store,
        queue,
        notifier,
        service,
        processor,
    }
}

/// Drain everything currently buffered in an observer receiver.
pub fn drain_events(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll `check` until it returns true or the deadline passes.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        if tokio::time::Instant::now() > deadline {
            panic!("Timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn enable_logs() {
    static ONCE: OnceCell<()> = OnceCell::const_new();

    ONCE.get_or_init(|| async {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let filter_layer = EnvFilter::try_new("debug,sqlx=warn").unwrap();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    })
    .await;
}
