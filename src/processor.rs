use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::errors::{MailburstError, Result};
use crate::job::WorkEvent;
use crate::notify::ChangeNotifier;
use crate::queue::{EventHandlerFn, WorkQueue};
use crate::shutdown::{self, ShutdownSignal, ShutdownToken};
use crate::store::JobStore;

/// Drives jobs through `pending -> in-progress -> completed` by consuming
/// work events and applying bounded, durably persisted increments.
///
/// One processor owns one consume loop at a time: [`JobProcessor::start`]
/// rejects a second concurrent start so overlapping loops cannot apply
/// duplicate chunks within the same process. Scaling out happens across
/// processes, coordinated by the queue backend's competing-consumer
/// semantics.
pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    notifier: ChangeNotifier,
    chunk_size: i32,
    chunk_delay: Duration,
    running: AtomicBool,
    stop_token: ShutdownToken,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        notifier: ChangeNotifier,
        chunk_size: i32,
        chunk_delay: Duration,
    ) -> Self {
        JobProcessor {
            store,
            queue,
            notifier,
            chunk_size: chunk_size.max(1),
            chunk_delay,
            running: AtomicBool::new(false),
            stop_token: ShutdownToken::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request a graceful stop of the active consume loop. A stop requested
    /// while no loop is active applies to the next [`JobProcessor::start`].
    pub fn stop(&self) {
        self.stop_token.shutdown();
    }

    /// Run the consume loop until `shutdown` resolves or [`JobProcessor::stop`]
    /// is called. Fails with [`MailburstError::ConsumerAlreadyRunning`] if a
    /// loop is already active on this processor.
    pub async fn start(self: &Arc<Self>, shutdown: ShutdownSignal) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Job processor is already consuming, rejecting second start");
            return Err(MailburstError::ConsumerAlreadyRunning);
        }

        let shutdown = shutdown::either(shutdown, self.stop_token.signal());
        let handler = self.event_handler(shutdown.clone());

        info!(
            chunk_size = self.chunk_size,
            chunk_delay_ms = self.chunk_delay.as_millis() as u64,
            "Job processor consuming work events"
        );

        let result = self.queue.consume(handler, shutdown).await;
        self.running.store(false, Ordering::SeqCst);
        info!("Job processor stopped");
        result
    }

    fn event_handler(self: &Arc<Self>, shutdown: ShutdownSignal) -> EventHandlerFn {
        let processor = Arc::clone(self);
        Arc::new(move |event| {
            let processor = Arc::clone(&processor);
            let shutdown = shutdown.clone();
            async move { processor.process_event(event, shutdown).await }.boxed()
        })
    }

    /// Apply one work event: claim the job, advance it chunk by chunk and
    /// persist every increment before computing the next one, so a crash
    /// loses at most one chunk and redelivery resumes from the last
    /// persisted count.
    ///
    /// Returning `Ok` acknowledges the delivery. Missing and deleted jobs
    /// are terminal for the event (logged, acknowledged, never retried);
    /// unexpected store failures and shutdown interruptions return `Err` so
    /// the delivery stays eligible for redelivery.
    pub async fn process_event(&self, event: WorkEvent, shutdown: ShutdownSignal) -> Result<()> {
        let job_id = event.job_id;
        info!(job_id = %job_id, total_emails = event.total_emails, "Processing job");

        let job = match self.store.get_by_id(job_id).await {
            Ok(job) => job,
            Err(MailburstError::JobNotFound(_)) => {
                warn!(job_id = %job_id, "Job not found in the store, discarding work event");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if job.is_completed() {
            debug!(job_id = %job_id, "Job already completed, duplicate delivery is a no-op");
            return Ok(());
        }

        let started_at = Instant::now();
        let total = *job.total_emails();
        let mut processed = *job.processed_emails();

        // enter in-progress at the current count before the first chunk
        match self.store.update_progress(job_id, processed).await {
            Ok(job) => self.notifier.job_progress(&job),
            Err(MailburstError::JobNotFound(_)) => {
                warn!(job_id = %job_id, "Job deleted before processing started, discarding");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        while processed < total {
            tokio::select! {
                _ = tokio::time::sleep(self.chunk_delay) => {}
                _ = shutdown.clone() => {
                    info!(
                        job_id = %job_id,
                        processed,
                        total,
                        "Shutdown requested mid-job, redelivery resumes from persisted progress"
                    );
                    return Err(MailburstError::Interrupted);
                }
            }

            processed = (processed + self.chunk_size).min(total);
            let job = match self.store.update_progress(job_id, processed).await {
                Ok(job) => job,
                Err(MailburstError::JobNotFound(_)) => {
                    warn!(job_id = %job_id, "Job deleted mid-processing, stopping");
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        job_id = %job_id,
                        processed,
                        total,
                        error = %e,
                        "Failed to persist chunk progress"
                    );
                    return Err(e);
                }
            };

            self.notifier.job_progress(&job);
            info!(job_id = %job_id, processed, total, "Processed chunk");
        }

        let duration = started_at.elapsed().as_millis();
        info!(job_id = %job_id, total, duration, "Job completed");
        Ok(())
    }
}
