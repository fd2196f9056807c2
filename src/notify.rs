use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::job::{Job, JobStatus};

/// Change event broadcast to connected observers.
///
/// `JobCreated` carries a full snapshot; `JobProgress` carries the trimmed
/// view the progress UI consumes. The kebab-case `kind` tag is the wire
/// discriminator used by the presentation transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobEvent {
    #[serde(rename_all = "camelCase")]
    JobCreated { job: Job },
    #[serde(rename_all = "camelCase")]
    JobProgress {
        job_id: Uuid,
        status: JobStatus,
        processed_emails: i32,
        total_emails: i32,
    },
}

/// Best-effort fan-out of job change events to any number of observers.
///
/// Delivery is non-durable: an observer subscribing after an event was
/// emitted never receives it, and a slow or dropped observer does not affect
/// the emitter or other observers.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<JobEvent>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn job_created(&self, job: &Job) {
        self.emit(JobEvent::JobCreated { job: job.clone() });
    }

    pub fn job_progress(&self, job: &Job) {
        self.emit(JobEvent::JobProgress {
            job_id: *job.id(),
            status: *job.status(),
            processed_emails: *job.processed_emails(),
            total_emails: *job.total_emails(),
        });
    }

    fn emit(&self, event: JobEvent) {
        // send only fails when there is no receiver, which is fine for a
        // best-effort broadcast
        if self.sender.send(event).is_err() {
            debug!("No connected observers, change event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_all_current_observers() {
        let notifier = ChangeNotifier::new(8);
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        let job = Job::fresh(10);
        notifier.job_created(&job);

        assert_eq!(a.recv().await.unwrap(), JobEvent::JobCreated { job: job.clone() });
        assert_eq!(b.recv().await.unwrap(), JobEvent::JobCreated { job });
    }

    #[tokio::test]
    async fn late_observer_receives_nothing_retroactively() {
        let notifier = ChangeNotifier::new(8);
        notifier.job_created(&Job::fresh(10));

        let mut late = notifier.subscribe();
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn progress_event_wire_shape() {
        let job = Job::fresh(250);
        let event = JobEvent::JobProgress {
            job_id: *job.id(),
            status: JobStatus::InProgress,
            processed_emails: 100,
            total_emails: 250,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "job-progress");
        assert_eq!(value["jobId"], job.id().to_string());
        assert_eq!(value["status"], "in-progress");
        assert_eq!(value["processedEmails"], 100);
        assert_eq!(value["totalEmails"], 250);
    }
}
