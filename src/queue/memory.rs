use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Notify;
use tracing::debug;

use crate::errors::Result;
use crate::job::WorkEvent;
use crate::shutdown::ShutdownSignal;

use super::{invoke_handler, EventHandlerFn, QueueMessage, WorkQueue};

/// In-process work queue for tests and local development.
///
/// Preserves the at-least-once contract of the durable backends: an
/// unacknowledged delivery goes back to the end of the queue.
#[derive(Debug, Default)]
pub struct MemoryWorkQueue {
    messages: Mutex<VecDeque<QueueMessage>>,
    arrival: Notify,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<QueueMessage> {
        self.messages
            .lock()
            .expect("queue mutex poisoned")
            .pop_front()
    }

    fn requeue(&self, message: QueueMessage) {
        self.messages
            .lock()
            .expect("queue mutex poisoned")
            .push_back(message);
        self.arrival.notify_one();
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn publish(&self, event: &WorkEvent) -> Result<()> {
        self.messages
            .lock()
            .expect("queue mutex poisoned")
            .push_back(QueueMessage::wrap(event.clone()));
        self.arrival.notify_one();
        Ok(())
    }

    async fn consume(&self, handler: EventHandlerFn, shutdown: ShutdownSignal) -> Result<()> {
        loop {
            let Some(message) = self.pop() else {
                tokio::select! {
                    _ = shutdown.clone() => break,
                    _ = self.arrival.notified() => continue,
                }
            };

            if !invoke_handler(&handler, message.event.clone()).await {
                self.requeue(message);
                // don't spin on a delivery that keeps failing
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            if shutdown.clone().now_or_never().is_some() {
                debug!("Shutdown requested, leaving consume loop");
                break;
            }
        }
        Ok(())
    }
}
