//! Durable delivery of [`WorkEvent`]s to competing consumers.
//!
//! Two interchangeable production backends: a log-based broker on redis
//! streams (consumer groups, committed-offset style acknowledgment) and a
//! point-to-point reliable list queue (visibility timeout, explicit delete),
//! plus an in-process backend for tests and local development. Both durable
//! backends deliver at least once; consumers must tolerate duplicates.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::errors::Result;
use crate::job::WorkEvent;
use crate::shutdown::ShutdownSignal;

mod list;
mod memory;
mod stream;

pub use list::ListWorkQueue;
pub use memory::MemoryWorkQueue;
pub use stream::StreamWorkQueue;

/// Handler invoked once per delivered work event.
///
/// `Ok` acknowledges the delivery; `Err` leaves it to the backend's
/// redelivery mechanism.
pub type EventHandlerFn = Arc<
    dyn Fn(WorkEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync,
>;

/// Delivery contract for work events.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Durably enqueue one event. A failure here must surface to the caller
    /// so it knows the job will not be processed.
    async fn publish(&self, event: &WorkEvent) -> Result<()>;

    /// Consume events until `shutdown` resolves, invoking `handler` once per
    /// delivery. Each event reaches exactly one consumer per delivery
    /// attempt when multiple consumers share the backend.
    async fn consume(&self, handler: EventHandlerFn, shutdown: ShutdownSignal) -> Result<()>;
}

/// Envelope wrapping an event on the wire. The delivery id makes each queue
/// entry unique so the list backend can target its acknowledgment deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct QueueMessage {
    pub id: Uuid,
    pub event: WorkEvent,
}

impl QueueMessage {
    pub fn wrap(event: WorkEvent) -> Self {
        QueueMessage {
            id: Uuid::now_v7(),
            event,
        }
    }
}

/// Run one handler invocation on its own task so a panic is contained as a
/// processing fault instead of tearing down the consume loop. Returns whether
/// the delivery should be acknowledged.
pub(crate) async fn invoke_handler(handler: &EventHandlerFn, event: WorkEvent) -> bool {
    let job_id = event.job_id;
    match tokio::spawn(handler(event)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(job_id = %job_id, error = %e, "Work event handler failed, leaving delivery for retry");
            false
        }
        Err(join_error) => {
            error!(job_id = %job_id, error = %join_error, "Work event handler panicked");
            false
        }
    }
}
