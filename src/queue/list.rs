use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::job::WorkEvent;
use crate::shutdown::ShutdownSignal;

use super::{invoke_handler, EventHandlerFn, QueueMessage, WorkQueue};

const DEFAULT_PENDING_KEY: &str = "mailburst:work:pending";
const DEFAULT_PROCESSING_KEY: &str = "mailburst:work:processing";
const DEFAULT_INFLIGHT_KEY: &str = "mailburst:work:inflight";

/// How long a received message stays invisible before it is returned to the
/// pending queue.
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

const POP_TIMEOUT_SECS: usize = 1;
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Point-to-point work queue on a redis reliable list.
///
/// Models a managed queue: receiving moves a message from the pending list
/// to a processing list and stamps a visibility deadline; the consumer must
/// explicitly delete the message after handling it, otherwise a sweep moves
/// it back to pending once the deadline passes and it is redelivered.
#[derive(Clone)]
pub struct ListWorkQueue {
    client: redis::Client,
    publish_conn: ConnectionManager,
    pending_key: String,
    processing_key: String,
    inflight_key: String,
    visibility_timeout: Duration,
}

impl ListWorkQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publish_conn = ConnectionManager::new(client.clone()).await?;
        Ok(ListWorkQueue {
            client,
            publish_conn,
            pending_key: DEFAULT_PENDING_KEY.into(),
            processing_key: DEFAULT_PROCESSING_KEY.into(),
            inflight_key: DEFAULT_INFLIGHT_KEY.into(),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        })
    }

    pub fn visibility_timeout(mut self, value: Duration) -> Self {
        self.visibility_timeout = value;
        self
    }

    /// Delete an acknowledged message from the processing list.
    async fn ack(&self, conn: &mut MultiplexedConnection, payload: &str) {
        let result: std::result::Result<(), _> = redis::pipe()
            .cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(payload)
            .ignore()
            .cmd("ZREM")
            .arg(&self.inflight_key)
            .arg(payload)
            .ignore()
            .query_async(conn)
            .await;
        if let Err(e) = result {
            error!(error = %e, "Failed to delete acknowledged message");
        }
    }

    /// Return messages whose visibility deadline has passed to the pending
    /// list. Messages in the processing list with no recorded deadline were
    /// left behind by a consumer that died mid-receive; they are returned
    /// too.
    async fn sweep_expired(&self, conn: &mut MultiplexedConnection) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();

        let expired: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.inflight_key)
            .arg("-inf")
            .arg(now_ms)
            .query_async(conn)
            .await?;

        let processing: Vec<String> = redis::cmd("LRANGE")
            .arg(&self.processing_key)
            .arg(0)
            .arg(-1)
            .query_async(conn)
            .await?;
        let mut orphaned = Vec::new();
        for payload in &processing {
            let score: Option<f64> = redis::cmd("ZSCORE")
                .arg(&self.inflight_key)
                .arg(payload)
                .query_async(conn)
                .await?;
            if score.is_none() {
                orphaned.push(payload.clone());
            }
        }

        for payload in expired.iter().chain(orphaned.iter()) {
            debug!("Returning expired in-flight message to pending queue");
            redis::pipe()
                .atomic()
                .cmd("LREM")
                .arg(&self.processing_key)
                .arg(1)
                .arg(payload)
                .ignore()
                .cmd("ZREM")
                .arg(&self.inflight_key)
                .arg(payload)
                .ignore()
                .cmd("LPUSH")
                .arg(&self.pending_key)
                .arg(payload)
                .ignore()
                .query_async::<_, ()>(conn)
                .await?;
        }

        Ok(())
    }

    /// Blocking move of one message from pending to processing, stamping its
    /// visibility deadline.
    async fn receive(&self, conn: &mut MultiplexedConnection) -> Result<Option<String>> {
        let popped: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.pending_key)
            .arg(&self.processing_key)
            .arg(POP_TIMEOUT_SECS)
            .query_async(conn)
            .await?;

        let Some(payload) = popped else {
            return Ok(None);
        };

        let deadline_ms =
            Utc::now().timestamp_millis() + self.visibility_timeout.as_millis() as i64;
        redis::cmd("ZADD")
            .arg(&self.inflight_key)
            .arg(deadline_ms)
            .arg(&payload)
            .query_async::<_, ()>(conn)
            .await?;

        Ok(Some(payload))
    }
}

#[async_trait]
impl WorkQueue for ListWorkQueue {
    async fn publish(&self, event: &WorkEvent) -> Result<()> {
        let payload = serde_json::to_string(&QueueMessage::wrap(event.clone()))?;
        let mut conn = self.publish_conn.clone();

        redis::cmd("LPUSH")
            .arg(&self.pending_key)
            .arg(&payload)
            .query_async::<_, ()>(&mut conn)
            .await?;

        info!(job_id = %event.job_id, "Work event published to queue");
        Ok(())
    }

    async fn consume(&self, handler: EventHandlerFn, shutdown: ShutdownSignal) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        info!(queue = %self.pending_key, "Queue consumer connected");

        let mut backoff = Duration::from_millis(250);
        loop {
            if let Err(e) = self.sweep_expired(&mut conn).await {
                error!(error = %e, "Failed to sweep expired in-flight messages");
            }

            let payload = tokio::select! {
                _ = shutdown.clone() => break,
                received = self.receive(&mut conn) => match received {
                    Ok(payload) => {
                        backoff = Duration::from_millis(250);
                        payload
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to receive from queue, backing off");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                },
            };

            let Some(payload) = payload else {
                continue;
            };

            match serde_json::from_str::<QueueMessage>(&payload) {
                Ok(message) => {
                    if invoke_handler(&handler, message.event).await {
                        self.ack(&mut conn, &payload).await;
                    }
                    // unacknowledged messages become visible again once the
                    // deadline passes
                }
                Err(e) => {
                    warn!(error = %e, "Malformed work event, discarding");
                    self.ack(&mut conn, &payload).await;
                }
            }
        }

        info!(queue = %self.pending_key, "Queue consumer disconnected");
        Ok(())
    }
}
