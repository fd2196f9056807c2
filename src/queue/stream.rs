use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamClaimReply, StreamId, StreamReadReply};
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::job::WorkEvent;
use crate::shutdown::ShutdownSignal;

use super::{invoke_handler, EventHandlerFn, QueueMessage, WorkQueue};

const DEFAULT_STREAM_KEY: &str = "mailburst:work";
const DEFAULT_GROUP: &str = "mailburst-workers";

/// Entries left pending longer than this are reclaimed and redelivered.
const DEFAULT_REDELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

const READ_BATCH_SIZE: usize = 10;
const READ_BLOCK_MS: usize = 1000;
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Log-based work queue on redis streams.
///
/// Publishing appends to the stream; consumers compete within one consumer
/// group, so each entry is delivered to exactly one of them per attempt.
/// Acknowledgment commits consumption progress via XACK; entries whose
/// consumer died are reclaimed (XPENDING + XCLAIM) once they sit idle past
/// the redelivery timeout, which is what makes delivery at-least-once.
#[derive(Clone)]
pub struct StreamWorkQueue {
    client: redis::Client,
    publish_conn: ConnectionManager,
    stream_key: String,
    group: String,
    redelivery_timeout: Duration,
}

impl StreamWorkQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publish_conn = ConnectionManager::new(client.clone()).await?;
        Ok(StreamWorkQueue {
            client,
            publish_conn,
            stream_key: DEFAULT_STREAM_KEY.into(),
            group: DEFAULT_GROUP.into(),
            redelivery_timeout: DEFAULT_REDELIVERY_TIMEOUT,
        })
    }

    pub fn stream_key(mut self, value: &str) -> Self {
        self.stream_key = value.into();
        self
    }

    pub fn redelivery_timeout(mut self, value: Duration) -> Self {
        self.redelivery_timeout = value;
        self
    }

    /// Idempotent; the BUSYGROUP reply for an existing group is ignored.
    async fn ensure_group(&self, conn: &mut MultiplexedConnection) {
        let _: std::result::Result<String, _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(conn)
            .await;
    }

    async fn ack(&self, conn: &mut MultiplexedConnection, entry_id: &str) {
        let acked: std::result::Result<u64, _> = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(entry_id)
            .query_async(conn)
            .await;
        if let Err(e) = acked {
            error!(entry_id, error = %e, "Failed to acknowledge stream entry");
        }
    }

    /// Reclaimed stale deliveries first, then new entries.
    async fn next_batch(
        &self,
        conn: &mut MultiplexedConnection,
        consumer: &str,
    ) -> Result<Vec<StreamId>> {
        let min_idle_ms = self.redelivery_timeout.as_millis() as u64;

        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(READ_BATCH_SIZE)
            .query_async(conn)
            .await?;

        if !pending.is_empty() {
            let ids: Vec<String> = pending.into_iter().map(|(id, _, _, _)| id).collect();
            debug!(count = ids.len(), "Reclaiming stale stream entries");
            let claimed: StreamClaimReply = redis::cmd("XCLAIM")
                .arg(&self.stream_key)
                .arg(&self.group)
                .arg(consumer)
                .arg(min_idle_ms)
                .arg(&ids)
                .query_async(conn)
                .await?;
            if !claimed.ids.is_empty() {
                return Ok(claimed.ids);
            }
        }

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(consumer)
            .arg("COUNT")
            .arg(READ_BATCH_SIZE)
            .arg("BLOCK")
            .arg(READ_BLOCK_MS)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(">")
            .query_async(conn)
            .await?;

        Ok(reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .collect())
    }
}

fn consumer_id() -> String {
    let mut random_bytes = [0u8; 9];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    format!("mailburst_consumer_{}", hex::encode(random_bytes))
}

#[async_trait]
impl WorkQueue for StreamWorkQueue {
    async fn publish(&self, event: &WorkEvent) -> Result<()> {
        let payload = serde_json::to_string(&QueueMessage::wrap(event.clone()))?;
        let mut conn = self.publish_conn.clone();

        let entry_id: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("payload")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!(job_id = %event.job_id, entry_id, "Work event published to stream");
        Ok(())
    }

    async fn consume(&self, handler: EventHandlerFn, shutdown: ShutdownSignal) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.ensure_group(&mut conn).await;

        let consumer = consumer_id();
        info!(
            stream = %self.stream_key,
            group = %self.group,
            consumer = %consumer,
            "Stream consumer connected"
        );

        let mut backoff = Duration::from_millis(250);
        loop {
            let entries = tokio::select! {
                _ = shutdown.clone() => break,
                batch = self.next_batch(&mut conn, &consumer) => match batch {
                    Ok(entries) => {
                        backoff = Duration::from_millis(250);
                        entries
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read from stream, backing off");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                },
            };

            for entry in entries {
                let Some(payload) = entry.get::<String>("payload") else {
                    warn!(entry_id = %entry.id, "Stream entry has no payload, discarding");
                    self.ack(&mut conn, &entry.id).await;
                    continue;
                };

                match serde_json::from_str::<QueueMessage>(&payload) {
                    Ok(message) => {
                        if invoke_handler(&handler, message.event).await {
                            self.ack(&mut conn, &entry.id).await;
                        }
                        // unacknowledged entries stay pending and are
                        // reclaimed after the redelivery timeout
                    }
                    Err(e) => {
                        warn!(entry_id = %entry.id, error = %e, "Malformed work event, discarding");
                        self.ack(&mut conn, &entry.id).await;
                    }
                }
            }
        }

        info!(consumer = %consumer, "Stream consumer disconnected");
        Ok(())
    }
}
