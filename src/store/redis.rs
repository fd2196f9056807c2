use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::info;
use uuid::Uuid;

use crate::errors::{MailburstError, Result};
use crate::job::{Job, JobStatus};

use super::{validate_total_emails, JobStore};

const JOB_KEY_PREFIX: &str = "mailburst:job:";
const JOB_INDEX_KEY: &str = "mailburst:jobs";

/// Lua keeps the read-clamp-write cycle atomic on the redis side, the
/// counterpart of the relational backend's single UPDATE statement.
const UPDATE_PROGRESS_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return nil
end
local total = tonumber(redis.call('HGET', KEYS[1], 'total_emails'))
local current = tonumber(redis.call('HGET', KEYS[1], 'processed_emails'))
local requested = tonumber(ARGV[1])
if requested > total then requested = total end
if requested < current then requested = current end
local status = 'in-progress'
if requested >= total then status = 'completed' end
redis.call('HSET', KEYS[1], 'processed_emails', requested, 'status', status, 'updated_at', ARGV[2])
return redis.call('HGETALL', KEYS[1])
"#;

/// Document job store: one hash per job plus an id index set.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    update_script: Script,
}

impl RedisJobStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(RedisJobStore {
            conn,
            update_script: Script::new(UPDATE_PROGRESS_SCRIPT),
        })
    }

    fn job_key(id: Uuid) -> String {
        format!("{JOB_KEY_PREFIX}{id}")
    }
}

fn decode_error(context: String) -> MailburstError {
    MailburstError::Redis(redis::RedisError::from((
        redis::ErrorKind::TypeError,
        "Malformed job hash",
        context,
    )))
}

fn job_from_hash(id: Uuid, fields: &HashMap<String, String>) -> Result<Job> {
    let field = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| decode_error(format!("job {id} is missing field '{name}'")))
    };
    let int_field = |name: &str| {
        field(name)?
            .parse::<i32>()
            .map_err(|e| decode_error(format!("job {id} field '{name}': {e}")))
    };
    let time_field = |name: &str| {
        DateTime::parse_from_rfc3339(field(name)?)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| decode_error(format!("job {id} field '{name}': {e}")))
    };

    let status: JobStatus = field("status")?
        .parse()
        .map_err(|e| decode_error(format!("job {id}: {e}")))?;

    Ok(Job::new(
        id,
        int_field("total_emails")?,
        int_field("processed_emails")?,
        status,
        time_field("created_at")?,
        time_field("updated_at")?,
    ))
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, total_emails: i32) -> Result<Job> {
        validate_total_emails(total_emails)?;

        let job = Job::fresh(total_emails);
        let mut conn = self.conn.clone();

        redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(Self::job_key(*job.id()))
            .arg("total_emails")
            .arg(*job.total_emails())
            .arg("processed_emails")
            .arg(*job.processed_emails())
            .arg("status")
            .arg(job.status().as_str())
            .arg("created_at")
            .arg(job.created_at().to_rfc3339())
            .arg("updated_at")
            .arg(job.updated_at().to_rfc3339())
            .ignore()
            .cmd("SADD")
            .arg(JOB_INDEX_KEY)
            .arg(job.id().to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        info!(job_id = %job.id(), total_emails, "Job persisted");

        Ok(job)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Job> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(Self::job_key(id))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Err(MailburstError::JobNotFound(id));
        }
        job_from_hash(id, &fields)
    }

    async fn list_all(&self) -> Result<Vec<Job>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(JOB_INDEX_KEY)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for raw_id in ids {
            let Ok(id) = raw_id.parse::<Uuid>() else {
                continue;
            };
            let fields: HashMap<String, String> = redis::cmd("HGETALL")
                .arg(Self::job_key(id))
                .query_async(&mut conn)
                .await?;
            // index entries for deleted jobs are skipped, not an error
            if fields.is_empty() {
                continue;
            }
            jobs.push(job_from_hash(id, &fields)?);
        }
        Ok(jobs)
    }

    async fn update_progress(&self, id: Uuid, processed_emails: i32) -> Result<Job> {
        let mut conn = self.conn.clone();
        let fields: Option<HashMap<String, String>> = self
            .update_script
            .key(Self::job_key(id))
            .arg(processed_emails)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        let fields = fields.ok_or(MailburstError::JobNotFound(id))?;
        job_from_hash(id, &fields)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let (removed,): (i64,) = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(Self::job_key(id))
            .cmd("SREM")
            .arg(JOB_INDEX_KEY)
            .arg(id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(removed > 0)
    }
}
