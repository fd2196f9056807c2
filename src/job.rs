use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a [`Job`].
///
/// Transitions only move forward: `Pending -> InProgress -> Completed`.
/// A job never re-enters `Pending`, and nothing leaves `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in-progress",
            JobStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown job status '{0}'")]
pub struct ParseJobStatusError(String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in-progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            other => Err(ParseJobStatusError(other.to_string())),
        }
    }
}

/// A trackable unit of simulated bulk work: a fixed total and a mutable
/// processed count.
///
/// The job store owns the authoritative copy; everything else works on
/// point-in-time snapshots. JSON uses camelCase field names to match the
/// HTTP and websocket payloads of the surrounding system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[getset(get = "pub")]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique identifier, assigned at creation
    id: Uuid,
    /// How many emails this job stands for, fixed at creation (> 0)
    total_emails: i32,
    /// How many emails have been processed so far, monotonically non-decreasing
    processed_emails: i32,
    /// Current lifecycle state
    status: JobStatus,
    /// When the job was created
    created_at: DateTime<Utc>,
    /// When the job was last mutated
    updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        id: Uuid,
        total_emails: i32,
        processed_emails: i32,
        status: JobStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Job {
            id,
            total_emails,
            processed_emails,
            status,
            created_at,
            updated_at,
        }
    }

    /// Fresh `pending` job with a generated id, used by store backends at
    /// creation time.
    pub(crate) fn fresh(total_emails: i32) -> Self {
        let now = Utc::now();
        Job {
            id: Uuid::now_v7(),
            total_emails,
            processed_emails: 0,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// Queue message instructing a processor to drive a job's progress.
///
/// `total_emails` is denormalized from the job at enqueue time so the
/// processor can log context without a store round-trip. The `job_id` is a
/// weak reference: the job may have been deleted by the time the event is
/// consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEvent {
    pub job_id: Uuid,
    pub total_emails: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_str_round_trip() {
        for status in [JobStatus::Pending, JobStatus::InProgress, JobStatus::Completed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn job_serializes_camel_case() {
        let job = Job::fresh(250);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["totalEmails"], 250);
        assert_eq!(value["processedEmails"], 0);
        assert_eq!(value["status"], "pending");
        assert!(value["createdAt"].is_string());
        assert!(value["updatedAt"].is_string());
    }

    #[test]
    fn work_event_wire_shape() {
        let event = WorkEvent {
            job_id: Uuid::now_v7(),
            total_emails: 42,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["jobId"], event.job_id.to_string());
        assert_eq!(value["totalEmails"], 42);

        let parsed: WorkEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }
}
