use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while creating, storing or processing jobs.
///
/// Validation and not-found conditions are returned to direct callers;
/// transport faults are logged and recovered where they occur and reach this
/// enum only when an operation has to give up.
#[derive(Error, Debug)]
pub enum MailburstError {
    /// Job creation was attempted with a non-positive email count
    #[error("invalid total email count: {0} (must be greater than zero)")]
    InvalidTotalEmails(i32),

    /// The referenced job does not exist (or no longer exists)
    #[error("job '{0}' not found")]
    JobNotFound(Uuid),

    /// An error occurred while querying the relational store
    #[error("error occured while query: {0}")]
    Sql(#[from] sqlx::Error),

    /// An error occurred while talking to redis (store or queue backend)
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An error occurred while serializing or deserializing a payload
    #[error("error while serializing payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The work queue could not accept or deliver a message
    #[error("queue delivery failed: {0}")]
    Delivery(String),

    /// A chunk loop was aborted by a shutdown signal before completion
    #[error("processing interrupted by shutdown")]
    Interrupted,

    /// A second consumer loop was started while one is already active
    #[error("consumer is already running")]
    ConsumerAlreadyRunning,

    /// Backend selection or tuning configuration is unusable
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// A Result type alias for MailburstError.
pub type Result<T> = core::result::Result<T, MailburstError>;
