use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use getset::Getters;
use thiserror::Error;
use tracing::info;

use crate::errors::Result;
use crate::queue::{ListWorkQueue, StreamWorkQueue, WorkQueue};
use crate::store::{JobStore, PgJobStore, RedisJobStore};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_CHUNK_SIZE: i32 = 100;
const DEFAULT_CHUNK_DELAY_MS: u64 = 2000;

/// Which store/queue backend pair is active.
///
/// `Postgres` pairs the relational job store with the stream broker;
/// `Redis` pairs the document job store with the point-to-point queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Postgres,
    Redis,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(BackendKind::Postgres),
            "redis" => Ok(BackendKind::Redis),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Errors raised while reading the environment configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown backend '{0}' (expected 'postgres' or 'redis')")]
    UnknownBackend(String),
    #[error("missing DATABASE_URL config (required for the postgres backend)")]
    MissingDatabaseUrl,
    #[error("invalid value '{value}' for {var}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Environment-level configuration for the processing pipeline.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Config {
    backend: BackendKind,
    database_url: Option<String>,
    redis_url: String,
    chunk_size: i32,
    chunk_delay: Duration,
}

fn env_number<T: FromStr>(var: &'static str, default: T) -> std::result::Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let backend = match env::var("MAILBURST_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => BackendKind::Postgres,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if backend == BackendKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

        let chunk_size: i32 = env_number("MAILBURST_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let chunk_size = chunk_size.max(1);
        let chunk_delay_ms: u64 =
            env_number("MAILBURST_CHUNK_DELAY_MS", DEFAULT_CHUNK_DELAY_MS)?;

        Ok(Config {
            backend,
            database_url,
            redis_url,
            chunk_size,
            chunk_delay: Duration::from_millis(chunk_delay_ms),
        })
    }

    /// Build the active store/queue pair. Backend selection happens exactly
    /// here; everything downstream works against the trait objects.
    pub async fn connect(&self) -> Result<(Arc<dyn JobStore>, Arc<dyn WorkQueue>)> {
        match self.backend {
            BackendKind::Postgres => {
                let database_url = self
                    .database_url
                    .as_deref()
                    .ok_or(ConfigError::MissingDatabaseUrl)?;
                info!(backend = "postgres", "Connecting job store and work queue");
                let store = PgJobStore::connect(database_url).await?;
                let queue = StreamWorkQueue::connect(&self.redis_url).await?;
                Ok((Arc::new(store), Arc::new(queue)))
            }
            BackendKind::Redis => {
                info!(backend = "redis", "Connecting job store and work queue");
                let store = RedisJobStore::connect(&self.redis_url).await?;
                let queue = ListWorkQueue::connect(&self.redis_url).await?;
                Ok((Arc::new(store), Arc::new(queue)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // env vars are process-global, so everything lives in one test
    #[test]
    fn from_env_reads_backend_and_tuning() {
        env::remove_var("MAILBURST_BACKEND");
        env::remove_var("DATABASE_URL");
        env::remove_var("REDIS_URL");
        env::remove_var("MAILBURST_CHUNK_SIZE");
        env::remove_var("MAILBURST_CHUNK_DELAY_MS");

        // postgres is the default backend and requires DATABASE_URL
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::MissingDatabaseUrl)
        ));

        env::set_var("DATABASE_URL", "postgres://localhost/mailburst");
        let config = Config::from_env().expect("Failed to read config");
        assert_eq!(*config.backend(), BackendKind::Postgres);
        assert_eq!(config.redis_url(), DEFAULT_REDIS_URL);
        assert_eq!(*config.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(*config.chunk_delay(), Duration::from_millis(2000));

        env::set_var("MAILBURST_BACKEND", "redis");
        env::set_var("MAILBURST_CHUNK_SIZE", "25");
        env::set_var("MAILBURST_CHUNK_DELAY_MS", "0");
        let config = Config::from_env().expect("Failed to read config");
        assert_eq!(*config.backend(), BackendKind::Redis);
        assert_eq!(*config.chunk_size(), 25);
        assert_eq!(*config.chunk_delay(), Duration::ZERO);

        env::set_var("MAILBURST_CHUNK_SIZE", "lots");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidNumber { var: "MAILBURST_CHUNK_SIZE", .. })
        ));

        env::set_var("MAILBURST_BACKEND", "kafka");
        env::remove_var("MAILBURST_CHUNK_SIZE");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::UnknownBackend(_))
        ));

        env::remove_var("MAILBURST_BACKEND");
        env::remove_var("DATABASE_URL");
        env::remove_var("MAILBURST_CHUNK_DELAY_MS");
    }
}
