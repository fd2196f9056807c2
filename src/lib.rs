//! Simulated bulk email dispatch as asynchronous jobs.
//!
//! A client submits a job declaring a total email count; the job is
//! persisted as a durable record and a work event is published to a queue.
//! A processor consumes the event and drives the record through
//! `pending -> in-progress -> completed` in bounded, idempotent increments,
//! broadcasting every change to connected observers.
//!
//! The store and queue are capability traits with two interchangeable
//! production backend pairs (relational table + stream broker, or document
//! store + point-to-point queue), selected once at startup via [`Config`].
//! Delivery is at-least-once everywhere; progress updates are monotonic so
//! duplicated or reordered deliveries can never regress a job.

pub mod config;
pub mod errors;
pub mod job;
pub mod notify;
pub mod processor;
pub mod queue;
pub mod service;
pub mod shutdown;
pub mod store;

pub use config::{BackendKind, Config, ConfigError};
pub use errors::{MailburstError, Result};
pub use job::{Job, JobStatus, WorkEvent};
pub use notify::{ChangeNotifier, JobEvent};
pub use processor::JobProcessor;
pub use queue::{EventHandlerFn, ListWorkQueue, MemoryWorkQueue, StreamWorkQueue, WorkQueue};
pub use service::JobService;
pub use shutdown::{shutdown_signal, ShutdownSignal, ShutdownToken};
pub use store::{JobStore, MemoryJobStore, PgJobStore, RedisJobStore};
