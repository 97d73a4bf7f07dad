//! Hand-off of work to the worker fleet.
//!
//! The dispatcher never talks to workers directly. It submits
//! `(job_type, args, delay)` triples through a [`JobSink`]; the PostgreSQL
//! implementation appends them to the `queued_jobs` outbox, the in-memory one
//! records them for inspection.

use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
pub mod postgres;

pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;

/// Errors a sink can return from [`JobSink::submit`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job sink is closed")]
    Closed,
}

/// One unit of work for the worker fleet.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundJob {
    /// One of the identifiers in [`fanout_core::job_types`].
    pub job_type: String,
    /// Positional arguments, always a JSON array.
    pub args: serde_json::Value,
    /// Earliest time after submission the job may run.
    pub delay: Option<Duration>,
}

impl OutboundJob {
    /// A job with no arguments.
    pub fn new(job_type: &str) -> Self {
        Self {
            job_type: job_type.to_string(),
            args: serde_json::Value::Array(Vec::new()),
            delay: None,
        }
    }

    /// A job carrying a single entity id, the common dispatch shape.
    pub fn for_entity(job_type: &str, id: i64) -> Self {
        Self {
            job_type: job_type.to_string(),
            args: serde_json::json!([id]),
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The first positional argument as an id, if there is one.
    pub fn entity_id(&self) -> Option<i64> {
        self.args.get(0).and_then(serde_json::Value::as_i64)
    }
}

/// Destination for outbound jobs.
///
/// Submission is fire-and-forget: a successful return means the job was
/// accepted by the transport, not that a worker ran it.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn submit(&self, job: OutboundJob) -> Result<(), SinkError>;
}
