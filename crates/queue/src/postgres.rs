//! Outbox sink backed by the `queued_jobs` table.

use async_trait::async_trait;
use chrono::Utc;
use fanout_core::job_types;
use fanout_db::repositories::QueuedJobRepo;
use fanout_db::DbPool;

use crate::{JobSink, OutboundJob, SinkError};

/// Writes each submission as a `queued_jobs` row with `run_at = now + delay`.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: DbPool,
}

impl PgJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobSink for PgJobQueue {
    async fn submit(&self, job: OutboundJob) -> Result<(), SinkError> {
        if !job_types::is_known(&job.job_type) {
            tracing::warn!(job_type = %job.job_type, "Submitting job type no worker handles");
        }

        let now = Utc::now();
        let run_at = match job.delay {
            None => now,
            Some(delay) => chrono::Duration::from_std(delay)
                .ok()
                .and_then(|delay| now.checked_add_signed(delay))
                .unwrap_or_else(|| {
                    tracing::warn!(?delay, job_type = %job.job_type, "Delay out of range, running now");
                    now
                }),
        };

        let id = QueuedJobRepo::enqueue(&self.pool, &job.job_type, &job.args, run_at).await?;
        tracing::trace!(queued_job_id = id, job_type = %job.job_type, "Job enqueued");
        Ok(())
    }
}
