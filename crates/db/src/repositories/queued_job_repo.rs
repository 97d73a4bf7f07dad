//! Repository for the `queued_jobs` outbox.

use fanout_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::queued_job::QueuedJob;

const COLUMNS: &str = "id, job_type, args, run_at, created_at";

pub struct QueuedJobRepo;

impl QueuedJobRepo {
    /// Append a submission to the outbox. Returns the new row id.
    pub async fn enqueue(
        pool: &PgPool,
        job_type: &str,
        args: &serde_json::Value,
        run_at: Timestamp,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO queued_jobs (job_type, args, run_at) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(job_type)
        .bind(args)
        .bind(run_at)
        .fetch_one(pool)
        .await
    }

    /// Outbox rows in insertion order, optionally filtered by job type.
    pub async fn list(
        pool: &PgPool,
        job_type: Option<&str>,
    ) -> Result<Vec<QueuedJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM queued_jobs \
             WHERE ($1::TEXT IS NULL OR job_type = $1) \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, QueuedJob>(&query)
            .bind(job_type)
            .fetch_all(pool)
            .await
    }

    /// Number of outbox rows.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM queued_jobs")
            .fetch_one(pool)
            .await
    }
}
