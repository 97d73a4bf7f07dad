//! Outbox rows handed to the worker fleet.

use fanout_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `queued_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueuedJob {
    pub id: DbId,
    pub job_type: String,
    pub args: serde_json::Value,
    pub run_at: Timestamp,
    pub created_at: Timestamp,
}
