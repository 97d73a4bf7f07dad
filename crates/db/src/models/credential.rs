//! Worker credential entity models.

use fanout_core::credentials::LeaseState;
use fanout_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `worker_credentials` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkerCredential {
    pub id: DbId,
    pub account_id: DbId,
    pub proxy_id: DbId,
    pub user_agent_id: DbId,
    pub in_progress: bool,
    pub in_progress_timestamp: Option<Timestamp>,
    pub locked: bool,
    pub last_time_finished: Option<Timestamp>,
    pub alive_timestamp: Option<Timestamp>,
    pub attemp: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WorkerCredential {
    pub fn lease_state(&self) -> LeaseState {
        LeaseState {
            in_progress: self.in_progress,
            attempts: self.attemp,
            last_time_finished: self.last_time_finished,
            alive_timestamp: self.alive_timestamp,
        }
    }
}

/// How a worker's use of a credential ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Work finished; the failure counter resets.
    Succeeded,
    /// Work failed; the failure counter increments.
    Failed,
}
