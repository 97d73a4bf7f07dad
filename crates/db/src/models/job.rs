//! Job entity models and DTOs.

use fanout_core::eligibility::JobSnapshot;
use fanout_core::status::{StatusId, TaskStatus};
use fanout_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub interval_minutes: i32,
    pub retro: Timestamp,
    pub until_time: Option<Timestamp>,
    pub sent_time: Option<Timestamp>,
    pub received_time: Option<Timestamp>,
    pub finish_time: Option<Timestamp>,
    pub status_id: Option<StatusId>,
    pub enabled: bool,
    pub priority: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Decoded status, `None` when the job was never dispatched.
    pub fn status(&self) -> Option<TaskStatus> {
        self.status_id.and_then(TaskStatus::from_id)
    }

    /// The fields tier evaluation depends on.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: self.status(),
            priority: self.priority,
            enabled: self.enabled,
            interval_minutes: self.interval_minutes,
            received_time: self.received_time,
            finish_time: self.finish_time,
        }
    }
}

/// A row from the `job_keywords` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobKeyword {
    pub id: DbId,
    pub job_id: DbId,
    pub keyword: String,
    pub created_at: Timestamp,
}

/// A row from the `job_sources` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobSource {
    pub id: DbId,
    pub job_id: DbId,
    pub source_id: String,
    pub created_at: Timestamp,
}

/// Which kind table a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Keyword,
    Source,
}

impl JobKind {
    pub fn table(self) -> &'static str {
        match self {
            JobKind::Keyword => "job_keywords",
            JobKind::Source => "job_sources",
        }
    }
}

/// Dispatch fields of a job or subjob as they were before it was marked
/// `in_queue`. Subjobs carry no `sent_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct SentMark {
    pub status_id: Option<StatusId>,
    pub sent_time: Option<Timestamp>,
}

/// DTO for creating a job.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    pub interval_minutes: i32,
    pub retro: Timestamp,
    pub until_time: Option<Timestamp>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
}
