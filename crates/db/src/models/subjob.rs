//! Subjob entity models and DTOs.

use fanout_core::status::{StatusId, SubjobKind, TaskStatus};
use fanout_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `subjobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subjob {
    pub id: DbId,
    pub post_id: DbId,
    pub kind_id: StatusId,
    pub status_id: Option<StatusId>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subjob {
    pub fn kind(&self) -> Option<SubjobKind> {
        SubjobKind::from_id(self.kind_id)
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.status_id.and_then(TaskStatus::from_id)
    }
}

/// DTO for creating a subjob against a post.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubjob {
    pub post_id: DbId,
    pub kind_id: StatusId,
}
