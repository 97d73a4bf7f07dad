//! Repository for the `subjobs` table.

use fanout_core::status::{SubjobKind, TaskStatus};
use fanout_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::job::SentMark;
use crate::models::subjob::{CreateSubjob, Subjob};

/// Column list for `subjobs` queries.
const COLUMNS: &str =
    "id, post_id, kind_id, status_id, start_time, end_time, created_at, updated_at";

/// Provides queries for per-post follow-up work.
pub struct SubjobRepo;

impl SubjobRepo {
    /// Insert a new subjob with no status.
    pub async fn create(pool: &PgPool, input: &CreateSubjob) -> Result<Subjob, sqlx::Error> {
        let query = format!(
            "INSERT INTO subjobs (post_id, kind_id) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subjob>(&query)
            .bind(input.post_id)
            .bind(input.kind_id)
            .fetch_one(pool)
            .await
    }

    /// Find a subjob by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Subjob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subjobs WHERE id = $1");
        sqlx::query_as::<_, Subjob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Ids of subjobs of `kind` that were never sent or asked for a retry,
    /// newest first.
    pub async fn ready_ids(
        pool: &PgPool,
        kind: SubjobKind,
        limit: i64,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM subjobs \
             WHERE kind_id = $1 AND (status_id IS NULL OR status_id = $2) \
             ORDER BY id DESC \
             LIMIT $3",
        )
        .bind(kind.id())
        .bind(TaskStatus::Retry.id())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Mark a subjob as handed to the queue. Returns its prior status, or
    /// `None` if the subjob does not exist.
    pub async fn mark_sent(pool: &PgPool, id: DbId) -> Result<Option<SentMark>, sqlx::Error> {
        sqlx::query_as::<_, SentMark>(
            "UPDATE subjobs SET status_id = $2 \
             FROM (SELECT id, status_id FROM subjobs WHERE id = $1) AS prev \
             WHERE subjobs.id = prev.id \
             RETURNING prev.status_id, NULL::timestamptz AS sent_time",
        )
        .bind(id)
        .bind(TaskStatus::InQueue.id())
        .fetch_optional(pool)
        .await
    }

    /// Undo [`mark_sent`](Self::mark_sent) for a subjob still `in_queue`.
    pub async fn unmark_sent(
        pool: &PgPool,
        id: DbId,
        prior: &SentMark,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE subjobs SET status_id = $2 WHERE id = $1 AND status_id = $3")
                .bind(id)
                .bind(prior.status_id)
                .bind(TaskStatus::InQueue.id())
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Worker picked the subjob up.
    pub async fn mark_started(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE subjobs SET status_id = $2, start_time = $3 WHERE id = $1")
                .bind(id)
                .bind(TaskStatus::InProgress.id())
                .bind(now)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Worker reported completion. Returns `false` for unknown ids and for
    /// outcomes that are not completion statuses.
    pub async fn mark_finished(
        pool: &PgPool,
        id: DbId,
        outcome: TaskStatus,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        if !outcome.is_completion() {
            return Ok(false);
        }
        let result = sqlx::query("UPDATE subjobs SET status_id = $2, end_time = $3 WHERE id = $1")
            .bind(id)
            .bind(outcome.id())
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
