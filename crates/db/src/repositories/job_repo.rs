//! Repository for the `jobs`, `job_keywords` and `job_sources` tables.
//!
//! Tier membership is expressed as SQL predicates that mirror
//! [`fanout_core::eligibility::Tier::matches`]. Every tier query binds the
//! same three parameters: `$1` is `now`, `$2` the tier cutoff from
//! [`Tier::cutoff`], `$3` the row limit.

use fanout_core::eligibility::{
    DueSelection, Tier, TierPolicy, PRIORITY_REGULAR, PRIORITY_URGENT,
};
use fanout_core::status::TaskStatus;
use fanout_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job, JobKeyword, JobKind, JobSource, SentMark};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, interval_minutes, retro, until_time, sent_time, received_time, finish_time, \
    status_id, enabled, priority, created_at, updated_at";

/// Urgent priority passes; regular or unset priority must be older than `$2`.
fn priority_guard() -> String {
    let regular = PRIORITY_REGULAR.map(|p| p.to_string()).join(", ");
    format!(
        "(priority = {PRIORITY_URGENT} OR ((priority IS NULL OR priority IN ({regular})) \
         AND (finish_time IS NULL OR finish_time < $2)))"
    )
}

/// WHERE clause selecting the members of `tier`.
fn tier_predicate(tier: Tier) -> String {
    match tier {
        Tier::New => format!("status_id IS NULL AND {}", priority_guard()),
        Tier::Retry => format!(
            "status_id = {} AND (finish_time IS NULL OR finish_time < $2)",
            TaskStatus::Retry.id()
        ),
        Tier::RecurringDue | Tier::FallbackRecurringDue => format!(
            "received_time IS NOT NULL \
             AND enabled = true \
             AND status_id = {} \
             AND finish_time + make_interval(mins => interval_minutes) <= $1 \
             AND {}",
            TaskStatus::Success.id(),
            priority_guard()
        ),
    }
}

/// ORDER BY clause for `tier`. Ties fall back to ascending id.
fn tier_order_by(tier: Tier) -> &'static str {
    match tier {
        Tier::New => "id ASC",
        Tier::Retry => "received_time ASC NULLS LAST, id ASC",
        Tier::RecurringDue | Tier::FallbackRecurringDue => "finish_time ASC NULLS LAST, id ASC",
    }
}

/// Restrict a tier query to jobs of one kind.
fn kind_filter(kind: Option<JobKind>) -> String {
    match kind {
        Some(kind) => format!(
            " AND EXISTS (SELECT 1 FROM {} k WHERE k.job_id = jobs.id)",
            kind.table()
        ),
        None => String::new(),
    }
}

/// Provides dispatch queries and lifecycle updates for jobs.
pub struct JobRepo;

impl JobRepo {
    // ── Creation ─────────────────────────────────────────────────────────

    /// Create a keyword job. Returns `None` if the keyword already exists.
    pub async fn create_keyword_job(
        pool: &PgPool,
        input: &CreateJob,
        keyword: &str,
    ) -> Result<Option<(Job, JobKeyword)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM job_keywords WHERE keyword = $1)")
                .bind(keyword)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Ok(None);
        }

        let job = Self::insert_job(&mut tx, input).await?;
        let kind_row = sqlx::query_as::<_, JobKeyword>(
            "INSERT INTO job_keywords (job_id, keyword) VALUES ($1, $2) \
             RETURNING id, job_id, keyword, created_at",
        )
        .bind(job.id)
        .bind(keyword)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((job, kind_row)))
    }

    /// Create a source job. Returns `None` if the source already exists.
    pub async fn create_source_job(
        pool: &PgPool,
        input: &CreateJob,
        source_id: &str,
    ) -> Result<Option<(Job, JobSource)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM job_sources WHERE source_id = $1)")
                .bind(source_id)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Ok(None);
        }

        let job = Self::insert_job(&mut tx, input).await?;
        let kind_row = sqlx::query_as::<_, JobSource>(
            "INSERT INTO job_sources (job_id, source_id) VALUES ($1, $2) \
             RETURNING id, job_id, source_id, created_at",
        )
        .bind(job.id)
        .bind(source_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((job, kind_row)))
    }

    async fn insert_job(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &CreateJob,
    ) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (interval_minutes, retro, until_time, enabled, priority) \
             VALUES ($1, $2, $3, COALESCE($4, true), $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.interval_minutes)
            .bind(input.retro)
            .bind(input.until_time)
            .bind(input.enabled)
            .bind(input.priority)
            .fetch_one(&mut **tx)
            .await
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List every job ordered by id.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs ORDER BY id ASC");
        sqlx::query_as::<_, Job>(&query).fetch_all(pool).await
    }

    /// Which kind table references the job, if any.
    pub async fn kind_of(pool: &PgPool, id: DbId) -> Result<Option<JobKind>, sqlx::Error> {
        let (keyword, source): (bool, bool) = sqlx::query_as(
            "SELECT \
                EXISTS (SELECT 1 FROM job_keywords WHERE job_id = $1), \
                EXISTS (SELECT 1 FROM job_sources WHERE job_id = $1)",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(match (keyword, source) {
            (true, _) => Some(JobKind::Keyword),
            (false, true) => Some(JobKind::Source),
            (false, false) => None,
        })
    }

    // ── Eligibility ──────────────────────────────────────────────────────

    /// First tier of the cascade with at least one member, across all kinds.
    ///
    /// Each tier is checked with `EXISTS` in cascade order and evaluation
    /// stops at the first hit, so later tiers are never queried once an
    /// earlier one has members.
    pub async fn current_tier(
        pool: &PgPool,
        now: Timestamp,
        policy: &TierPolicy,
    ) -> Result<Option<Tier>, sqlx::Error> {
        for tier in Tier::CASCADE {
            let query = format!(
                "SELECT EXISTS (SELECT 1 FROM jobs WHERE {})",
                tier_predicate(tier)
            );
            let exists: bool = sqlx::query_scalar(&query)
                .bind(now)
                .bind(tier.cutoff(now, policy))
                .fetch_one(pool)
                .await?;
            if exists {
                return Ok(Some(tier));
            }
        }
        Ok(None)
    }

    /// Ordered ids of `tier` members, optionally restricted to one kind.
    pub async fn due_ids(
        pool: &PgPool,
        tier: Tier,
        now: Timestamp,
        policy: &TierPolicy,
        kind: Option<JobKind>,
        limit: i64,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let query = format!(
            "SELECT id FROM jobs WHERE {}{} ORDER BY {} LIMIT $3",
            tier_predicate(tier),
            kind_filter(kind),
            tier_order_by(tier)
        );
        sqlx::query_scalar::<_, DbId>(&query)
            .bind(now)
            .bind(tier.cutoff(now, policy))
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Evaluate the whole cascade: the winning tier and up to `limit` of its
    /// job ids in tier order. `None` when no job is due.
    pub async fn select_due_job_ids(
        pool: &PgPool,
        now: Timestamp,
        policy: &TierPolicy,
        limit: i64,
    ) -> Result<Option<DueSelection>, sqlx::Error> {
        let Some(tier) = Self::current_tier(pool, now, policy).await? else {
            return Ok(None);
        };
        let job_ids = Self::due_ids(pool, tier, now, policy, None, limit).await?;
        tracing::debug!(tier = %tier, count = job_ids.len(), "Selected due jobs");
        Ok(Some(DueSelection { tier, job_ids }))
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Mark a job as handed to the queue: `in_queue` with `sent_time = now`.
    ///
    /// Returns the job's prior dispatch fields, or `None` if the job does not
    /// exist. Not row-locked: two overlapping cycles that selected the same id
    /// both succeed here.
    pub async fn mark_sent(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<SentMark>, sqlx::Error> {
        sqlx::query_as::<_, SentMark>(
            "UPDATE jobs SET status_id = $2, sent_time = $3 \
             FROM (SELECT id, status_id, sent_time FROM jobs WHERE id = $1) AS prev \
             WHERE jobs.id = prev.id \
             RETURNING prev.status_id, prev.sent_time",
        )
        .bind(id)
        .bind(TaskStatus::InQueue.id())
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    /// Undo [`mark_sent`](Self::mark_sent) after the submission failed.
    ///
    /// Only reverts a job still `in_queue` with the `sent_time` written at
    /// `marked_at`; a job a worker has already touched is left alone.
    pub async fn unmark_sent(
        pool: &PgPool,
        id: DbId,
        prior: &SentMark,
        marked_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status_id = $2, sent_time = $3 \
             WHERE id = $1 AND status_id = $4 AND sent_time = $5",
        )
        .bind(id)
        .bind(prior.status_id)
        .bind(prior.sent_time)
        .bind(TaskStatus::InQueue.id())
        .bind(marked_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Worker acknowledged receipt: `in_progress` with `received_time = now`.
    pub async fn mark_received(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE jobs SET status_id = $2, received_time = $3 WHERE id = $1")
                .bind(id)
                .bind(TaskStatus::InProgress.id())
                .bind(now)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Worker reported completion with `outcome` at `now`.
    ///
    /// Returns `false` if the job does not exist or `outcome` is not a
    /// completion status (success, retry, failed).
    pub async fn mark_finished(
        pool: &PgPool,
        id: DbId,
        outcome: TaskStatus,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        if !outcome.is_completion() {
            return Ok(false);
        }
        let result = sqlx::query("UPDATE jobs SET status_id = $2, finish_time = $3 WHERE id = $1")
            .bind(id)
            .bind(outcome.id())
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Enable or disable recurrence of a job.
    pub async fn set_enabled(pool: &PgPool, id: DbId, enabled: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE jobs SET enabled = $2 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
