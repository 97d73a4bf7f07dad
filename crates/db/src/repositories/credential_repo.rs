//! Repository for the `worker_credentials` ledger.
//!
//! Every state transition on a credential row happens inside a transaction
//! that holds the row lock (`FOR UPDATE`), so concurrent claimers, the
//! reaper and worker releases serialize per row.

use fanout_core::credentials::LeasePolicy;
use fanout_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::credential::{ReleaseOutcome, WorkerCredential};
use crate::models::inventory::ProxyRecheckCandidate;

/// Column list for `worker_credentials` queries.
const COLUMNS: &str = "\
    id, account_id, proxy_id, user_agent_id, in_progress, in_progress_timestamp, \
    locked, last_time_finished, alive_timestamp, attemp, created_at, updated_at";

/// Provides lease operations on worker credentials.
pub struct CredentialRepo;

impl CredentialRepo {
    /// Pair an account, proxy and user agent into a new credential.
    pub async fn create(
        pool: &PgPool,
        account_id: DbId,
        proxy_id: DbId,
        user_agent_id: DbId,
    ) -> Result<WorkerCredential, sqlx::Error> {
        let query = format!(
            "INSERT INTO worker_credentials (account_id, proxy_id, user_agent_id) \
             VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WorkerCredential>(&query)
            .bind(account_id)
            .bind(proxy_id)
            .bind(user_agent_id)
            .fetch_one(pool)
            .await
    }

    /// Find a credential by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WorkerCredential>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM worker_credentials WHERE id = $1");
        sqlx::query_as::<_, WorkerCredential>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Credentials usable for dispatch at `now`: not leased, under the
    /// failure ceiling and past the cooldown.
    pub async fn count_available(
        pool: &PgPool,
        now: Timestamp,
        policy: &LeasePolicy,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM worker_credentials \
             WHERE attemp <= $1 \
               AND in_progress = false \
               AND (last_time_finished IS NULL OR last_time_finished < $2)",
        )
        .bind(policy.max_attempts)
        .bind(policy.cooldown_cutoff(now))
        .fetch_one(pool)
        .await
    }

    /// Free one abandoned lease whose heartbeat is older than `cutoff`.
    ///
    /// Rows locked by another transaction are skipped. Returns the freed id,
    /// or `None` once no stale lease remains.
    pub async fn free_one_stale_lease(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Option<DbId>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let id: Option<DbId> = sqlx::query_scalar(
            "SELECT id FROM worker_credentials \
             WHERE in_progress = true \
               AND alive_timestamp IS NOT NULL \
               AND alive_timestamp < $1 \
             ORDER BY id \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            return Ok(None);
        };

        sqlx::query("UPDATE worker_credentials SET in_progress = false WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(id))
    }

    /// Lease a credential for a worker. Returns `None` if it does not exist
    /// or is already leased.
    pub async fn claim(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
    ) -> Result<Option<WorkerCredential>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let in_progress: Option<bool> = sqlx::query_scalar(
            "SELECT in_progress FROM worker_credentials WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if in_progress != Some(false) {
            return Ok(None);
        }

        let query = format!(
            "UPDATE worker_credentials \
             SET in_progress = true, in_progress_timestamp = $2, alive_timestamp = $2 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let credential = sqlx::query_as::<_, WorkerCredential>(&query)
            .bind(id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(credential))
    }

    /// Refresh the heartbeat of a leased credential. Returns `false` if the
    /// credential is not currently leased.
    pub async fn heartbeat(pool: &PgPool, id: DbId, now: Timestamp) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE worker_credentials SET alive_timestamp = $2 \
             WHERE id = $1 AND in_progress = true",
        )
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// End a lease. Success resets the failure counter; failure increments it.
    pub async fn release(
        pool: &PgPool,
        id: DbId,
        now: Timestamp,
        outcome: ReleaseOutcome,
    ) -> Result<Option<WorkerCredential>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let found: Option<DbId> =
            sqlx::query_scalar("SELECT id FROM worker_credentials WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if found.is_none() {
            return Ok(None);
        }

        let attempts = match outcome {
            ReleaseOutcome::Succeeded => "0",
            ReleaseOutcome::Failed => "attemp + 1",
        };
        let query = format!(
            "UPDATE worker_credentials \
             SET in_progress = false, last_time_finished = $2, attemp = {attempts} \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let credential = sqlx::query_as::<_, WorkerCredential>(&query)
            .bind(id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(credential))
    }

    /// Lock the credential built from exactly this triple so the warming
    /// pipeline can use it. Returns `None` if no such credential exists.
    pub async fn lock_for_use(
        pool: &PgPool,
        account_id: DbId,
        proxy_id: DbId,
        user_agent_id: DbId,
    ) -> Result<Option<WorkerCredential>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let id: Option<DbId> = sqlx::query_scalar(
            "SELECT id FROM worker_credentials \
             WHERE account_id = $1 AND proxy_id = $2 AND user_agent_id = $3 \
             FOR UPDATE",
        )
        .bind(account_id)
        .bind(proxy_id)
        .bind(user_agent_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            return Ok(None);
        };

        let query = format!(
            "UPDATE worker_credentials SET locked = true WHERE id = $1 RETURNING {COLUMNS}"
        );
        let credential = sqlx::query_as::<_, WorkerCredential>(&query)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(credential))
    }

    /// Distinct disabled proxies behind locked credentials whose last check
    /// is older than `cutoff`, oldest id first. `limit = None` returns all.
    pub async fn proxies_due_for_recheck(
        pool: &PgPool,
        cutoff: Timestamp,
        limit: Option<i64>,
    ) -> Result<Vec<ProxyRecheckCandidate>, sqlx::Error> {
        sqlx::query_as::<_, ProxyRecheckCandidate>(
            "SELECT DISTINCT p.id AS proxy_id, p.last_time_checked \
             FROM worker_credentials wc \
             JOIN proxies p ON p.id = wc.proxy_id \
             WHERE wc.locked = true \
               AND p.available = false \
               AND (p.last_time_checked IS NULL OR p.last_time_checked < $1) \
             ORDER BY p.id \
             LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
