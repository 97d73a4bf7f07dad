//! Repository for raw credential inventory.

use fanout_core::credentials::InventoryCounts;
use fanout_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::inventory::{Account, CreateAccount, CreateProxy, Proxy, UserAgent};

const ACCOUNT_COLUMNS: &str = "id, login, password, available, created_at";
const PROXY_COLUMNS: &str =
    "id, host, port, login, password, available, expiration_date, last_time_checked, created_at";
const USER_AGENT_COLUMNS: &str = "id, user_agent_data, created_at";

/// Provides inventory inserts and the warming headroom count.
pub struct InventoryRepo;

impl InventoryRepo {
    /// Insert an account. Returns `None` if the login already exists.
    pub async fn create_account(
        pool: &PgPool,
        input: &CreateAccount,
    ) -> Result<Option<Account>, sqlx::Error> {
        let query = format!(
            "INSERT INTO accounts (login, password) VALUES ($1, $2) \
             ON CONFLICT (login) DO NOTHING \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(&input.login)
            .bind(&input.password)
            .fetch_optional(pool)
            .await
    }

    /// Insert a proxy. Returns `None` if the same host/port/login exists,
    /// treating a missing login as one value.
    pub async fn create_proxy(
        pool: &PgPool,
        input: &CreateProxy,
    ) -> Result<Option<Proxy>, sqlx::Error> {
        let query = format!(
            "INSERT INTO proxies (host, port, login, password, expiration_date) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (host, port, (COALESCE(login, ''))) DO NOTHING \
             RETURNING {PROXY_COLUMNS}"
        );
        sqlx::query_as::<_, Proxy>(&query)
            .bind(&input.host)
            .bind(input.port)
            .bind(&input.login)
            .bind(&input.password)
            .bind(input.expiration_date)
            .fetch_optional(pool)
            .await
    }

    /// Insert a user agent. Returns `None` if the string already exists.
    pub async fn create_user_agent(
        pool: &PgPool,
        user_agent_data: &str,
    ) -> Result<Option<UserAgent>, sqlx::Error> {
        let query = format!(
            "INSERT INTO user_agents (user_agent_data) VALUES ($1) \
             ON CONFLICT (user_agent_data) DO NOTHING \
             RETURNING {USER_AGENT_COLUMNS}"
        );
        sqlx::query_as::<_, UserAgent>(&query)
            .bind(user_agent_data)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_account_available(
        pool: &PgPool,
        id: DbId,
        available: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE accounts SET available = $2 WHERE id = $1")
            .bind(id)
            .bind(available)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a proxy health check result.
    pub async fn set_proxy_available(
        pool: &PgPool,
        id: DbId,
        available: bool,
        checked_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE proxies SET available = $2, last_time_checked = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(available)
        .bind(checked_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Available inventory not yet paired into any credential.
    pub async fn unpaired_counts(pool: &PgPool) -> Result<InventoryCounts, sqlx::Error> {
        let (accounts, proxies, user_agents): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                (SELECT COUNT(*) FROM accounts a \
                  WHERE a.available = true \
                    AND NOT EXISTS (SELECT 1 FROM worker_credentials wc WHERE wc.account_id = a.id)), \
                (SELECT COUNT(*) FROM proxies p \
                  WHERE p.available = true \
                    AND NOT EXISTS (SELECT 1 FROM worker_credentials wc WHERE wc.proxy_id = p.id)), \
                (SELECT COUNT(*) FROM user_agents u \
                  WHERE NOT EXISTS (SELECT 1 FROM worker_credentials wc WHERE wc.user_agent_id = u.id))",
        )
        .fetch_one(pool)
        .await?;

        Ok(InventoryCounts {
            accounts,
            proxies,
            user_agents,
        })
    }
}
