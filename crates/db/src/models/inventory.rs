//! Raw credential inventory: accounts, proxies and user agents.

use fanout_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: DbId,
    pub login: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub available: bool,
    pub created_at: Timestamp,
}

/// A row from the `proxies` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Proxy {
    pub id: DbId,
    pub host: String,
    pub port: i32,
    pub login: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub available: bool,
    pub expiration_date: Option<Timestamp>,
    pub last_time_checked: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// A row from the `user_agents` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserAgent {
    pub id: DbId,
    pub user_agent_data: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccount {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProxy {
    pub host: String,
    pub port: i32,
    pub login: Option<String>,
    pub password: Option<String>,
    pub expiration_date: Option<Timestamp>,
}

/// A credential whose proxy needs a health recheck.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProxyRecheckCandidate {
    pub proxy_id: DbId,
    pub last_time_checked: Option<Timestamp>,
}
