//! Worker credential lease rules and inventory arithmetic.
//!
//! A credential is an (account, proxy, user agent) triple a remote worker
//! leases while it executes a job. These functions define when a credential
//! counts toward dispatch capacity, when its lease is considered abandoned,
//! and how many new credentials idle inventory can still produce.

use chrono::Duration;

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Minutes a credential rests after finishing before it is usable again.
pub const DEFAULT_ACCOUNT_COOLDOWN_MINUTES: i64 = 3;

/// Highest consecutive-failure count at which a credential is still usable.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 2;

/// Minutes without a heartbeat after which a claimed lease is abandoned.
pub const DEFAULT_HEARTBEAT_STALE_MINUTES: i64 = 5;

/// Minutes between health rechecks of the same disabled proxy.
pub const DEFAULT_PROXY_RECHECK_MINUTES: i64 = 20;

// ---------------------------------------------------------------------------
// Lease policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    pub cooldown: Duration,
    pub max_attempts: i32,
    pub heartbeat_stale_after: Duration,
    pub proxy_recheck_after: Duration,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::minutes(DEFAULT_ACCOUNT_COOLDOWN_MINUTES),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            heartbeat_stale_after: Duration::minutes(DEFAULT_HEARTBEAT_STALE_MINUTES),
            proxy_recheck_after: Duration::minutes(DEFAULT_PROXY_RECHECK_MINUTES),
        }
    }
}

impl LeasePolicy {
    /// Credentials that finished at or after this instant are still cooling down.
    pub fn cooldown_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.cooldown
    }

    /// Heartbeats older than this instant mark the lease as abandoned.
    pub fn heartbeat_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.heartbeat_stale_after
    }

    /// Proxies checked before this instant are due for another check.
    pub fn proxy_recheck_cutoff(&self, now: Timestamp) -> Timestamp {
        now - self.proxy_recheck_after
    }
}

/// The lease-relevant fields of a credential row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseState {
    pub in_progress: bool,
    pub attempts: i32,
    pub last_time_finished: Option<Timestamp>,
    pub alive_timestamp: Option<Timestamp>,
}

/// Whether a credential counts toward dispatch capacity at `now`.
pub fn is_usable(state: &LeaseState, now: Timestamp, policy: &LeasePolicy) -> bool {
    state.attempts <= policy.max_attempts
        && !state.in_progress
        && state
            .last_time_finished
            .map_or(true, |finished| finished < policy.cooldown_cutoff(now))
}

/// Whether a claimed credential's holder is presumed dead.
///
/// Leases without any heartbeat are never considered stale.
pub fn is_lease_stale(state: &LeaseState, now: Timestamp, policy: &LeasePolicy) -> bool {
    state.in_progress
        && state
            .alive_timestamp
            .is_some_and(|alive| alive < policy.heartbeat_cutoff(now))
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Idle inventory not yet paired into any credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InventoryCounts {
    pub accounts: i64,
    pub proxies: i64,
    pub user_agents: i64,
}

impl InventoryCounts {
    /// Number of new credentials the inventory can still produce.
    pub fn warmable(&self) -> i64 {
        self.accounts.min(self.proxies).min(self.user_agents).max(0)
    }

    /// Names of the inventory kinds that are exhausted.
    pub fn exhausted(&self) -> Vec<&'static str> {
        [
            ("accounts", self.accounts),
            ("proxies", self.proxies),
            ("user_agents", self.user_agents),
        ]
        .into_iter()
        .filter(|(_, count)| *count <= 0)
        .map(|(name, _)| name)
        .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
