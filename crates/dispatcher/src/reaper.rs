//! Recovery of credential leases whose holder stopped heartbeating.

use fanout_core::credentials::LeasePolicy;
use fanout_core::types::{DbId, Timestamp};
use fanout_db::repositories::CredentialRepo;
use fanout_db::DbPool;

use crate::error::DispatchError;

/// Free every lease whose heartbeat is older than the staleness window.
///
/// Rows are freed one transaction at a time; rows another transaction holds
/// are left for the next run. Returns the freed credential ids in order.
pub async fn reap_stale_leases(
    pool: &DbPool,
    now: Timestamp,
    policy: &LeasePolicy,
) -> Result<Vec<DbId>, DispatchError> {
    let cutoff = policy.heartbeat_cutoff(now);
    let mut freed = Vec::new();

    while let Some(id) = CredentialRepo::free_one_stale_lease(pool, cutoff).await? {
        tracing::info!(credential_id = id, "Freed stale credential lease");
        freed.push(id);
    }

    if freed.is_empty() {
        tracing::debug!("No stale credential leases");
    } else {
        tracing::info!(count = freed.len(), "Stale lease sweep complete");
    }
    Ok(freed)
}
