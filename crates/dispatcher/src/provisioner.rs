//! Credential provisioning and inventory upkeep.
//!
//! None of these touch inventory rows themselves. They decide how much work
//! the worker fleet should do and submit it through the job sink.

use fanout_core::credentials::{InventoryCounts, LeasePolicy};
use fanout_core::job_types::{RECHECK_EGRESS_POINT, RELOGIN_DISABLED_ACCOUNTS, WARM_CREDENTIAL};
use fanout_core::types::{DbId, Timestamp};
use fanout_db::repositories::{CredentialRepo, InventoryRepo};
use fanout_db::DbPool;
use fanout_queue::{JobSink, OutboundJob};

use crate::error::DispatchError;

/// Outcome of one warming run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmingReport {
    pub inventory: InventoryCounts,
    pub submitted: i64,
}

/// Submit one warm-credential job per credential the idle inventory can
/// still produce. Submits nothing if any inventory kind is exhausted.
pub async fn warm_credentials(
    pool: &DbPool,
    sink: &dyn JobSink,
) -> Result<WarmingReport, DispatchError> {
    let inventory = InventoryRepo::unpaired_counts(pool).await?;
    let warmable = inventory.warmable();

    if warmable == 0 {
        tracing::warn!(
            exhausted = ?inventory.exhausted(),
            accounts = inventory.accounts,
            proxies = inventory.proxies,
            user_agents = inventory.user_agents,
            "Inventory exhausted, nothing to warm"
        );
        return Ok(WarmingReport {
            inventory,
            submitted: 0,
        });
    }

    for _ in 0..warmable {
        sink.submit(OutboundJob::new(WARM_CREDENTIAL)).await?;
    }
    tracing::info!(
        submitted = warmable,
        accounts = inventory.accounts,
        proxies = inventory.proxies,
        user_agents = inventory.user_agents,
        "Warming jobs submitted"
    );

    Ok(WarmingReport {
        inventory,
        submitted: warmable,
    })
}

/// Submit a health recheck for every disabled proxy still backing a locked
/// credential and not checked within the recheck window.
///
/// Returns the proxy ids submitted, at most `limit` of them.
pub async fn recheck_egress_points(
    pool: &DbPool,
    sink: &dyn JobSink,
    now: Timestamp,
    policy: &LeasePolicy,
    limit: Option<u32>,
) -> Result<Vec<DbId>, DispatchError> {
    let cutoff = policy.proxy_recheck_cutoff(now);
    let candidates =
        CredentialRepo::proxies_due_for_recheck(pool, cutoff, limit.map(i64::from)).await?;

    let mut submitted = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        sink.submit(OutboundJob::for_entity(RECHECK_EGRESS_POINT, candidate.proxy_id))
            .await?;
        tracing::debug!(
            proxy_id = candidate.proxy_id,
            last_time_checked = ?candidate.last_time_checked,
            "Egress point recheck submitted"
        );
        submitted.push(candidate.proxy_id);
    }

    tracing::info!(count = submitted.len(), ?limit, "Egress point recheck complete");
    Ok(submitted)
}

/// Ask the worker fleet to log disabled accounts back in.
pub async fn request_relogin(sink: &dyn JobSink) -> Result<(), DispatchError> {
    sink.submit(OutboundJob::new(RELOGIN_DISABLED_ACCOUNTS))
        .await?;
    tracing::info!("Re-login of disabled accounts requested");
    Ok(())
}
