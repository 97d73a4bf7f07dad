//! One dispatch cycle.
//!
//! Capacity is read from the credential ledger, split into per-category
//! quotas and walked in precedence order. Every selected id is marked as
//! sent before it is submitted. A submission failure puts that row back the
//! way it was and aborts the rest of the cycle.

use fanout_core::allocation::{build_stages, should_skip, split_capacity, Category, RolloverCursor};
use fanout_core::eligibility::Tier;
use fanout_core::types::{DbId, Timestamp};
use fanout_db::models::job::JobKind;
use fanout_db::repositories::{CredentialRepo, JobRepo, SubjobRepo};
use fanout_db::DbPool;
use fanout_queue::{JobSink, OutboundJob};

use crate::config::DispatchPolicy;
use crate::error::DispatchError;

/// What a single category did during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryOutcome {
    pub category: Category,
    /// Own quota plus whatever rolled in from the previous stage.
    pub limit: u32,
    pub sent: u32,
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub capacity: u32,
    pub skipped: bool,
    /// Eligibility tier the job categories drew from, if any job was due.
    pub tier: Option<Tier>,
    pub categories: Vec<CategoryOutcome>,
}

impl CycleReport {
    fn skipped(capacity: u32) -> Self {
        Self {
            capacity,
            skipped: true,
            tier: None,
            categories: Vec::new(),
        }
    }

    pub fn sent(&self, category: Category) -> u32 {
        self.categories
            .iter()
            .find(|outcome| outcome.category == category)
            .map_or(0, |outcome| outcome.sent)
    }

    pub fn total_sent(&self) -> u32 {
        self.categories.iter().map(|outcome| outcome.sent).sum()
    }

    /// Capacity this cycle left on the table.
    pub fn unused(&self) -> u32 {
        if self.skipped {
            return self.capacity;
        }
        self.capacity.saturating_sub(self.total_sent())
    }
}

/// Run one dispatch cycle at `now`.
pub async fn run_cycle(
    pool: &DbPool,
    sink: &dyn JobSink,
    policy: &DispatchPolicy,
    now: Timestamp,
) -> Result<CycleReport, DispatchError> {
    let available = CredentialRepo::count_available(pool, now, &policy.leases).await?;
    let capacity = u32::try_from(available).unwrap_or(u32::MAX);

    if should_skip(capacity, policy.capacity_skip_threshold) {
        tracing::debug!(
            capacity,
            threshold = policy.capacity_skip_threshold,
            "Not enough usable credentials, skipping cycle"
        );
        return Ok(CycleReport::skipped(capacity));
    }

    let split = split_capacity(capacity, &policy.quotas);
    let stages = build_stages(&split, policy.rollover);

    // Keyword and source jobs only ever draw on the job quota, so the
    // cascade is evaluated once per cycle and only when that quota exists.
    let tier = if split.job > 0 {
        JobRepo::current_tier(pool, now, &policy.tiers).await?
    } else {
        None
    };

    let mut cursor = RolloverCursor::new();
    let mut categories = Vec::with_capacity(stages.len());

    for stage in &stages {
        let limit = cursor.limit_for(stage);
        let ids = if limit == 0 {
            Vec::new()
        } else {
            ready_ids(pool, stage.category, tier, now, policy, limit).await?
        };

        let mut sent = 0;
        for id in ids {
            if send(pool, sink, stage.category, id, now).await? {
                sent += 1;
            }
        }

        cursor.record(stage, limit, sent);
        categories.push(CategoryOutcome {
            category: stage.category,
            limit,
            sent,
        });
    }

    let report = CycleReport {
        capacity,
        skipped: false,
        tier,
        categories,
    };

    tracing::info!(
        capacity,
        tier = tier.map(Tier::name),
        keyword = report.sent(Category::JobKeyword),
        source = report.sent(Category::JobSource),
        reaction = report.sent(Category::Reaction),
        share = report.sent(Category::Share),
        profile_extraction = report.sent(Category::ProfileExtraction),
        comment = report.sent(Category::Comment),
        unused = report.unused(),
        "Dispatch cycle complete"
    );

    Ok(report)
}

/// Up to `limit` dispatchable ids for `category`, in dispatch order.
async fn ready_ids(
    pool: &DbPool,
    category: Category,
    tier: Option<Tier>,
    now: Timestamp,
    policy: &DispatchPolicy,
    limit: u32,
) -> Result<Vec<DbId>, DispatchError> {
    let limit = i64::from(limit);
    if let Some(kind) = category.subjob_kind() {
        return Ok(SubjobRepo::ready_ids(pool, kind, limit).await?);
    }

    let Some(tier) = tier else {
        return Ok(Vec::new());
    };
    let kind = match category {
        Category::JobKeyword => JobKind::Keyword,
        _ => JobKind::Source,
    };
    Ok(JobRepo::due_ids(pool, tier, now, &policy.tiers, Some(kind), limit).await?)
}

/// Mark one entity as sent and submit it. Returns `false` if the row
/// disappeared between selection and marking.
///
/// A failed submission restores the entity's prior status before the error
/// is returned, so it stays eligible for the next cycle.
async fn send(
    pool: &DbPool,
    sink: &dyn JobSink,
    category: Category,
    id: DbId,
    now: Timestamp,
) -> Result<bool, DispatchError> {
    let is_subjob = category.subjob_kind().is_some();
    let prior = if is_subjob {
        SubjobRepo::mark_sent(pool, id).await?
    } else {
        JobRepo::mark_sent(pool, id, now).await?
    };
    let Some(prior) = prior else {
        tracing::warn!(%category, id, "Selected row vanished before dispatch");
        return Ok(false);
    };

    if let Err(e) = sink.submit(OutboundJob::for_entity(category.job_type(), id)).await {
        let restored = if is_subjob {
            SubjobRepo::unmark_sent(pool, id, &prior).await
        } else {
            JobRepo::unmark_sent(pool, id, &prior, now).await
        };
        match restored {
            Ok(true) => tracing::debug!(%category, id, "Restored status after failed submission"),
            Ok(false) => {
                tracing::warn!(%category, id, "Row changed before its status could be restored")
            }
            Err(db) => {
                tracing::error!(%category, id, error = %db, "Failed to restore status")
            }
        }
        return Err(e.into());
    }

    tracing::debug!(%category, id, "Dispatched");
    Ok(true)
}
