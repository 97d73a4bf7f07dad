//! Job eligibility tiers and their evaluation rules.
//!
//! A dispatch cycle picks due jobs from exactly one tier: the first tier in
//! [`Tier::CASCADE`] that has at least one member. Tiers are never mixed.
//!
//! The repository layer in `fanout_db` expresses the same rules as SQL. The
//! in-memory evaluation here is the reference the SQL is tested against and
//! lives in `core` so it carries no database dependency.

use chrono::Duration;

use crate::status::TaskStatus;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Minutes a job in `retry` waits after `finish_time` before it is due again.
pub const DEFAULT_RETRY_DELAY_MINUTES: i64 = 3;

/// Staleness floor (hours) for new and recurring jobs without urgent priority.
pub const DEFAULT_STALENESS_FLOOR_HOURS: i64 = 48;

/// Looser staleness floor (hours) used by the fallback recurring tier.
pub const DEFAULT_FALLBACK_FLOOR_HOURS: i64 = 24;

/// Priority value that bypasses the staleness floor.
pub const PRIORITY_URGENT: i32 = 1;

/// Non-urgent priorities that are subject to the staleness floor.
/// A `NULL` priority behaves like these.
pub const PRIORITY_REGULAR: [i32; 2] = [2, 3];

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Time windows that drive tier membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub retry_delay: Duration,
    pub staleness_floor: Duration,
    pub fallback_staleness_floor: Duration,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::minutes(DEFAULT_RETRY_DELAY_MINUTES),
            staleness_floor: Duration::hours(DEFAULT_STALENESS_FLOOR_HOURS),
            fallback_staleness_floor: Duration::hours(DEFAULT_FALLBACK_FLOOR_HOURS),
        }
    }
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// One of the four mutually exclusive eligibility rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Never dispatched.
    New,
    /// Reported `retry` by a worker and past the retry delay.
    Retry,
    /// Recurring job whose interval elapsed, 2-day staleness floor.
    RecurringDue,
    /// Same as [`Tier::RecurringDue`] with the looser 1-day floor.
    FallbackRecurringDue,
}

/// Column a tier orders its members by (ascending, ties broken by id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierOrder {
    Id,
    ReceivedTime,
    FinishTime,
}

impl Tier {
    /// Evaluation order. The first non-empty tier wins.
    pub const CASCADE: [Tier; 4] = [
        Tier::New,
        Tier::Retry,
        Tier::RecurringDue,
        Tier::FallbackRecurringDue,
    ];

    /// 1-based position in the cascade.
    pub fn number(self) -> u8 {
        match self {
            Tier::New => 1,
            Tier::Retry => 2,
            Tier::RecurringDue => 3,
            Tier::FallbackRecurringDue => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::New => "new",
            Tier::Retry => "retry",
            Tier::RecurringDue => "recurring_due",
            Tier::FallbackRecurringDue => "fallback_recurring_due",
        }
    }

    pub fn order(self) -> TierOrder {
        match self {
            Tier::New => TierOrder::Id,
            Tier::Retry => TierOrder::ReceivedTime,
            Tier::RecurringDue | Tier::FallbackRecurringDue => TierOrder::FinishTime,
        }
    }

    /// The cutoff timestamp this tier compares `finish_time` against.
    ///
    /// For [`Tier::Retry`] a job qualifies when `finish_time < cutoff`; for
    /// every other tier the cutoff is the staleness floor of the priority
    /// guard.
    pub fn cutoff(self, now: Timestamp, policy: &TierPolicy) -> Timestamp {
        match self {
            Tier::New | Tier::RecurringDue => now - policy.staleness_floor,
            Tier::Retry => now - policy.retry_delay,
            Tier::FallbackRecurringDue => now - policy.fallback_staleness_floor,
        }
    }

    /// Whether `job` belongs to this tier at `now`.
    pub fn matches(self, job: &JobSnapshot, now: Timestamp, policy: &TierPolicy) -> bool {
        let cutoff = self.cutoff(now, policy);
        match self {
            Tier::New => job.status.is_none() && passes_priority_guard(job, cutoff),
            Tier::Retry => {
                job.status == Some(TaskStatus::Retry)
                    && job.finish_time.map_or(true, |finished| finished < cutoff)
            }
            Tier::RecurringDue | Tier::FallbackRecurringDue => {
                job.received_time.is_some()
                    && job.enabled
                    && job.status == Some(TaskStatus::Success)
                    && job.next_run_at().is_some_and(|due| due <= now)
                    && passes_priority_guard(job, cutoff)
            }
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Snapshot evaluation
// ---------------------------------------------------------------------------

/// The subset of a job row that tier membership depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: DbId,
    pub status: Option<TaskStatus>,
    pub priority: Option<i32>,
    pub enabled: bool,
    pub interval_minutes: i32,
    pub received_time: Option<Timestamp>,
    pub finish_time: Option<Timestamp>,
}

impl JobSnapshot {
    /// When a recurring job becomes due again: `finish_time + interval`.
    pub fn next_run_at(&self) -> Option<Timestamp> {
        self.finish_time
            .map(|finished| finished + Duration::minutes(i64::from(self.interval_minutes)))
    }

    fn sort_key(&self, order: TierOrder) -> Option<Timestamp> {
        match order {
            TierOrder::Id => None,
            TierOrder::ReceivedTime => self.received_time,
            TierOrder::FinishTime => self.finish_time,
        }
    }
}

/// Urgent jobs always pass; regular or unset priorities pass only when they
/// never finished or finished before `stale_before`; any other priority fails.
pub fn passes_priority_guard(job: &JobSnapshot, stale_before: Timestamp) -> bool {
    match job.priority {
        Some(PRIORITY_URGENT) => true,
        None => job.finish_time.map_or(true, |finished| finished < stale_before),
        Some(p) if PRIORITY_REGULAR.contains(&p) => {
            job.finish_time.map_or(true, |finished| finished < stale_before)
        }
        Some(_) => false,
    }
}

/// Result of one cascade evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueSelection {
    pub tier: Tier,
    pub job_ids: Vec<DbId>,
}

/// Evaluate the cascade over in-memory snapshots.
///
/// Returns `None` when every tier is empty. Ordering follows
/// [`Tier::order`] with missing timestamps sorted last, matching PostgreSQL's
/// `ASC NULLS LAST` default.
pub fn select_due(jobs: &[JobSnapshot], now: Timestamp, policy: &TierPolicy) -> Option<DueSelection> {
    Tier::CASCADE.into_iter().find_map(|tier| {
        let mut members: Vec<&JobSnapshot> =
            jobs.iter().filter(|job| tier.matches(job, now, policy)).collect();
        if members.is_empty() {
            return None;
        }

        let order = tier.order();
        members.sort_by_key(|job| {
            let key = job.sort_key(order);
            (order != TierOrder::Id && key.is_none(), key, job.id)
        });

        Some(DueSelection {
            tier,
            job_ids: members.into_iter().map(|job| job.id).collect(),
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
