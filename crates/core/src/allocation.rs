//! Capacity allocation across dispatch categories.
//!
//! Capacity is the number of usable worker credentials. Each cycle it is
//! split into per-category quotas by percentage; comments absorb whatever
//! the percentage-driven categories leave. Quotas are then consumed in a
//! fixed precedence order where unused quota may roll into the next stage.

use std::str::FromStr;

use crate::error::CoreError;
use crate::job_types;
use crate::status::SubjobKind;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Cycles with capacity at or below this value are skipped entirely.
pub const DEFAULT_CAPACITY_SKIP_THRESHOLD: u32 = 3;

/// Default share of capacity given to top-level jobs.
pub const DEFAULT_JOB_PERCENT: u32 = 100;

/// Default share of capacity given to each percentage-driven subjob kind.
pub const DEFAULT_SUBJOB_PERCENT: u32 = 0;

/// Upper bound for any single percentage.
const MAX_PERCENT: u32 = 100;

/// Whether a cycle with `capacity` usable credentials should be skipped.
pub fn should_skip(capacity: u32, threshold: u32) -> bool {
    capacity <= threshold
}

// ---------------------------------------------------------------------------
// Percentages and split
// ---------------------------------------------------------------------------

/// Configured capacity shares. Comments have no percentage: they receive
/// the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPercentages {
    pub job: u32,
    pub reaction: u32,
    pub share: u32,
    pub profile_extraction: u32,
}

impl Default for QuotaPercentages {
    fn default() -> Self {
        Self {
            job: DEFAULT_JOB_PERCENT,
            reaction: DEFAULT_SUBJOB_PERCENT,
            share: DEFAULT_SUBJOB_PERCENT,
            profile_extraction: DEFAULT_SUBJOB_PERCENT,
        }
    }
}

impl QuotaPercentages {
    /// Validate that every share is at most 100 and that together they do
    /// not exceed 100.
    pub fn validate(&self) -> Result<(), CoreError> {
        let named = [
            ("job", self.job),
            ("reaction", self.reaction),
            ("share", self.share),
            ("profile_extraction", self.profile_extraction),
        ];
        for (name, value) in named {
            if value > MAX_PERCENT {
                return Err(CoreError::Validation(format!(
                    "{name} quota percentage must be between 0 and {MAX_PERCENT}, got {value}"
                )));
            }
        }

        let total: u32 = named.iter().map(|(_, value)| value).sum();
        if total > MAX_PERCENT {
            return Err(CoreError::Validation(format!(
                "Quota percentages must not exceed {MAX_PERCENT} in total, got {total}"
            )));
        }
        Ok(())
    }
}

/// Per-category quotas for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuotaSplit {
    pub job: u32,
    pub reaction: u32,
    pub share: u32,
    pub profile_extraction: u32,
    pub comment: u32,
}

impl QuotaSplit {
    pub fn total(&self) -> u32 {
        self.job + self.reaction + self.share + self.profile_extraction + self.comment
    }
}

/// `round(capacity * percent / 100)`, halves rounded away from zero.
fn percent_of(capacity: u32, percent: u32) -> u32 {
    (f64::from(capacity) * f64::from(percent) / 100.0).round() as u32
}

/// Split `capacity` into per-category quotas.
///
/// The percentage-driven quotas are computed first and capped so they never
/// exceed the capacity together; comments take the remainder.
pub fn split_capacity(capacity: u32, percentages: &QuotaPercentages) -> QuotaSplit {
    let mut remaining = capacity;
    let mut take = |percent: u32| {
        let quota = percent_of(capacity, percent).min(remaining);
        remaining -= quota;
        quota
    };

    let job = take(percentages.job);
    let reaction = take(percentages.reaction);
    let share = take(percentages.share);
    let profile_extraction = take(percentages.profile_extraction);

    QuotaSplit {
        job,
        reaction,
        share,
        profile_extraction,
        comment: remaining,
    }
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// A dispatch category. Declaration order is the rollover precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    JobKeyword,
    JobSource,
    Reaction,
    Share,
    ProfileExtraction,
    Comment,
}

impl Category {
    pub const PRECEDENCE: [Category; 6] = [
        Category::JobKeyword,
        Category::JobSource,
        Category::Reaction,
        Category::Share,
        Category::ProfileExtraction,
        Category::Comment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::JobKeyword => "keyword",
            Category::JobSource => "source",
            Category::Reaction => "reaction",
            Category::Share => "share",
            Category::ProfileExtraction => "profile_extraction",
            Category::Comment => "comment",
        }
    }

    /// Identifier submitted to the job sink for items of this category.
    pub fn job_type(self) -> &'static str {
        match self {
            Category::JobKeyword => job_types::JOB_BY_KEYWORD,
            Category::JobSource => job_types::JOB_BY_SOURCE,
            Category::Reaction => job_types::SUBJOB_REACTION,
            Category::Share => job_types::SUBJOB_SHARE,
            Category::ProfileExtraction => job_types::SUBJOB_PROFILE_EXTRACTION,
            Category::Comment => job_types::SUBJOB_COMMENT,
        }
    }

    /// Subjob kind for subjob categories, `None` for top-level jobs.
    pub fn subjob_kind(self) -> Option<SubjobKind> {
        match self {
            Category::JobKeyword | Category::JobSource => None,
            Category::Reaction => Some(SubjobKind::Reaction),
            Category::Share => Some(SubjobKind::Share),
            Category::ProfileExtraction => Some(SubjobKind::ProfileExtraction),
            Category::Comment => Some(SubjobKind::Comment),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Rollover
// ---------------------------------------------------------------------------

/// Which stages pass their unused quota to the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RolloverPolicy {
    /// Only the job pool rolls over: keyword jobs hand what they did not use
    /// to source jobs. Subjob quotas left unused are dropped.
    #[default]
    JobsOnly,
    /// Every stage hands its unused quota to the next one.
    Chain,
}

impl FromStr for RolloverPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jobs" | "jobs_only" => Ok(Self::JobsOnly),
            "chain" => Ok(Self::Chain),
            other => Err(CoreError::Validation(format!(
                "Unknown rollover policy '{other}', expected 'jobs' or 'chain'"
            ))),
        }
    }
}

/// One step of the rollover chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub category: Category,
    pub quota: u32,
    pub carries_forward: bool,
}

impl Stage {
    /// Quota unused by this stage that the next stage receives.
    pub fn carry_out(&self, limit: u32, sent: u32) -> u32 {
        if self.carries_forward {
            limit.saturating_sub(sent)
        } else {
            0
        }
    }
}

/// Build the ordered stages for a split under `policy`.
///
/// Keyword jobs own the whole job quota; source jobs start at zero and
/// receive whatever keyword jobs left.
pub fn build_stages(split: &QuotaSplit, policy: RolloverPolicy) -> Vec<Stage> {
    let chain = policy == RolloverPolicy::Chain;
    Category::PRECEDENCE
        .into_iter()
        .map(|category| {
            let (quota, carries_forward) = match category {
                Category::JobKeyword => (split.job, true),
                Category::JobSource => (0, chain),
                Category::Reaction => (split.reaction, chain),
                Category::Share => (split.share, chain),
                Category::ProfileExtraction => (split.profile_extraction, chain),
                Category::Comment => (split.comment, false),
            };
            Stage {
                category,
                quota,
                carries_forward,
            }
        })
        .collect()
}

/// Tracks quota carried between stages while a cycle walks the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolloverCursor {
    carried: u32,
}

impl RolloverCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective limit for `stage`: its own quota plus what was carried in.
    pub fn limit_for(&self, stage: &Stage) -> u32 {
        stage.quota + self.carried
    }

    /// Record how many items `stage` actually sent under `limit`.
    pub fn record(&mut self, stage: &Stage, limit: u32, sent: u32) {
        self.carried = stage.carry_out(limit, sent);
    }

    /// Quota currently waiting for the next stage.
    pub fn carried(&self) -> u32 {
        self.carried
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// Walk `stages` with a fixed ready-queue length per category.
    fn simulate(stages: &[Stage], ready: impl Fn(Category) -> u32) -> Vec<(Category, u32)> {
        let mut cursor = RolloverCursor::new();
        stages
            .iter()
            .map(|stage| {
                let limit = cursor.limit_for(stage);
                let sent = limit.min(ready(stage.category));
                cursor.record(stage, limit, sent);
                (stage.category, sent)
            })
            .collect()
    }

    fn sent_for(result: &[(Category, u32)], category: Category) -> u32 {
        result
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, sent)| *sent)
            .unwrap()
    }

    // -- skip threshold -----------------------------------------------------

    #[test]
    fn capacity_at_threshold_is_skipped() {
        assert!(should_skip(0, DEFAULT_CAPACITY_SKIP_THRESHOLD));
        assert!(should_skip(3, DEFAULT_CAPACITY_SKIP_THRESHOLD));
        assert!(!should_skip(4, DEFAULT_CAPACITY_SKIP_THRESHOLD));
    }

    // -- split_capacity -----------------------------------------------------

    #[test]
    fn default_split_gives_everything_to_jobs() {
        let split = split_capacity(10, &QuotaPercentages::default());
        assert_eq!(split.job, 10);
        assert_eq!(split.comment, 0);
        assert_eq!(split.total(), 10);
    }

    #[test]
    fn comments_absorb_the_remainder() {
        let percentages = QuotaPercentages {
            job: 50,
            reaction: 20,
            share: 0,
            profile_extraction: 10,
        };
        let split = split_capacity(10, &percentages);
        assert_eq!(split.job, 5);
        assert_eq!(split.reaction, 2);
        assert_eq!(split.profile_extraction, 1);
        assert_eq!(split.comment, 2);
        assert_eq!(split.total(), 10);
    }

    #[test]
    fn split_rounds_to_nearest() {
        let percentages = QuotaPercentages {
            job: 75,
            ..QuotaPercentages::default()
        };
        // 7 * 0.75 = 5.25 -> 5
        assert_eq!(split_capacity(7, &percentages).job, 5);
        // 6 * 0.75 = 4.5 -> 5
        assert_eq!(split_capacity(6, &percentages).job, 5);
    }

    #[test]
    fn split_never_exceeds_capacity() {
        let percentages = QuotaPercentages {
            job: 50,
            reaction: 50,
            share: 0,
            profile_extraction: 0,
        };
        // 5 * 0.5 = 2.5 rounds up twice; the second share is capped.
        let split = split_capacity(5, &percentages);
        assert_eq!(split.job, 3);
        assert_eq!(split.reaction, 2);
        assert_eq!(split.comment, 0);
    }

    // -- validation ---------------------------------------------------------

    #[test]
    fn default_percentages_are_valid() {
        assert!(QuotaPercentages::default().validate().is_ok());
    }

    #[test]
    fn percentages_over_100_in_total_are_rejected() {
        let percentages = QuotaPercentages {
            job: 90,
            reaction: 20,
            share: 0,
            profile_extraction: 0,
        };
        assert_matches!(percentages.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn single_percentage_over_100_is_rejected() {
        let percentages = QuotaPercentages {
            job: 101,
            ..QuotaPercentages::default()
        };
        assert_matches!(percentages.validate(), Err(CoreError::Validation(_)));
    }

    // -- rollover -----------------------------------------------------------

    #[test]
    fn rollover_policy_parses_known_names() {
        assert_eq!("jobs".parse::<RolloverPolicy>().unwrap(), RolloverPolicy::JobsOnly);
        assert_eq!("Chain".parse::<RolloverPolicy>().unwrap(), RolloverPolicy::Chain);
        assert_matches!("all".parse::<RolloverPolicy>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn unused_quota_rolls_into_next_stage() {
        let stages = [
            Stage {
                category: Category::Reaction,
                quota: 2,
                carries_forward: true,
            },
            Stage {
                category: Category::Share,
                quota: 3,
                carries_forward: true,
            },
        ];
        let result = simulate(&stages, |c| match c {
            Category::Reaction => 0,
            _ => 100,
        });
        assert_eq!(sent_for(&result, Category::Reaction), 0);
        assert_eq!(sent_for(&result, Category::Share), 5);
    }

    #[test]
    fn source_jobs_take_what_keyword_jobs_left() {
        let split = split_capacity(10, &QuotaPercentages::default());
        let stages = build_stages(&split, RolloverPolicy::JobsOnly);
        let result = simulate(&stages, |c| match c {
            Category::JobKeyword => 3,
            _ => 100,
        });
        assert_eq!(sent_for(&result, Category::JobKeyword), 3);
        assert_eq!(sent_for(&result, Category::JobSource), 7);
        assert_eq!(sent_for(&result, Category::Comment), 0);
    }

    #[test]
    fn short_job_queue_wastes_quota_under_jobs_only() {
        let split = split_capacity(10, &QuotaPercentages::default());
        let stages = build_stages(&split, RolloverPolicy::JobsOnly);
        let result = simulate(&stages, |c| match c {
            Category::JobKeyword => 4,
            Category::JobSource => 0,
            _ => 100,
        });
        let total: u32 = result.iter().map(|(_, sent)| sent).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn short_job_queue_feeds_comments_under_chain() {
        let split = split_capacity(10, &QuotaPercentages::default());
        let stages = build_stages(&split, RolloverPolicy::Chain);
        let result = simulate(&stages, |c| match c {
            Category::JobKeyword => 4,
            Category::JobSource => 0,
            Category::Comment => 100,
            _ => 0,
        });
        assert_eq!(sent_for(&result, Category::Comment), 6);
    }

    #[test]
    fn stages_follow_precedence() {
        let stages = build_stages(&QuotaSplit::default(), RolloverPolicy::JobsOnly);
        let order: Vec<Category> = stages.iter().map(|s| s.category).collect();
        assert_eq!(order, Category::PRECEDENCE.to_vec());
    }

    #[test]
    fn categories_map_to_job_types() {
        assert_eq!(Category::JobKeyword.job_type(), job_types::JOB_BY_KEYWORD);
        assert_eq!(Category::Comment.job_type(), job_types::SUBJOB_COMMENT);
        assert_eq!(Category::Share.subjob_kind(), Some(SubjobKind::Share));
        assert_eq!(Category::JobSource.subjob_kind(), None);
    }
}
