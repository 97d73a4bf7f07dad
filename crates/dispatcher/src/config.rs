use std::str::FromStr;
use std::time::Duration;

use fanout_core::allocation::{
    QuotaPercentages, RolloverPolicy, DEFAULT_CAPACITY_SKIP_THRESHOLD, DEFAULT_JOB_PERCENT,
    DEFAULT_SUBJOB_PERCENT,
};
use fanout_core::credentials::{
    LeasePolicy, DEFAULT_ACCOUNT_COOLDOWN_MINUTES, DEFAULT_HEARTBEAT_STALE_MINUTES,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PROXY_RECHECK_MINUTES,
};
use fanout_core::eligibility::{
    TierPolicy, DEFAULT_FALLBACK_FLOOR_HOURS, DEFAULT_RETRY_DELAY_MINUTES,
    DEFAULT_STALENESS_FLOOR_HOURS,
};
use fanout_core::error::CoreError;

const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 30;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 300;
const DEFAULT_WARMING_INTERVAL_SECS: u64 = 180;

/// Upper bound for every minute/hour window: ten years.
const MAX_WINDOW_HOURS: u32 = 24 * 365 * 10;
const MAX_WINDOW_MINUTES: u32 = MAX_WINDOW_HOURS * 60;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Cadence of the periodic jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub dispatch_interval: Duration,
    pub reaper_interval: Duration,
    pub warming_interval: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_secs(DEFAULT_DISPATCH_INTERVAL_SECS),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            warming_interval: Duration::from_secs(DEFAULT_WARMING_INTERVAL_SECS),
        }
    }
}

/// Everything the dispatch cycle and the maintenance jobs decide with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    pub capacity_skip_threshold: u32,
    pub tiers: TierPolicy,
    pub leases: LeasePolicy,
    pub quotas: QuotaPercentages,
    pub rollover: RolloverPolicy,
    /// Maximum recheck submissions per run, `None` for no limit.
    pub proxy_recheck_limit: Option<u32>,
    pub proxy_recheck_on_warming: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            capacity_skip_threshold: DEFAULT_CAPACITY_SKIP_THRESHOLD,
            tiers: TierPolicy::default(),
            leases: LeasePolicy::default(),
            quotas: QuotaPercentages::default(),
            rollover: RolloverPolicy::default(),
            proxy_recheck_limit: None,
            proxy_recheck_on_warming: false,
        }
    }
}

/// Dispatcher configuration loaded from environment variables.
///
/// | Env Var                    | Default |
/// |----------------------------|---------|
/// | `DATABASE_URL`             | required |
/// | `DATABASE_MAX_CONNECTIONS` | `10`    |
/// | `DISPATCH_INTERVAL_SECS`   | `30`    |
/// | `REAPER_INTERVAL_SECS`     | `300`   |
/// | `WARMING_INTERVAL_SECS`    | `180`   |
/// | `ACCOUNT_COOLDOWN_MINUTES` | `3`     |
/// | `MAX_CREDENTIAL_ATTEMPTS`  | `2`     |
/// | `CAPACITY_SKIP_THRESHOLD`  | `3`     |
/// | `HEARTBEAT_STALE_MINUTES`  | `5`     |
/// | `RETRY_DELAY_MINUTES`      | `3`     |
/// | `RECURRING_FLOOR_HOURS`    | `48`    |
/// | `FALLBACK_FLOOR_HOURS`     | `24`    |
/// | `PROXY_RECHECK_MINUTES`    | `20`    |
/// | `PROXY_RECHECK_LIMIT`      | unset   |
/// | `PROXY_RECHECK_ON_WARMING` | `false` |
/// | `JOB_QUOTA_PERCENT`        | `100`   |
/// | `REACTION_QUOTA_PERCENT`   | `0`     |
/// | `SHARE_QUOTA_PERCENT`      | `0`     |
/// | `PROFILE_QUOTA_PERCENT`    | `0`     |
/// | `QUOTA_ROLLOVER`           | `jobs`  |
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub schedule: Schedule,
    pub policy: DispatchPolicy,
}

impl DispatcherConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let database_url = env
            .raw("DATABASE_URL")
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let schedule = Schedule {
            dispatch_interval: Duration::from_secs(
                env.parse("DISPATCH_INTERVAL_SECS", DEFAULT_DISPATCH_INTERVAL_SECS)?,
            ),
            reaper_interval: Duration::from_secs(
                env.parse("REAPER_INTERVAL_SECS", DEFAULT_REAPER_INTERVAL_SECS)?,
            ),
            warming_interval: Duration::from_secs(
                env.parse("WARMING_INTERVAL_SECS", DEFAULT_WARMING_INTERVAL_SECS)?,
            ),
        };
        for (var, interval) in [
            ("DISPATCH_INTERVAL_SECS", schedule.dispatch_interval),
            ("REAPER_INTERVAL_SECS", schedule.reaper_interval),
            ("WARMING_INTERVAL_SECS", schedule.warming_interval),
        ] {
            if interval.is_zero() {
                return Err(ConfigError::Invalid {
                    var,
                    value: "0".into(),
                    reason: "interval must be positive".into(),
                });
            }
        }

        let tiers = TierPolicy {
            retry_delay: env.minutes("RETRY_DELAY_MINUTES", DEFAULT_RETRY_DELAY_MINUTES)?,
            staleness_floor: env.hours("RECURRING_FLOOR_HOURS", DEFAULT_STALENESS_FLOOR_HOURS)?,
            fallback_staleness_floor: env
                .hours("FALLBACK_FLOOR_HOURS", DEFAULT_FALLBACK_FLOOR_HOURS)?,
        };

        let leases = LeasePolicy {
            cooldown: env.minutes("ACCOUNT_COOLDOWN_MINUTES", DEFAULT_ACCOUNT_COOLDOWN_MINUTES)?,
            max_attempts: env.parse("MAX_CREDENTIAL_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            heartbeat_stale_after: env
                .minutes("HEARTBEAT_STALE_MINUTES", DEFAULT_HEARTBEAT_STALE_MINUTES)?,
            proxy_recheck_after: env
                .minutes("PROXY_RECHECK_MINUTES", DEFAULT_PROXY_RECHECK_MINUTES)?,
        };

        let quotas = QuotaPercentages {
            job: env.parse("JOB_QUOTA_PERCENT", DEFAULT_JOB_PERCENT)?,
            reaction: env.parse("REACTION_QUOTA_PERCENT", DEFAULT_SUBJOB_PERCENT)?,
            share: env.parse("SHARE_QUOTA_PERCENT", DEFAULT_SUBJOB_PERCENT)?,
            profile_extraction: env.parse("PROFILE_QUOTA_PERCENT", DEFAULT_SUBJOB_PERCENT)?,
        };
        quotas.validate()?;

        let proxy_recheck_limit = match env.raw("PROXY_RECHECK_LIMIT") {
            None => None,
            Some(value) => Some(parse_value("PROXY_RECHECK_LIMIT", &value)?),
        };

        let policy = DispatchPolicy {
            capacity_skip_threshold: env
                .parse("CAPACITY_SKIP_THRESHOLD", DEFAULT_CAPACITY_SKIP_THRESHOLD)?,
            tiers,
            leases,
            quotas,
            rollover: env.parse("QUOTA_ROLLOVER", RolloverPolicy::default())?,
            proxy_recheck_limit,
            proxy_recheck_on_warming: env.parse("PROXY_RECHECK_ON_WARMING", false)?,
        };

        Ok(Self {
            database_url,
            database_max_connections: env
                .parse("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
            schedule,
            policy,
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value, with empty strings treated as unset.
    fn raw(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(var) {
            None => Ok(default),
            Some(value) => parse_value(var, &value),
        }
    }

    /// A non-negative window in minutes, capped at ten years.
    fn minutes(&self, var: &'static str, default: i64) -> Result<chrono::Duration, ConfigError> {
        self.window(var, default, MAX_WINDOW_MINUTES, chrono::Duration::try_minutes)
    }

    /// A non-negative window in hours, capped at ten years.
    fn hours(&self, var: &'static str, default: i64) -> Result<chrono::Duration, ConfigError> {
        self.window(var, default, MAX_WINDOW_HOURS, chrono::Duration::try_hours)
    }

    fn window(
        &self,
        var: &'static str,
        default: i64,
        max: u32,
        to_duration: fn(i64) -> Option<chrono::Duration>,
    ) -> Result<chrono::Duration, ConfigError> {
        let amount = match self.raw(var) {
            None => default,
            Some(value) => {
                let amount: u32 = parse_value(var, &value)?;
                if amount > max {
                    return Err(ConfigError::Invalid {
                        var,
                        value,
                        reason: format!("must be at most {max}"),
                    });
                }
                i64::from(amount)
            }
        };
        to_duration(amount).ok_or_else(|| ConfigError::Invalid {
            var,
            value: amount.to_string(),
            reason: "out of range".into(),
        })
    }
}

fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
