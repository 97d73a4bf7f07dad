//! Periodic job scheduler.
//!
//! Dispatch, lease reaping and warming each run on their own
//! `tokio::time::interval` with no coordination between them. The database
//! is the only thing that serializes their effects.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fanout_core::types::DbId;
use fanout_db::DbPool;
use fanout_queue::JobSink;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{DispatchPolicy, Schedule};
use crate::cycle::{run_cycle, CycleReport};
use crate::error::DispatchError;
use crate::{provisioner, reaper};

/// Owns the shared state of the periodic jobs.
pub struct Scheduler {
    pool: DbPool,
    sink: Arc<dyn JobSink>,
    policy: DispatchPolicy,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(
        pool: DbPool,
        sink: Arc<dyn JobSink>,
        policy: DispatchPolicy,
        schedule: Schedule,
    ) -> Self {
        Self {
            pool,
            sink,
            policy,
            schedule,
        }
    }

    /// Spawn every periodic job. Each one stops when `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let dispatch = {
            let this = Arc::clone(&self);
            tokio::spawn(run_periodic(
                "dispatch",
                self.schedule.dispatch_interval,
                cancel.clone(),
                move || {
                    let this = Arc::clone(&this);
                    async move { this.dispatch_once().await.map(drop) }
                },
            ))
        };

        let reaper = {
            let this = Arc::clone(&self);
            tokio::spawn(run_periodic(
                "reaper",
                self.schedule.reaper_interval,
                cancel.clone(),
                move || {
                    let this = Arc::clone(&this);
                    async move { this.reap_once().await.map(drop) }
                },
            ))
        };

        let warming = {
            let this = Arc::clone(&self);
            tokio::spawn(run_periodic(
                "warming",
                self.schedule.warming_interval,
                cancel,
                move || {
                    let this = Arc::clone(&this);
                    async move { this.warm_once().await }
                },
            ))
        };

        vec![dispatch, reaper, warming]
    }

    pub async fn dispatch_once(&self) -> Result<CycleReport, DispatchError> {
        run_cycle(&self.pool, self.sink.as_ref(), &self.policy, Utc::now()).await
    }

    pub async fn reap_once(&self) -> Result<Vec<DbId>, DispatchError> {
        reaper::reap_stale_leases(&self.pool, Utc::now(), &self.policy.leases).await
    }

    /// Warm new credentials, then recheck egress points if configured to
    /// ride along with warming.
    pub async fn warm_once(&self) -> Result<(), DispatchError> {
        provisioner::warm_credentials(&self.pool, self.sink.as_ref()).await?;
        if self.policy.proxy_recheck_on_warming {
            self.recheck_once().await?;
        }
        Ok(())
    }

    pub async fn recheck_once(&self) -> Result<Vec<DbId>, DispatchError> {
        provisioner::recheck_egress_points(
            &self.pool,
            self.sink.as_ref(),
            Utc::now(),
            &self.policy.leases,
            self.policy.proxy_recheck_limit,
        )
        .await
    }

    pub async fn relogin_once(&self) -> Result<(), DispatchError> {
        provisioner::request_relogin(self.sink.as_ref()).await
    }
}

/// Run `job` every `period` until `cancel` fires.
///
/// The first tick fires immediately. A run that overruns its period delays
/// the next one instead of bursting. Errors are logged and the loop keeps
/// going; a run in progress is never interrupted by cancellation.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), DispatchError>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(job = name, period_secs = period.as_secs(), "Periodic job started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job = name, "Periodic job stopping");
                break;
            }
            _ = interval.tick() => {
                let span = tracing::info_span!("periodic_job", job = name);
                if let Err(e) = job().instrument(span).await {
                    tracing::error!(job = name, error = %e, "Periodic job failed");
                }
            }
        }
    }
}
