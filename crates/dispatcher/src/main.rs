use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fanout_dispatcher::config::DispatcherConfig;
use fanout_dispatcher::scheduler::Scheduler;
use fanout_queue::PgJobQueue;

/// How long shutdown waits for periodic jobs to finish their current run.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "fanout-dispatcher")]
#[command(about = "Credential-gated job dispatcher", long_about = None)]
struct Cli {
    /// Defaults to `run`.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run dispatch, reaper and warming on their schedules until stopped.
    Run,

    /// Run a single dispatch cycle and exit.
    Cycle,

    /// Free stale credential leases once and exit.
    Reap,

    /// Submit warming jobs for idle inventory once and exit.
    Warm,

    /// Submit health rechecks for disabled egress points and exit.
    RecheckProxies {
        /// Maximum number of rechecks to submit, overriding PROXY_RECHECK_LIMIT.
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Ask workers to log disabled accounts back in and exit.
    Relogin,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    // --- Configuration ---
    let mut config = DispatcherConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        dispatch_interval_secs = config.schedule.dispatch_interval.as_secs(),
        reaper_interval_secs = config.schedule.reaper_interval.as_secs(),
        warming_interval_secs = config.schedule.warming_interval.as_secs(),
        capacity_skip_threshold = config.policy.capacity_skip_threshold,
        rollover = ?config.policy.rollover,
        "Loaded dispatcher configuration"
    );

    // --- Database ---
    let pool = fanout_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    fanout_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    fanout_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Scheduler ---
    let command = cli.command.unwrap_or(Command::Run);
    if let Command::RecheckProxies { limit: Some(limit) } = command {
        config.policy.proxy_recheck_limit = Some(limit);
    }

    let sink = Arc::new(PgJobQueue::new(pool.clone()));
    let scheduler = Arc::new(Scheduler::new(pool, sink, config.policy, config.schedule));

    match command {
        Command::Run => run_until_shutdown(scheduler).await,
        Command::Cycle => {
            let report = scheduler.dispatch_once().await?;
            tracing::info!(sent = report.total_sent(), skipped = report.skipped, "Cycle finished");
        }
        Command::Reap => {
            let freed = scheduler.reap_once().await?;
            tracing::info!(freed = freed.len(), "Reap finished");
        }
        Command::Warm => scheduler.warm_once().await?,
        Command::RecheckProxies { .. } => {
            let submitted = scheduler.recheck_once().await?;
            tracing::info!(submitted = submitted.len(), "Recheck finished");
        }
        Command::Relogin => scheduler.relogin_once().await?,
    }

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fanout_dispatcher=debug,fanout_db=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_until_shutdown(scheduler: Arc<Scheduler>) {
    let cancel = CancellationToken::new();
    let handles = scheduler.spawn(cancel.clone());
    tracing::info!(jobs = handles.len(), "Dispatcher started");

    shutdown_signal().await;

    cancel.cancel();
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(handles)).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Periodic job panicked");
                }
            }
            tracing::info!("Graceful shutdown complete");
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Periodic jobs did not stop in time, exiting anyway"
            );
        }
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
