//! StudyBuddy Refresh Worker
//!
//! Keeps the per-user recommended-resources cache warm:
//! 1. Lists users holding a cache row, oldest refresh first
//! 2. Skips rows still newer than the user's latest activity
//! 3. Rebuilds stale rows through the shared curator
//! 4. Sleeps until the next interval tick

mod refresher;

use crate::refresher::CacheRefresher;
use std::time::Duration;
use studybuddy_common::clients::{
    create_completion_model, create_resource_search, create_weakness_store,
};
use studybuddy_common::config::AppConfig;
use studybuddy_common::db::DbPool;
use studybuddy_common::metrics::{self, record_refresh_run};
use studybuddy_common::VERSION;
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn, Level};

// Circuit breaker state
const MAX_FAILURES: u32 = 5;
const CIRCUIT_BREAK_DURATION: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting StudyBuddy Refresh Worker v{}", VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    let refresher = CacheRefresher::new(
        db,
        create_completion_model(&config.llm),
        create_resource_search(&config.search),
        create_weakness_store(&config.weakness_store),
        config.refresh.batch_limit,
    );

    let mut ticker = tokio::time::interval(config.refresh_interval());
    // A sweep can outlast a short interval; skip the catch-up burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = config.refresh.interval_secs,
        batch_limit = config.refresh.batch_limit,
        "Refresh worker ready, starting sweep loop..."
    );

    let mut consecutive_failures: u32 = 0;

    loop {
        // Circuit breaker check
        if consecutive_failures >= MAX_FAILURES {
            warn!(
                failures = consecutive_failures,
                "Circuit breaker open, pausing..."
            );
            tokio::time::sleep(CIRCUIT_BREAK_DURATION).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset, resuming...");
        }

        tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                match refresher.sweep().await {
                    Ok(stats) => {
                        record_refresh_run(stats.failed == 0);
                        consecutive_failures = 0;
                    }
                    Err(e) => {
                        record_refresh_run(false);
                        consecutive_failures += 1;
                        error!(
                            error = %e,
                            failures = consecutive_failures,
                            "Refresh sweep failed"
                        );
                    }
                }
            }
        }
    }

    info!("Refresh worker shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
