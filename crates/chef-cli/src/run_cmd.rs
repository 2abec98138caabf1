//! `chef run`: the background scheduler as a foreground daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;

use chef_core::notify::TracingNotifier;
use chef_core::scheduler::{LocalScheduler, ScheduledTrigger, run_local};
use chef_core::settings::GenerationMode;

use crate::config::ChefConfig;
use crate::context::start_kitchen;
use crate::signal::shutdown_token;

/// Longest a single background run may take before it is cancelled.
const RUN_BUDGET: Duration = Duration::from_secs(600);

pub async fn run_scheduler(config: &ChefConfig, pool: &PgPool, mode: GenerationMode) -> Result<()> {
    let (kitchen, store) = start_kitchen(config, pool)?;
    let host = Arc::new(LocalScheduler::default());
    let trigger = Arc::new(ScheduledTrigger::new(
        Arc::clone(&kitchen.orchestrator),
        store,
        host.clone(),
        Arc::new(TracingNotifier),
        mode,
    ));

    println!("Scheduler running in {mode} mode. Ctrl+C to stop.");
    let cancel = shutdown_token();
    run_local(trigger, host, RUN_BUDGET, cancel).await;

    kitchen.shutdown().await;
    Ok(())
}
