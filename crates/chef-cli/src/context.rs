//! Shared setup for commands that need the generation pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;

use chef_core::generation::HttpGenerator;
use chef_core::kitchen::{Kitchen, KitchenConfig};
use chef_core::notify::TracingNotifier;
use chef_core::store::PgStore;
use chef_core::tracker::Tracker;

use crate::config::ChefConfig;

/// Extra time a recipe unit gets beyond its generation call.
const UNIT_GRACE: Duration = Duration::from_secs(30);

pub fn kitchen_config(config: &ChefConfig) -> KitchenConfig {
    KitchenConfig {
        generation_timeout: config.generation.request_timeout,
        unit_timeout: config.generation.request_timeout + UNIT_GRACE,
    }
}

/// Start a kitchen backed by Postgres and the configured HTTP generator.
pub fn start_kitchen(config: &ChefConfig, pool: &PgPool) -> Result<(Kitchen, Arc<PgStore>)> {
    let store = Arc::new(PgStore::new(pool.clone()));
    let generator = Arc::new(HttpGenerator::new(config.generation.clone())?);
    let kitchen = Kitchen::start(
        store.clone(),
        generator,
        Arc::new(TracingNotifier),
        &config.settings,
        kitchen_config(config),
    );
    Ok((kitchen, store))
}

/// Wait until none of `dishes` is in flight, or `timeout` passes.
/// Returns the dishes still running.
pub async fn wait_for_dishes(
    tracker: &Tracker,
    dishes: &BTreeSet<String>,
    timeout: Duration,
) -> BTreeSet<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let running: BTreeSet<String> = tracker
            .in_flight()
            .intersection(dishes)
            .cloned()
            .collect();
        if running.is_empty() || tokio::time::Instant::now() >= deadline {
            return running;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Print the outcome of each dish after its unit finished.
pub fn print_dish_results(tracker: &Tracker, dishes: &BTreeSet<String>) {
    for dish in dishes {
        match tracker.error_for(dish) {
            Some(error) => println!("  {dish}: failed ({error})"),
            None if tracker.is_in_flight(dish) => println!("  {dish}: still generating"),
            None => println!("  {dish}: ready"),
        }
    }
}
