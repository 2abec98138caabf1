//! `chef generate`: plan a window now and wait for the shopping list.

use anyhow::Result;
use sqlx::PgPool;

use chef_core::generation::prompts::HISTORY_LIMIT;
use chef_core::kitchen::wait_for_settlement;
use chef_core::settings::GenerationMode;
use chef_core::settlement::{FulfillmentOutcome, SettlementReport};
use chef_core::store::PlanStore;

use crate::config::ChefConfig;
use crate::context::{self, start_kitchen};
use crate::signal::shutdown_token;

pub async fn run_generate(
    config: &ChefConfig,
    pool: &PgPool,
    mode: GenerationMode,
    wait: bool,
) -> Result<()> {
    let (kitchen, store) = start_kitchen(config, pool)?;
    let mut reports = kitchen.subscribe();

    let inventory = store.inventory().await?;
    let history = store.recent_history(HISTORY_LIMIT).await?;

    println!("Generating {mode} plan...");
    let set = kitchen
        .orchestrator
        .generate_plan(mode, &inventory, &history)
        .await?;

    for plan in &set.plans {
        println!(
            "  {}  {}  {:<9}  {}",
            plan.id,
            plan.plan_date,
            plan.meal_slot.to_string(),
            plan.menu_text
        );
    }
    if !set.reason.is_empty() {
        println!();
        println!("Why: {}", set.reason);
    }

    if !wait {
        println!();
        println!("Not waiting for recipes. Generate them later with");
        println!("`chef recipe show <plan-id> --generate`.");
        kitchen.shutdown().await;
        return Ok(());
    }

    println!();
    println!("Generating recipes for {} dishes...", set.dishes.len());
    let timeout = context::kitchen_config(config).unit_timeout * 2;
    let cancel = shutdown_token();

    let report = tokio::select! {
        _ = cancel.cancelled() => None,
        report = wait_for_settlement(&mut reports, set.epoch, timeout) => report,
    };

    match report {
        Some(report) => print_report(&report),
        None if cancel.is_cancelled() => {
            println!("Interrupted. Plans are saved; missing recipes can be generated later.");
        }
        None => {
            println!("Timed out waiting for recipes. Still running:");
            for dish in kitchen.tracker.in_flight() {
                println!("  - {dish}");
            }
        }
    }

    kitchen.shutdown().await;
    Ok(())
}

fn print_report(report: &SettlementReport) {
    let batch = &report.batch;
    println!(
        "Recipes ready: {}/{}",
        batch.dishes.len() - batch.failed.len(),
        batch.dishes.len()
    );
    for (dish, error) in &batch.failed {
        println!("  {dish}: {error}");
    }

    match &report.outcome {
        FulfillmentOutcome::Added(0) => println!("Shopping list: nothing new to buy."),
        FulfillmentOutcome::Added(n) => println!("Shopping list: added {n} items."),
        FulfillmentOutcome::Skipped => println!("Shopping list: auto-fill is off."),
        FulfillmentOutcome::Superseded => {
            println!("Shopping list: unchanged, a newer plan replaced this one.")
        }
        FulfillmentOutcome::Failed(error) => {
            println!("Shopping list: update failed ({error}). Run `chef shopping fill` to retry.");
        }
    }
}
