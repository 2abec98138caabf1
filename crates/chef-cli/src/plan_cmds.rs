//! Handlers for `chef plan` and `chef recipe`.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{Days, Local, NaiveDate};
use sqlx::PgPool;
use uuid::Uuid;

use chef_db::models::{MealPlan, Recipe};
use chef_core::orchestrator::StockUsage;
use chef_db::queries::{inventory, meal_plans, recipes};

use crate::config::ChefConfig;
use crate::context::{self, start_kitchen};
use crate::PlanCommands;

pub async fn run_plan_command(command: PlanCommands, config: &ChefConfig, pool: &PgPool) -> Result<()> {
    match command {
        PlanCommands::Show { date, days } => cmd_show(pool, date, days).await,
        PlanCommands::Complete { plan_id, used } => cmd_complete(config, pool, &plan_id, &used).await,
        PlanCommands::Delete { plan_id } => cmd_delete(config, pool, &plan_id).await,
        PlanCommands::Rename { plan_id, menu } => cmd_rename(config, pool, &plan_id, &menu).await,
    }
}

pub fn parse_id(input: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(input).with_context(|| format!("invalid {what} ID: {input}"))
}

async fn load_plan(pool: &PgPool, id: Uuid) -> Result<MealPlan> {
    meal_plans::get_plan(pool, id)
        .await?
        .with_context(|| format!("meal plan {id} not found"))
}

// -----------------------------------------------------------------------
// chef plan show
// -----------------------------------------------------------------------

async fn cmd_show(pool: &PgPool, date: Option<NaiveDate>, days: u64) -> Result<()> {
    let from = date.unwrap_or_else(|| Local::now().date_naive());
    let until = from
        .checked_add_days(Days::new(days.max(1)))
        .context("date out of range")?;
    let plans = meal_plans::list_plans_between(pool, from, until).await?;

    if plans.is_empty() {
        println!("No plans from {from}. Use `chef generate` to create some.");
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:<9}  {:<9}  MENU", "ID", "DATE", "SLOT", "STATUS");
    for plan in &plans {
        println!(
            "{:<36}  {:<10}  {:<9}  {:<9}  {}",
            plan.id,
            plan.plan_date,
            plan.meal_slot.to_string(),
            plan.status.to_string(),
            plan.menu_text
        );
    }
    Ok(())
}

// -----------------------------------------------------------------------
// chef plan complete / delete / rename
// -----------------------------------------------------------------------

async fn cmd_complete(config: &ChefConfig, pool: &PgPool, plan_id: &str, used: &[StockUsage]) -> Result<()> {
    let id = parse_id(plan_id, "plan")?;
    let (kitchen, _) = start_kitchen(config, pool)?;
    let result = kitchen.orchestrator.complete_plan(id, used).await;
    kitchen.shutdown().await;

    let plan = result?;
    println!("Completed {} {}: {}", plan.plan_date, plan.meal_slot, plan.menu_text);
    if !used.is_empty() {
        for item in inventory::list_items(pool).await? {
            if used.iter().any(|u| u.item_id == item.id) {
                println!("  {}: {} left", item.name, item.count);
            }
        }
    }
    Ok(())
}

async fn cmd_delete(config: &ChefConfig, pool: &PgPool, plan_id: &str) -> Result<()> {
    let id = parse_id(plan_id, "plan")?;
    let (kitchen, _) = start_kitchen(config, pool)?;
    let result = kitchen.orchestrator.delete_plan(id).await;
    kitchen.shutdown().await;

    let plan = result?;
    println!("Deleted {} {}: {}", plan.plan_date, plan.meal_slot, plan.menu_text);
    Ok(())
}

async fn cmd_rename(config: &ChefConfig, pool: &PgPool, plan_id: &str, menu: &str) -> Result<()> {
    let id = parse_id(plan_id, "plan")?;
    let (kitchen, _) = start_kitchen(config, pool)?;

    let plan = match kitchen.orchestrator.rename_plan(id, menu).await {
        Ok(plan) => plan,
        Err(e) => {
            kitchen.shutdown().await;
            return Err(e.into());
        }
    };
    println!("Plan {} is now: {} ({})", plan.id, plan.menu_text, plan.status);

    let dishes: BTreeSet<String> = plan.dishes().into_iter().collect();
    println!("Generating recipes...");
    let timeout = context::kitchen_config(config).unit_timeout;
    context::wait_for_dishes(&kitchen.tracker, &dishes, timeout).await;
    context::print_dish_results(&kitchen.tracker, &dishes);

    kitchen.shutdown().await;
    Ok(())
}

// -----------------------------------------------------------------------
// chef recipe show
// -----------------------------------------------------------------------

pub async fn run_recipe_show(config: &ChefConfig, pool: &PgPool, plan_id: &str, generate: bool) -> Result<()> {
    let id = parse_id(plan_id, "plan")?;
    let plan = load_plan(pool, id).await?;

    if generate {
        let (kitchen, _) = start_kitchen(config, pool)?;
        let started = kitchen.orchestrator.ensure_recipes(id).await?;
        if started > 0 {
            println!("Generating {started} missing recipes...");
            let dishes: BTreeSet<String> = plan.dishes().into_iter().collect();
            let timeout = context::kitchen_config(config).unit_timeout;
            context::wait_for_dishes(&kitchen.tracker, &dishes, timeout).await;
            context::print_dish_results(&kitchen.tracker, &dishes);
            println!();
        }
        kitchen.shutdown().await;
    }

    let found = recipes::list_recipes_for_plans(pool, &[id]).await?;
    println!("{} {}: {}", plan.plan_date, plan.meal_slot, plan.menu_text);

    for dish in plan.dishes() {
        println!();
        match found.iter().find(|r| r.dish_name == dish) {
            Some(recipe) => print_recipe(recipe),
            None => {
                println!("## {dish}");
                println!("  (no recipe yet; rerun with --generate)");
            }
        }
    }
    Ok(())
}

fn print_recipe(recipe: &Recipe) {
    println!("## {} ({})", recipe.dish_name, recipe.cooking_time);
    println!("Ingredients:");
    for ingredient in recipe.ingredients.iter() {
        println!("  - {} {}", ingredient.name, ingredient.amount);
    }
    println!("Steps:");
    for (i, step) in recipe.steps.iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
}
