//! Handlers for `chef inventory` and `chef shopping`.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{Days, Local, NaiveDate};
use sqlx::PgPool;

use chef_core::fulfillment::FulfillmentEngine;
use chef_core::generation::{ContentGenerationClient, HttpGenerator};
use chef_core::store::PgStore;
use chef_db::models::{FoodCategory, InventoryItem};
use chef_db::queries::inventory::{self, NewInventoryItem};
use chef_db::queries::shopping::{self, NewShoppingEntry};
use chef_db::queries::{meal_plans, recipes};

use crate::config::ChefConfig;
use crate::plan_cmds::parse_id;
use crate::{InventoryCommands, ShoppingCommands};

// -----------------------------------------------------------------------
// chef inventory
// -----------------------------------------------------------------------

pub async fn run_inventory_command(
    command: InventoryCommands,
    config: &ChefConfig,
    pool: &PgPool,
) -> Result<()> {
    let today = Local::now().date_naive();
    match command {
        InventoryCommands::Add {
            name,
            category,
            expiry,
            count,
        } => {
            let item = inventory::insert_item(
                pool,
                &NewInventoryItem {
                    name: &name,
                    category: FoodCategory::from_label(&category),
                    expiry,
                    count,
                },
            )
            .await?;
            println!("Added {} ({}) [{}]", item.name, item.category.label(), item.id);

            if config.settings.auto_delete_matched {
                let removed = remove_matching_entries(pool, &item.name).await?;
                if removed > 0 {
                    println!("Removed {removed} matching shopping entries.");
                }
            }
            Ok(())
        }
        InventoryCommands::List => {
            let mut items = inventory::list_items(pool).await?;
            if !config.settings.show_expired_items {
                items.retain(|i| i.expiry.is_none_or(|e| e >= today));
            }
            print_items(&items, today, config.settings.expiry_warning_days);
            Ok(())
        }
        InventoryCommands::Remove { item_id } => {
            let id = parse_id(&item_id, "inventory item")?;
            if !inventory::delete_item(pool, id).await? {
                bail!("inventory item {id} not found");
            }
            println!("Removed inventory item {id}.");
            Ok(())
        }
        InventoryCommands::Expiring { days } => {
            let days = days.unwrap_or(config.settings.expiry_warning_days);
            let until = today
                .checked_add_days(Days::new(u64::from(days)))
                .context("date out of range")?;
            let items = inventory::list_expiring(pool, until).await?;
            if items.is_empty() {
                println!("Nothing expires within {days} days.");
            } else {
                print_items(&items, today, days);
            }
            Ok(())
        }
    }
}

/// Delete unchecked shopping entries whose name matches `name`, ignoring case.
async fn remove_matching_entries(pool: &PgPool, name: &str) -> Result<u64> {
    let key = name.trim().to_lowercase();
    let ids: Vec<_> = shopping::list_entries(pool)
        .await?
        .into_iter()
        .filter(|e| !e.checked && e.name.trim().to_lowercase() == key)
        .map(|e| e.id)
        .collect();
    if ids.is_empty() {
        return Ok(0);
    }
    shopping::delete_entries(pool, &ids).await
}

fn expiry_note(expiry: Option<NaiveDate>, today: NaiveDate, warning_days: u32) -> String {
    let Some(expiry) = expiry else {
        return String::new();
    };
    let days = (expiry - today).num_days();
    if days < 0 {
        format!("expired {expiry}")
    } else if days <= i64::from(warning_days) {
        format!("expires {expiry} ({days}d)")
    } else {
        format!("expires {expiry}")
    }
}

fn print_items(items: &[InventoryItem], today: NaiveDate, warning_days: u32) {
    if items.is_empty() {
        println!("Inventory is empty.");
        return;
    }
    for item in items {
        println!(
            "{}  {:<6}  x{:<3} {}  {}",
            item.id,
            item.category.label(),
            item.count,
            item.name,
            expiry_note(item.expiry, today, warning_days)
        );
    }
}

// -----------------------------------------------------------------------
// chef shopping
// -----------------------------------------------------------------------

pub async fn run_shopping_command(
    command: ShoppingCommands,
    config: &ChefConfig,
    pool: &PgPool,
) -> Result<()> {
    match command {
        ShoppingCommands::List => {
            let entries = shopping::list_entries(pool).await?;
            if entries.is_empty() {
                println!("Shopping list is empty.");
            }
            for entry in &entries {
                let mark = if entry.checked { "x" } else { " " };
                let amount = entry.amount_label.as_deref().unwrap_or("");
                let source = entry
                    .source_label
                    .as_deref()
                    .map(|s| format!("  <- {s}"))
                    .unwrap_or_default();
                println!("[{mark}] {}  {} {amount}{source}", entry.id, entry.name);
            }
            Ok(())
        }
        ShoppingCommands::Add {
            name,
            category,
            count,
        } => {
            let entry = shopping::insert_entry(
                pool,
                &NewShoppingEntry {
                    name,
                    category: FoodCategory::from_label(&category),
                    count,
                    source_label: None,
                    amount_label: None,
                },
            )
            .await?;
            println!("Added {} [{}]", entry.name, entry.id);
            Ok(())
        }
        ShoppingCommands::Check { entry_id, uncheck } => {
            let id = parse_id(&entry_id, "shopping entry")?;
            shopping::set_checked(pool, id, !uncheck).await?;
            println!("{} {id}.", if uncheck { "Unchecked" } else { "Checked" });
            Ok(())
        }
        ShoppingCommands::ClearAuto => {
            let removed = shopping::delete_auto_added(pool).await?;
            println!("Removed {removed} auto-added entries.");
            Ok(())
        }
        ShoppingCommands::Fill { date, days } => cmd_fill(config, pool, date, days).await,
    }
}

/// Run fulfillment by hand over the recipes of the plans in a date range.
async fn cmd_fill(config: &ChefConfig, pool: &PgPool, date: Option<NaiveDate>, days: u64) -> Result<()> {
    let from = date.unwrap_or_else(|| Local::now().date_naive());
    let until = from
        .checked_add_days(Days::new(days.max(1)))
        .context("date out of range")?;

    let plans = meal_plans::list_plans_between(pool, from, until).await?;
    let plan_ids: Vec<_> = plans.iter().map(|p| p.id).collect();
    let found = recipes::list_recipes_for_plans(pool, &plan_ids).await?;
    if found.is_empty() {
        println!("No recipes for plans from {from}.");
        return Ok(());
    }
    let dishes: BTreeSet<String> = found.iter().map(|r| r.dish_name.clone()).collect();

    let generator = Arc::new(HttpGenerator::new(config.generation.clone())?);
    let client = ContentGenerationClient::new(generator, config.generation.request_timeout)
        .with_servings(config.settings.servings());
    let store = Arc::new(PgStore::new(pool.clone()));
    let engine = FulfillmentEngine::new(client, store, config.settings.consolidation);

    let stock = inventory::list_items(pool).await?;
    let listed = shopping::list_entries(pool).await?;
    println!("Consolidating ingredients for {} dishes...", dishes.len());
    let added = engine.fulfill(&dishes, &found, &plans, &stock, &listed).await?;
    println!("Added {added} items to the shopping list.");
    Ok(())
}
