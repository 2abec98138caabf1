//! Database query functions for the `inventory_items` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{FoodCategory, InventoryItem};

/// Parameters for inserting a stock item.
#[derive(Debug, Clone)]
pub struct NewInventoryItem<'a> {
    pub name: &'a str,
    pub category: FoodCategory,
    pub expiry: Option<NaiveDate>,
    pub count: i32,
}

pub async fn insert_item(pool: &PgPool, new: &NewInventoryItem<'_>) -> Result<InventoryItem> {
    if new.count < 0 {
        anyhow::bail!("inventory count must be >= 0, got {}", new.count);
    }
    let item = sqlx::query_as::<_, InventoryItem>(
        "INSERT INTO inventory_items (name, category, expiry, count) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(new.name)
    .bind(new.category)
    .bind(new.expiry)
    .bind(new.count)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert inventory item {:?}", new.name))?;

    Ok(item)
}

/// List stock, soonest expiry first; items without an expiry come last.
pub async fn list_items(pool: &PgPool) -> Result<Vec<InventoryItem>> {
    let items = sqlx::query_as::<_, InventoryItem>(
        "SELECT * FROM inventory_items ORDER BY expiry ASC NULLS LAST, name ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list inventory")?;

    Ok(items)
}

/// Items whose expiry is on or before `until`.
pub async fn list_expiring(pool: &PgPool, until: NaiveDate) -> Result<Vec<InventoryItem>> {
    let items = sqlx::query_as::<_, InventoryItem>(
        "SELECT * FROM inventory_items WHERE expiry IS NOT NULL AND expiry <= $1 \
         ORDER BY expiry ASC, name ASC",
    )
    .bind(until)
    .fetch_all(pool)
    .await
    .context("failed to list expiring inventory")?;

    Ok(items)
}

pub async fn delete_item(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM inventory_items WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete inventory item")?;

    Ok(result.rows_affected() > 0)
}

/// Take `used` out of an item's count, stopping at zero. Returns the
/// updated item, or `None` if it does not exist.
pub async fn consume_item(pool: &PgPool, id: Uuid, used: i32) -> Result<Option<InventoryItem>> {
    let item = sqlx::query_as::<_, InventoryItem>(
        "UPDATE inventory_items SET count = GREATEST(count - $1, 0) \
         WHERE id = $2 \
         RETURNING *",
    )
    .bind(used.max(0))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update inventory count")?;

    Ok(item)
}
