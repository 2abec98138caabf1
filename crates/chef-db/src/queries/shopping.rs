//! Database query functions for the `shopping_entries` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{FoodCategory, ShoppingEntry};

/// Parameters for inserting a shopping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShoppingEntry {
    pub name: String,
    pub category: FoodCategory,
    pub count: i32,
    pub source_label: Option<String>,
    pub amount_label: Option<String>,
}

/// Insert a single (unchecked) entry.
pub async fn insert_entry(pool: &PgPool, new: &NewShoppingEntry) -> Result<ShoppingEntry> {
    let entry = sqlx::query_as::<_, ShoppingEntry>(
        "INSERT INTO shopping_entries (name, category, count, source_label, amount_label) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(&new.name)
    .bind(new.category)
    .bind(new.count)
    .bind(&new.source_label)
    .bind(&new.amount_label)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert shopping entry {:?}", new.name))?;

    Ok(entry)
}

/// Insert all entries in one transaction. Either every row lands or none.
pub async fn insert_entries(pool: &PgPool, entries: &[NewShoppingEntry]) -> Result<usize> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    for new in entries {
        sqlx::query(
            "INSERT INTO shopping_entries (name, category, count, source_label, amount_label) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&new.name)
        .bind(new.category)
        .bind(new.count)
        .bind(&new.source_label)
        .bind(&new.amount_label)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert shopping entry {:?}", new.name))?;
    }

    tx.commit().await.context("failed to commit transaction")?;
    Ok(entries.len())
}

/// List the shopping list: unchecked first, then by creation time.
pub async fn list_entries(pool: &PgPool) -> Result<Vec<ShoppingEntry>> {
    let entries = sqlx::query_as::<_, ShoppingEntry>(
        "SELECT * FROM shopping_entries ORDER BY checked ASC, created_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to list shopping entries")?;

    Ok(entries)
}

pub async fn set_checked(pool: &PgPool, id: Uuid, checked: bool) -> Result<()> {
    let result = sqlx::query("UPDATE shopping_entries SET checked = $1 WHERE id = $2")
        .bind(checked)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update shopping entry")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("shopping entry {id} not found");
    }

    Ok(())
}

/// Delete the given entries. Unknown ids are ignored.
pub async fn delete_entries(pool: &PgPool, ids: &[Uuid]) -> Result<u64> {
    let result = sqlx::query("DELETE FROM shopping_entries WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await
        .context("failed to delete shopping entries")?;

    Ok(result.rows_affected())
}

/// Delete every entry created by automatic fulfillment. Returns the number
/// of rows removed; running it twice in a row removes nothing the second time.
pub async fn delete_auto_added(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM shopping_entries WHERE source_label IS NOT NULL")
        .execute(pool)
        .await
        .context("failed to clear auto-added shopping entries")?;

    Ok(result.rows_affected())
}
