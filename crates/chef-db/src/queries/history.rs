//! Database query functions for the `meal_history` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::{MealHistory, MealSlot};

pub async fn insert_history(
    pool: &PgPool,
    eaten_on: NaiveDate,
    meal_slot: MealSlot,
    menu_text: &str,
) -> Result<MealHistory> {
    let entry = sqlx::query_as::<_, MealHistory>(
        "INSERT INTO meal_history (eaten_on, meal_slot, menu_text) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(eaten_on)
    .bind(meal_slot)
    .bind(menu_text)
    .fetch_one(pool)
    .await
    .context("failed to insert meal history")?;

    Ok(entry)
}

/// Most recent meals first, at most `limit` rows.
pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<MealHistory>> {
    let entries = sqlx::query_as::<_, MealHistory>(
        "SELECT * FROM meal_history ORDER BY eaten_on DESC, created_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to list meal history")?;

    Ok(entries)
}
