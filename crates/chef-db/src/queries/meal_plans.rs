//! Database query functions for the `meal_plans` table.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{MealPlan, MealSlot, PlanStatus};

/// Parameters for inserting a new meal plan row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMealPlan {
    pub plan_date: NaiveDate,
    pub meal_slot: MealSlot,
    pub menu_text: String,
}

/// Sort plans chronologically: by date, then breakfast < lunch < dinner.
pub fn sort_plans(plans: &mut [MealPlan]) {
    plans.sort_by_key(|p| (p.plan_date, p.meal_slot));
}

fn unzip_slots(slots: &[(NaiveDate, MealSlot)]) -> (Vec<NaiveDate>, Vec<String>) {
    slots
        .iter()
        .map(|(date, slot)| (*date, slot.to_string()))
        .unzip()
}

/// Insert a single plan row.
pub async fn insert_plan(pool: &PgPool, new: &NewMealPlan) -> Result<MealPlan> {
    let plan = sqlx::query_as::<_, MealPlan>(
        "INSERT INTO meal_plans (plan_date, meal_slot, menu_text) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(new.plan_date)
    .bind(new.meal_slot)
    .bind(&new.menu_text)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert {} plan for {}", new.meal_slot, new.plan_date))?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: Uuid) -> Result<Option<MealPlan>> {
    let plan = sqlx::query_as::<_, MealPlan>("SELECT * FROM meal_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch meal plan")?;

    Ok(plan)
}

/// List plans with `from <= plan_date < until`, in chronological order.
pub async fn list_plans_between(
    pool: &PgPool,
    from: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<MealPlan>> {
    let mut plans = sqlx::query_as::<_, MealPlan>(
        "SELECT * FROM meal_plans WHERE plan_date >= $1 AND plan_date < $2",
    )
    .bind(from)
    .bind(until)
    .fetch_all(pool)
    .await
    .context("failed to list meal plans by date")?;

    sort_plans(&mut plans);
    Ok(plans)
}

/// List plans occupying any of the given (date, slot) cells.
pub async fn list_plans_in_slots(
    pool: &PgPool,
    slots: &[(NaiveDate, MealSlot)],
) -> Result<Vec<MealPlan>> {
    let (dates, names) = unzip_slots(slots);
    let mut plans = sqlx::query_as::<_, MealPlan>(
        "SELECT p.* FROM meal_plans p \
         JOIN UNNEST($1::date[], $2::text[]) AS w(plan_date, meal_slot) \
           ON p.plan_date = w.plan_date AND p.meal_slot = w.meal_slot",
    )
    .bind(&dates)
    .bind(&names)
    .fetch_all(pool)
    .await
    .context("failed to list meal plans in window")?;

    sort_plans(&mut plans);
    Ok(plans)
}

/// Atomically replace every plan in `slots` with `new_plans`.
///
/// Existing plans in the window (and, by cascade, their recipes) are
/// deleted and the new rows inserted in one transaction. Returns the
/// inserted plans in chronological order.
pub async fn replace_plans(
    pool: &PgPool,
    slots: &[(NaiveDate, MealSlot)],
    new_plans: &[NewMealPlan],
) -> Result<Vec<MealPlan>> {
    let (dates, names) = unzip_slots(slots);
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let deleted = sqlx::query(
        "DELETE FROM meal_plans p \
         USING UNNEST($1::date[], $2::text[]) AS w(plan_date, meal_slot) \
         WHERE p.plan_date = w.plan_date AND p.meal_slot = w.meal_slot",
    )
    .bind(&dates)
    .bind(&names)
    .execute(&mut *tx)
    .await
    .context("failed to delete superseded meal plans")?
    .rows_affected();

    let mut inserted = Vec::with_capacity(new_plans.len());
    for new in new_plans {
        let plan = sqlx::query_as::<_, MealPlan>(
            "INSERT INTO meal_plans (plan_date, meal_slot, menu_text) \
             VALUES ($1, $2, $3) \
             RETURNING *",
        )
        .bind(new.plan_date)
        .bind(new.meal_slot)
        .bind(&new.menu_text)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert {} plan for {}", new.meal_slot, new.plan_date))?;
        inserted.push(plan);
    }

    tx.commit().await.context("failed to commit transaction")?;

    tracing::debug!(deleted, inserted = inserted.len(), "replaced meal plans");
    sort_plans(&mut inserted);
    Ok(inserted)
}

/// Update the status of a plan.
pub async fn update_plan_status(pool: &PgPool, id: Uuid, status: PlanStatus) -> Result<()> {
    let result = sqlx::query("UPDATE meal_plans SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update meal plan status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("meal plan {id} not found");
    }

    Ok(())
}

/// Replace a plan's menu text and status together.
pub async fn update_menu(
    pool: &PgPool,
    id: Uuid,
    menu_text: &str,
    status: PlanStatus,
) -> Result<MealPlan> {
    let plan = sqlx::query_as::<_, MealPlan>(
        "UPDATE meal_plans SET menu_text = $1, status = $2 WHERE id = $3 RETURNING *",
    )
    .bind(menu_text)
    .bind(status)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update meal plan menu")?;

    plan.with_context(|| format!("meal plan {id} not found"))
}

/// Delete a plan. Its recipes are removed by cascade.
pub async fn delete_plan(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM meal_plans WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete meal plan")?;

    Ok(result.rows_affected() > 0)
}
