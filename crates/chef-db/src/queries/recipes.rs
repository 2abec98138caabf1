//! Database query functions for the `recipes` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{Ingredient, Recipe};

/// Parameters for inserting a recipe under a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipe {
    pub dish_name: String,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
    pub cooking_time: String,
}

/// Insert a recipe for `(plan_id, dish_name)` unless one already exists.
///
/// Returns `None` when the unique `(plan_id, dish_name)` key was already
/// taken; the existing row is left untouched.
pub async fn insert_recipe(pool: &PgPool, plan_id: Uuid, new: &NewRecipe) -> Result<Option<Recipe>> {
    let recipe = sqlx::query_as::<_, Recipe>(
        "INSERT INTO recipes (plan_id, dish_name, ingredients, steps, cooking_time) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (plan_id, dish_name) DO NOTHING \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(&new.dish_name)
    .bind(Json(&new.ingredients))
    .bind(Json(&new.steps))
    .bind(&new.cooking_time)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to insert recipe {:?} for plan {plan_id}", new.dish_name))?;

    Ok(recipe)
}

/// Fetch the recipe a plan owns for a dish.
pub async fn get_recipe(pool: &PgPool, plan_id: Uuid, dish_name: &str) -> Result<Option<Recipe>> {
    let recipe = sqlx::query_as::<_, Recipe>(
        "SELECT * FROM recipes WHERE plan_id = $1 AND dish_name = $2",
    )
    .bind(plan_id)
    .bind(dish_name)
    .fetch_optional(pool)
    .await
    .context("failed to fetch recipe")?;

    Ok(recipe)
}

/// List every recipe owned by any of `plan_ids`, oldest first.
pub async fn list_recipes_for_plans(pool: &PgPool, plan_ids: &[Uuid]) -> Result<Vec<Recipe>> {
    let recipes = sqlx::query_as::<_, Recipe>(
        "SELECT * FROM recipes WHERE plan_id = ANY($1) ORDER BY created_at ASC",
    )
    .bind(plan_ids)
    .fetch_all(pool)
    .await
    .context("failed to list recipes for plans")?;

    Ok(recipes)
}
