use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use chef_db::models::{
    InventoryItem, MealHistory, MealPlan, MealSlot, PlanStatus, Recipe, ShoppingEntry,
};
use chef_db::queries::meal_plans::{self, NewMealPlan};
use chef_db::queries::recipes::{self, NewRecipe};
use chef_db::queries::shopping::{self, NewShoppingEntry};
use chef_db::queries::{history, inventory};

use super::{PlanStore, SlotKey};

/// [`PlanStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlanStore for PgStore {
    async fn replace_plans(
        &self,
        window: &[SlotKey],
        new_plans: &[NewMealPlan],
    ) -> Result<Vec<MealPlan>> {
        meal_plans::replace_plans(&self.pool, window, new_plans).await
    }

    async fn plans_in_window(&self, window: &[SlotKey]) -> Result<Vec<MealPlan>> {
        meal_plans::list_plans_in_slots(&self.pool, window).await
    }

    async fn plans_between(&self, from: NaiveDate, until: NaiveDate) -> Result<Vec<MealPlan>> {
        meal_plans::list_plans_between(&self.pool, from, until).await
    }

    async fn get_plan(&self, id: Uuid) -> Result<Option<MealPlan>> {
        meal_plans::get_plan(&self.pool, id).await
    }

    async fn update_menu(&self, id: Uuid, menu_text: &str, status: PlanStatus) -> Result<MealPlan> {
        meal_plans::update_menu(&self.pool, id, menu_text, status).await
    }

    async fn update_status(&self, id: Uuid, status: PlanStatus) -> Result<()> {
        meal_plans::update_plan_status(&self.pool, id, status).await
    }

    async fn delete_plan(&self, id: Uuid) -> Result<bool> {
        meal_plans::delete_plan(&self.pool, id).await
    }

    async fn get_recipe(&self, plan_id: Uuid, dish_name: &str) -> Result<Option<Recipe>> {
        recipes::get_recipe(&self.pool, plan_id, dish_name).await
    }

    async fn insert_recipe(&self, plan_id: Uuid, new: &NewRecipe) -> Result<Option<Recipe>> {
        recipes::insert_recipe(&self.pool, plan_id, new).await
    }

    async fn recipes_for_plans(&self, plan_ids: &[Uuid]) -> Result<Vec<Recipe>> {
        recipes::list_recipes_for_plans(&self.pool, plan_ids).await
    }

    async fn inventory(&self) -> Result<Vec<InventoryItem>> {
        inventory::list_items(&self.pool).await
    }

    async fn consume_inventory(&self, id: Uuid, used: i32) -> Result<Option<InventoryItem>> {
        inventory::consume_item(&self.pool, id, used).await
    }

    async fn shopping(&self) -> Result<Vec<ShoppingEntry>> {
        shopping::list_entries(&self.pool).await
    }

    async fn insert_shopping(&self, entries: &[NewShoppingEntry]) -> Result<usize> {
        shopping::insert_entries(&self.pool, entries).await
    }

    async fn delete_shopping(&self, ids: &[Uuid]) -> Result<u64> {
        shopping::delete_entries(&self.pool, ids).await
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<MealHistory>> {
        history::list_recent(&self.pool, i64::try_from(limit).unwrap_or(i64::MAX)).await
    }

    async fn record_history(
        &self,
        eaten_on: NaiveDate,
        meal_slot: MealSlot,
        menu_text: &str,
    ) -> Result<MealHistory> {
        history::insert_history(&self.pool, eaten_on, meal_slot, menu_text).await
    }
}
