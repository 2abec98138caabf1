//! Persistence seam used by the orchestrator, tracker and fulfillment.
//!
//! [`PgStore`] delegates to `chef_db`; [`MemoryStore`] keeps everything in
//! process and backs the behavioral tests.

mod memory;
mod pg;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use chef_db::models::{
    InventoryItem, MealHistory, MealPlan, MealSlot, PlanStatus, Recipe, ShoppingEntry,
};
use chef_db::queries::meal_plans::NewMealPlan;
use chef_db::queries::recipes::NewRecipe;
use chef_db::queries::shopping::NewShoppingEntry;

pub use memory::MemoryStore;
pub use pg::PgStore;

/// A (date, slot) cell of the plan calendar.
pub type SlotKey = (NaiveDate, MealSlot);

#[async_trait]
pub trait PlanStore: Send + Sync {
    // -- plans --

    /// Delete every plan in `window` (recipes cascade) and insert
    /// `new_plans`, atomically. Returns the inserted plans in order.
    async fn replace_plans(&self, window: &[SlotKey], new_plans: &[NewMealPlan])
    -> Result<Vec<MealPlan>>;

    async fn plans_in_window(&self, window: &[SlotKey]) -> Result<Vec<MealPlan>>;

    /// Plans with `from <= date < until`.
    async fn plans_between(&self, from: NaiveDate, until: NaiveDate) -> Result<Vec<MealPlan>>;

    async fn get_plan(&self, id: Uuid) -> Result<Option<MealPlan>>;

    async fn update_menu(&self, id: Uuid, menu_text: &str, status: PlanStatus) -> Result<MealPlan>;

    async fn update_status(&self, id: Uuid, status: PlanStatus) -> Result<()>;

    /// Delete a plan and its recipes. Returns whether it existed.
    async fn delete_plan(&self, id: Uuid) -> Result<bool>;

    // -- recipes --

    async fn get_recipe(&self, plan_id: Uuid, dish_name: &str) -> Result<Option<Recipe>>;

    /// Insert unless `(plan_id, dish_name)` already has a recipe. Fails if
    /// the plan no longer exists.
    async fn insert_recipe(&self, plan_id: Uuid, new: &NewRecipe) -> Result<Option<Recipe>>;

    async fn recipes_for_plans(&self, plan_ids: &[Uuid]) -> Result<Vec<Recipe>>;

    // -- pantry --

    async fn inventory(&self) -> Result<Vec<InventoryItem>>;

    /// Lower an item's count by `used`, never below zero.
    async fn consume_inventory(&self, id: Uuid, used: i32) -> Result<Option<InventoryItem>>;

    async fn shopping(&self) -> Result<Vec<ShoppingEntry>>;

    /// Insert all entries or none.
    async fn insert_shopping(&self, entries: &[NewShoppingEntry]) -> Result<usize>;

    async fn delete_shopping(&self, ids: &[Uuid]) -> Result<u64>;

    // -- history --

    async fn recent_history(&self, limit: usize) -> Result<Vec<MealHistory>>;

    async fn record_history(
        &self,
        eaten_on: NaiveDate,
        meal_slot: MealSlot,
        menu_text: &str,
    ) -> Result<MealHistory>;
}
