//! Meal plan orchestrator: replaces the plans of a window with freshly
//! generated ones and launches recipe generation for every dish.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Days, Local, NaiveDate};
use uuid::Uuid;

use chef_db::models::{
    DISH_SEPARATOR, InventoryItem, MealHistory, MealPlan, MealSlot, PlanStatus, split_dishes,
};
use chef_db::queries::meal_plans::NewMealPlan;

use crate::error::{GenerationError, PlanError};
use crate::fulfillment::clear_auto_added;
use crate::generation::{ContentGenerationClient, DailyMenu};
use crate::settings::GenerationMode;
use crate::store::{PlanStore, SlotKey};
use crate::tracker::Tracker;

/// Stock taken by a completed meal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockUsage {
    pub item_id: Uuid,
    pub used: i32,
}

/// Plans created by one generation run.
#[derive(Debug, Clone)]
pub struct PlanSet {
    /// Epoch of the pending batch installed for these plans.
    pub epoch: u64,
    pub plans: Vec<MealPlan>,
    pub reason: String,
    pub dishes: BTreeSet<String>,
}

/// The three (date, slot) cells `mode` covers when run on `today`.
pub fn resolve_window(mode: GenerationMode, today: NaiveDate) -> [SlotKey; 3] {
    match mode {
        GenerationMode::Morning => [
            (today, MealSlot::Breakfast),
            (today, MealSlot::Lunch),
            (today, MealSlot::Dinner),
        ],
        GenerationMode::Evening => {
            let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
            [
                (today, MealSlot::Dinner),
                (tomorrow, MealSlot::Breakfast),
                (tomorrow, MealSlot::Lunch),
            ]
        }
    }
}

/// Normalize a generated menu: trimmed dishes joined by the separator.
fn normalize_menu(menu: &str) -> Result<String, PlanError> {
    let dishes = split_dishes(menu);
    if dishes.is_empty() {
        return Err(PlanError::EmptyMenu(menu.to_owned()));
    }
    Ok(dishes.join(&DISH_SEPARATOR.to_string()))
}

/// Turn the generated menu into one new plan per window cell.
fn plans_for(window: &[SlotKey; 3], menu: &DailyMenu) -> Result<Vec<NewMealPlan>, GenerationError> {
    window
        .iter()
        .map(|&(plan_date, meal_slot)| {
            let text = match meal_slot {
                MealSlot::Breakfast => &menu.breakfast,
                MealSlot::Lunch => &menu.lunch,
                MealSlot::Dinner => &menu.dinner,
            };
            let menu_text = normalize_menu(text).map_err(|_| {
                GenerationError::MalformedOutput(format!("{meal_slot} menu has no dishes"))
            })?;
            Ok(NewMealPlan {
                plan_date,
                meal_slot,
                menu_text,
            })
        })
        .collect()
}

pub struct Orchestrator {
    store: Arc<dyn PlanStore>,
    client: ContentGenerationClient,
    tracker: Arc<Tracker>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn PlanStore>, client: ContentGenerationClient, tracker: Arc<Tracker>) -> Self {
        Self {
            store,
            client,
            tracker,
        }
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Generate plans for `mode` relative to the local date.
    pub async fn generate_plan(
        &self,
        mode: GenerationMode,
        inventory: &[InventoryItem],
        history: &[MealHistory],
    ) -> Result<PlanSet, PlanError> {
        self.generate_plan_on(Local::now().date_naive(), mode, inventory, history)
            .await
    }

    /// Generate plans for `mode` relative to `today`.
    ///
    /// Nothing is written unless generation succeeds. On success the
    /// window's plans are replaced atomically, auto-added shopping entries
    /// are cleared, the dish set becomes the pending batch and one recipe
    /// unit per (plan, dish) is started. Returns without waiting for them.
    pub async fn generate_plan_on(
        &self,
        today: NaiveDate,
        mode: GenerationMode,
        inventory: &[InventoryItem],
        history: &[MealHistory],
    ) -> Result<PlanSet, PlanError> {
        let window = resolve_window(mode, today);
        tracing::info!(%mode, %today, "generating meal plan");

        let menu = self
            .client
            .daily_menu(mode, today, inventory, history)
            .await
            .inspect_err(|e| tracing::warn!(%mode, error = %e, "meal plan generation failed"))?;
        let new_plans = plans_for(&window, &menu)?;

        let plans = self
            .store
            .replace_plans(&window, &new_plans)
            .await
            .map_err(PlanError::Persistence)?;

        let mut dishes: BTreeMap<String, Uuid> = BTreeMap::new();
        for plan in &plans {
            for dish in plan.dishes() {
                dishes.entry(dish).or_insert(plan.id);
            }
        }
        let plan_ids: Vec<Uuid> = plans.iter().map(|p| p.id).collect();
        let dish_names: BTreeSet<String> = dishes.keys().cloned().collect();

        let epoch = {
            let _guard = self.tracker.lock_shopping().await;
            match self.store.shopping().await {
                Ok(entries) => {
                    if let Err(e) = clear_auto_added(self.store.as_ref(), &entries).await {
                        tracing::warn!(error = %e, "failed to clear auto-added shopping entries");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to load shopping list"),
            }
            self.tracker.install_batch(dishes, plan_ids)
        };

        let mut started = 0;
        for plan in &plans {
            for dish in plan.dishes() {
                if self.tracker.start_dish(plan.id, &dish).await {
                    started += 1;
                }
            }
        }

        tracing::info!(
            %mode,
            epoch,
            plans = plans.len(),
            dishes = dish_names.len(),
            started,
            "meal plan saved"
        );

        Ok(PlanSet {
            epoch,
            plans,
            reason: menu.reason,
            dishes: dish_names,
        })
    }

    async fn load_plan(&self, id: Uuid) -> Result<MealPlan, PlanError> {
        self.store
            .get_plan(id)
            .await
            .map_err(PlanError::Persistence)?
            .ok_or(PlanError::NotFound(id))
    }

    /// Mark a plan completed, take `usage` out of stock and record the meal
    /// in the history. Completing an already completed plan changes nothing.
    ///
    /// `usage` pairs inventory item ids with the count used. Counts never go
    /// below zero; unknown items and non-positive counts are skipped.
    pub async fn complete_plan(&self, id: Uuid, usage: &[StockUsage]) -> Result<MealPlan, PlanError> {
        let mut plan = self.load_plan(id).await?;
        if plan.status == PlanStatus::Completed {
            return Ok(plan);
        }

        for item_use in usage.iter().filter(|u| u.used > 0) {
            match self
                .store
                .consume_inventory(item_use.item_id, item_use.used)
                .await
                .map_err(PlanError::Persistence)?
            {
                Some(item) => tracing::info!(
                    item = %item.name,
                    used = item_use.used,
                    left = item.count,
                    "stock used"
                ),
                None => {
                    tracing::warn!(item_id = %item_use.item_id, "stock item not found, skipping")
                }
            }
        }

        self.store
            .update_status(id, PlanStatus::Completed)
            .await
            .map_err(PlanError::Persistence)?;
        self.store
            .record_history(plan.plan_date, plan.meal_slot, &plan.menu_text)
            .await
            .map_err(PlanError::Persistence)?;

        tracing::info!(plan_id = %id, menu = %plan.menu_text, "plan completed");
        plan.status = PlanStatus::Completed;
        Ok(plan)
    }

    /// Delete a plan and, with it, its recipes.
    pub async fn delete_plan(&self, id: Uuid) -> Result<MealPlan, PlanError> {
        let plan = self.load_plan(id).await?;
        if !self.store.delete_plan(id).await.map_err(PlanError::Persistence)? {
            return Err(PlanError::NotFound(id));
        }
        tracing::info!(plan_id = %id, menu = %plan.menu_text, "plan deleted");
        Ok(plan)
    }

    /// Replace a plan's menu and generate recipes for its dishes.
    ///
    /// The status becomes `changed` unless the plan was already completed.
    pub async fn rename_plan(&self, id: Uuid, menu_text: &str) -> Result<MealPlan, PlanError> {
        let menu_text = normalize_menu(menu_text)?;
        let plan = self.load_plan(id).await?;
        let status = match plan.status {
            PlanStatus::Completed => PlanStatus::Completed,
            _ => PlanStatus::Changed,
        };

        let plan = self
            .store
            .update_menu(id, &menu_text, status)
            .await
            .map_err(PlanError::Persistence)?;
        tracing::info!(plan_id = %id, menu = %plan.menu_text, "plan menu changed");

        for dish in plan.dishes() {
            self.tracker.start_dish(plan.id, &dish).await;
        }
        Ok(plan)
    }

    /// Start generation for every dish of the plan that has no recipe yet.
    /// Returns how many units were started.
    pub async fn ensure_recipes(&self, id: Uuid) -> Result<usize, PlanError> {
        let plan = self.load_plan(id).await?;
        let mut started = 0;
        for dish in plan.dishes() {
            if self.tracker.start_dish(plan.id, &dish).await {
                started += 1;
            }
        }
        Ok(started)
    }
}
