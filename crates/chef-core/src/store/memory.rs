use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use chef_db::models::{
    FoodCategory, InventoryItem, MealHistory, MealPlan, MealSlot, PlanStatus, Recipe,
    ShoppingEntry,
};
use chef_db::queries::meal_plans::{NewMealPlan, sort_plans};
use chef_db::queries::recipes::NewRecipe;
use chef_db::queries::shopping::NewShoppingEntry;

use super::{PlanStore, SlotKey};

#[derive(Default)]
struct Tables {
    plans: BTreeMap<Uuid, MealPlan>,
    /// Recipe arena keyed by owning plan and dish.
    recipes: HashMap<(Uuid, String), Recipe>,
    inventory: Vec<InventoryItem>,
    shopping: Vec<ShoppingEntry>,
    history: Vec<MealHistory>,
    fail_shopping_writes: bool,
}

impl Tables {
    fn remove_plan(&mut self, id: Uuid) -> bool {
        let removed = self.plans.remove(&id).is_some();
        self.recipes.retain(|(plan_id, _), _| *plan_id != id);
        removed
    }
}

/// In-process [`PlanStore`]. Every operation holds one lock, so each call
/// is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    pub fn insert_plan(&self, new: &NewMealPlan) -> Result<MealPlan> {
        let plan = MealPlan {
            id: Uuid::new_v4(),
            plan_date: new.plan_date,
            meal_slot: new.meal_slot,
            menu_text: new.menu_text.clone(),
            status: PlanStatus::Planned,
            created_at: Utc::now(),
        };
        self.lock()?.plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    pub fn add_inventory(
        &self,
        name: &str,
        category: FoodCategory,
        expiry: Option<NaiveDate>,
    ) -> Result<InventoryItem> {
        self.add_stock(name, category, expiry, 1)
    }

    pub fn add_stock(
        &self,
        name: &str,
        category: FoodCategory,
        expiry: Option<NaiveDate>,
        count: i32,
    ) -> Result<InventoryItem> {
        let item = InventoryItem {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            category,
            expiry,
            count,
            created_at: Utc::now(),
        };
        self.lock()?.inventory.push(item.clone());
        Ok(item)
    }

    pub fn add_shopping(&self, new: &NewShoppingEntry) -> Result<ShoppingEntry> {
        let entry = shopping_row(new);
        self.lock()?.shopping.push(entry.clone());
        Ok(entry)
    }

    /// Make every following shopping insert fail, for exercising rollback paths.
    pub fn fail_shopping_writes(&self, fail: bool) -> Result<()> {
        self.lock()?.fail_shopping_writes = fail;
        Ok(())
    }

    pub fn all_plans(&self) -> Result<Vec<MealPlan>> {
        let mut plans: Vec<_> = self.lock()?.plans.values().cloned().collect();
        sort_plans(&mut plans);
        Ok(plans)
    }

    pub fn recipe_count(&self) -> Result<usize> {
        Ok(self.lock()?.recipes.len())
    }
}

fn shopping_row(new: &NewShoppingEntry) -> ShoppingEntry {
    ShoppingEntry {
        id: Uuid::new_v4(),
        name: new.name.clone(),
        category: new.category,
        count: new.count,
        checked: false,
        source_label: new.source_label.clone(),
        amount_label: new.amount_label.clone(),
        created_at: Utc::now(),
    }
}

fn in_window(plan: &MealPlan, window: &[SlotKey]) -> bool {
    window
        .iter()
        .any(|(date, slot)| plan.plan_date == *date && plan.meal_slot == *slot)
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn replace_plans(
        &self,
        window: &[SlotKey],
        new_plans: &[NewMealPlan],
    ) -> Result<Vec<MealPlan>> {
        let mut tables = self.lock()?;
        let stale: Vec<Uuid> = tables
            .plans
            .values()
            .filter(|p| in_window(p, window))
            .map(|p| p.id)
            .collect();
        for id in stale {
            tables.remove_plan(id);
        }

        let mut inserted = Vec::with_capacity(new_plans.len());
        for new in new_plans {
            let plan = MealPlan {
                id: Uuid::new_v4(),
                plan_date: new.plan_date,
                meal_slot: new.meal_slot,
                menu_text: new.menu_text.clone(),
                status: PlanStatus::Planned,
                created_at: Utc::now(),
            };
            tables.plans.insert(plan.id, plan.clone());
            inserted.push(plan);
        }
        sort_plans(&mut inserted);
        Ok(inserted)
    }

    async fn plans_in_window(&self, window: &[SlotKey]) -> Result<Vec<MealPlan>> {
        let mut plans: Vec<_> = self
            .lock()?
            .plans
            .values()
            .filter(|p| in_window(p, window))
            .cloned()
            .collect();
        sort_plans(&mut plans);
        Ok(plans)
    }

    async fn plans_between(&self, from: NaiveDate, until: NaiveDate) -> Result<Vec<MealPlan>> {
        let mut plans: Vec<_> = self
            .lock()?
            .plans
            .values()
            .filter(|p| p.plan_date >= from && p.plan_date < until)
            .cloned()
            .collect();
        sort_plans(&mut plans);
        Ok(plans)
    }

    async fn get_plan(&self, id: Uuid) -> Result<Option<MealPlan>> {
        Ok(self.lock()?.plans.get(&id).cloned())
    }

    async fn update_menu(&self, id: Uuid, menu_text: &str, status: PlanStatus) -> Result<MealPlan> {
        let mut tables = self.lock()?;
        let plan = tables
            .plans
            .get_mut(&id)
            .with_context(|| format!("meal plan {id} not found"))?;
        plan.menu_text = menu_text.to_owned();
        plan.status = status;
        Ok(plan.clone())
    }

    async fn update_status(&self, id: Uuid, status: PlanStatus) -> Result<()> {
        let mut tables = self.lock()?;
        let plan = tables
            .plans
            .get_mut(&id)
            .with_context(|| format!("meal plan {id} not found"))?;
        plan.status = status;
        Ok(())
    }

    async fn delete_plan(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock()?.remove_plan(id))
    }

    async fn get_recipe(&self, plan_id: Uuid, dish_name: &str) -> Result<Option<Recipe>> {
        Ok(self
            .lock()?
            .recipes
            .get(&(plan_id, dish_name.to_owned()))
            .cloned())
    }

    async fn insert_recipe(&self, plan_id: Uuid, new: &NewRecipe) -> Result<Option<Recipe>> {
        let mut tables = self.lock()?;
        if !tables.plans.contains_key(&plan_id) {
            anyhow::bail!("meal plan {plan_id} not found");
        }
        let key = (plan_id, new.dish_name.clone());
        if tables.recipes.contains_key(&key) {
            return Ok(None);
        }
        let recipe = Recipe {
            id: Uuid::new_v4(),
            plan_id,
            dish_name: new.dish_name.clone(),
            ingredients: Json(new.ingredients.clone()),
            steps: Json(new.steps.clone()),
            cooking_time: new.cooking_time.clone(),
            created_at: Utc::now(),
        };
        tables.recipes.insert(key, recipe.clone());
        Ok(Some(recipe))
    }

    async fn recipes_for_plans(&self, plan_ids: &[Uuid]) -> Result<Vec<Recipe>> {
        let mut recipes: Vec<_> = self
            .lock()?
            .recipes
            .values()
            .filter(|r| plan_ids.contains(&r.plan_id))
            .cloned()
            .collect();
        recipes.sort_by_key(|r| r.created_at);
        Ok(recipes)
    }

    async fn inventory(&self) -> Result<Vec<InventoryItem>> {
        Ok(self.lock()?.inventory.clone())
    }

    async fn consume_inventory(&self, id: Uuid, used: i32) -> Result<Option<InventoryItem>> {
        let mut tables = self.lock()?;
        Ok(tables.inventory.iter_mut().find(|i| i.id == id).map(|item| {
            item.count = (item.count - used.max(0)).max(0);
            item.clone()
        }))
    }

    async fn shopping(&self) -> Result<Vec<ShoppingEntry>> {
        Ok(self.lock()?.shopping.clone())
    }

    async fn insert_shopping(&self, entries: &[NewShoppingEntry]) -> Result<usize> {
        let mut tables = self.lock()?;
        if tables.fail_shopping_writes {
            anyhow::bail!("shopping list is not writable");
        }
        tables.shopping.extend(entries.iter().map(shopping_row));
        Ok(entries.len())
    }

    async fn delete_shopping(&self, ids: &[Uuid]) -> Result<u64> {
        let mut tables = self.lock()?;
        let before = tables.shopping.len();
        tables.shopping.retain(|e| !ids.contains(&e.id));
        Ok((before - tables.shopping.len()) as u64)
    }

    async fn recent_history(&self, limit: usize) -> Result<Vec<MealHistory>> {
        let mut history = self.lock()?.history.clone();
        history.sort_by(|a, b| {
            b.eaten_on
                .cmp(&a.eaten_on)
                .then(b.created_at.cmp(&a.created_at))
        });
        history.truncate(limit);
        Ok(history)
    }

    async fn record_history(
        &self,
        eaten_on: NaiveDate,
        meal_slot: MealSlot,
        menu_text: &str,
    ) -> Result<MealHistory> {
        let entry = MealHistory {
            id: Uuid::new_v4(),
            eaten_on,
            meal_slot,
            menu_text: menu_text.to_owned(),
            created_at: Utc::now(),
        };
        self.lock()?.history.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use chef_db::models::Ingredient;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn new_plan(date: NaiveDate, slot: MealSlot, menu: &str) -> NewMealPlan {
        NewMealPlan {
            plan_date: date,
            meal_slot: slot,
            menu_text: menu.to_owned(),
        }
    }

    fn recipe(dish: &str) -> NewRecipe {
        NewRecipe {
            dish_name: dish.to_owned(),
            ingredients: vec![Ingredient {
                name: "塩".into(),
                amount: "少々".into(),
            }],
            steps: vec!["焼く".into()],
            cooking_time: "10分".into(),
        }
    }

    #[tokio::test]
    async fn replace_cascades_recipes() {
        let store = MemoryStore::new();
        let old = store.insert_plan(&new_plan(day(1), MealSlot::Dinner, "焼き魚")).unwrap();
        store.insert_recipe(old.id, &recipe("焼き魚")).await.unwrap();

        let window = [(day(1), MealSlot::Dinner)];
        let new = store
            .replace_plans(&window, &[new_plan(day(1), MealSlot::Dinner, "カレー")])
            .await
            .unwrap();

        assert_eq!(new.len(), 1);
        assert!(store.get_plan(old.id).await.unwrap().is_none());
        assert_eq!(store.recipe_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn recipe_key_is_unique_and_requires_plan() {
        let store = MemoryStore::new();
        let plan = store.insert_plan(&new_plan(day(1), MealSlot::Lunch, "そば")).unwrap();

        assert!(store.insert_recipe(plan.id, &recipe("そば")).await.unwrap().is_some());
        assert!(store.insert_recipe(plan.id, &recipe("そば")).await.unwrap().is_none());
        assert!(store.insert_recipe(Uuid::new_v4(), &recipe("そば")).await.is_err());
    }

    #[tokio::test]
    async fn delete_plan_takes_its_recipes() {
        let store = MemoryStore::new();
        let lunch = store.insert_plan(&new_plan(day(2), MealSlot::Lunch, "そば")).unwrap();
        let dinner = store.insert_plan(&new_plan(day(2), MealSlot::Dinner, "天ぷら")).unwrap();
        store.insert_recipe(lunch.id, &recipe("そば")).await.unwrap();
        store.insert_recipe(dinner.id, &recipe("天ぷら")).await.unwrap();

        assert!(store.delete_plan(lunch.id).await.unwrap());
        assert!(!store.delete_plan(lunch.id).await.unwrap());
        assert!(store.get_recipe(lunch.id, "そば").await.unwrap().is_none());
        assert!(store.get_recipe(dinner.id, "天ぷら").await.unwrap().is_some());
        assert_eq!(store.recipe_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn consuming_stock_stops_at_zero() {
        let store = MemoryStore::new();
        let eggs = store.add_stock("卵", FoodCategory::Egg, None, 3).unwrap();

        let left = store.consume_inventory(eggs.id, 2).await.unwrap().unwrap();
        assert_eq!(left.count, 1);
        let left = store.consume_inventory(eggs.id, 5).await.unwrap().unwrap();
        assert_eq!(left.count, 0);
        assert!(store.consume_inventory(Uuid::new_v4(), 1).await.unwrap().is_none());
        assert_eq!(store.inventory().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_shopping_write_inserts_nothing() {
        let store = MemoryStore::new();
        store.fail_shopping_writes(true).unwrap();
        let entry = NewShoppingEntry {
            name: "卵".into(),
            category: FoodCategory::Egg,
            count: 1,
            source_label: Some("オムレツ (breakfast)".into()),
            amount_label: None,
        };
        assert!(store.insert_shopping(&[entry]).await.is_err());
        assert!(store.shopping().await.unwrap().is_empty());
    }
}
