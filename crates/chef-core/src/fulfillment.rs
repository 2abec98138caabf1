//! Shopping list fulfillment: turns settled recipes into net-new shopping
//! entries.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chef_db::models::{FoodCategory, InventoryItem, MealPlan, MealSlot, Recipe, ShoppingEntry};
use chef_db::queries::shopping::NewShoppingEntry;

use crate::error::FulfillError;
use crate::generation::{ConsolidatedIngredient, ContentGenerationClient, IngredientLine};
use crate::settings::ConsolidationMode;
use crate::store::PlanStore;

/// Amount labels longer than this (in characters) are dropped.
pub const MAX_AMOUNT_LABEL_CHARS: usize = 20;

const SOURCE_SEPARATOR: &str = ", ";

/// Source label for an auto-added entry no dish can be credited with.
pub const UNATTRIBUTED_SOURCE: &str = "meal plan";

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Gather `(name, amount, dish)` from the recipes of `dish_names`.
///
/// Only the first recipe per dish counts, and ingredients with blank names
/// are skipped.
pub fn collect_ingredients(dish_names: &BTreeSet<String>, recipes: &[Recipe]) -> Vec<IngredientLine> {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for recipe in recipes {
        if !dish_names.contains(&recipe.dish_name) || !seen.insert(recipe.dish_name.as_str()) {
            continue;
        }
        for ingredient in recipe.ingredients.iter() {
            let name = ingredient.name.trim();
            if name.is_empty() {
                continue;
            }
            lines.push(IngredientLine {
                name: name.to_owned(),
                amount: ingredient.amount.trim().to_owned(),
                dish: recipe.dish_name.clone(),
            });
        }
    }
    lines
}

/// Map each dish to the slot of the first plan (chronologically) serving it.
pub fn dish_slots(plans: &[MealPlan]) -> HashMap<String, MealSlot> {
    let mut ordered: Vec<&MealPlan> = plans.iter().collect();
    ordered.sort_by_key(|p| (p.plan_date, p.meal_slot));
    let mut slots = HashMap::new();
    for plan in ordered {
        for dish in plan.dishes() {
            slots.entry(dish).or_insert(plan.meal_slot);
        }
    }
    slots
}

/// `"{dish} ({slot})"` per source, or the bare dish when no slot is known.
pub fn source_label<S: AsRef<str>>(sources: &[S], slots: &HashMap<String, MealSlot>) -> String {
    sources
        .iter()
        .map(|dish| {
            let dish = dish.as_ref();
            match slots.get(dish) {
                Some(slot) => format!("{dish} ({slot})"),
                None => dish.to_owned(),
            }
        })
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR)
}

pub fn amount_label(combined: &str) -> Option<String> {
    let combined = combined.trim();
    (!combined.is_empty() && combined.chars().count() <= MAX_AMOUNT_LABEL_CHARS)
        .then(|| combined.to_owned())
}

/// Drop consolidated ingredients already covered by stock or the shopping
/// list (case-insensitive exact name), and repeats within the result itself.
pub fn uncovered(
    consolidated: Vec<ConsolidatedIngredient>,
    inventory: &[InventoryItem],
    shopping: &[ShoppingEntry],
) -> Vec<ConsolidatedIngredient> {
    let mut known: HashSet<String> = inventory
        .iter()
        .map(|i| name_key(&i.name))
        .chain(shopping.iter().map(|e| name_key(&e.name)))
        .collect();

    consolidated
        .into_iter()
        .filter(|c| {
            let key = name_key(&c.name);
            !key.is_empty() && known.insert(key)
        })
        .collect()
}

/// Sources for an ingredient when the consolidation result lists none.
///
/// Dishes whose recipes name it exactly come first. Failing that, the one
/// dish whose ingredient name overlaps it the most. Empty when nothing
/// matches.
fn sources_for(item: &ConsolidatedIngredient, lines: &[IngredientLine]) -> Vec<String> {
    let listed: Vec<String> = item
        .sources
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    if !listed.is_empty() {
        return listed;
    }

    let key = name_key(&item.name);
    let mut dishes: Vec<String> = Vec::new();
    for line in lines.iter().filter(|l| name_key(&l.name) == key) {
        if !dishes.contains(&line.dish) {
            dishes.push(line.dish.clone());
        }
    }
    if !dishes.is_empty() || key.is_empty() {
        return dishes;
    }

    let mut best: Option<(usize, &IngredientLine)> = None;
    for line in lines {
        let line_key = name_key(&line.name);
        if line_key.is_empty() || !(key.contains(&line_key) || line_key.contains(&key)) {
            continue;
        }
        let overlap = line_key.chars().count().min(key.chars().count());
        if best.is_none_or(|(b, _)| overlap > b) {
            best = Some((overlap, line));
        }
    }
    best.map(|(_, line)| vec![line.dish.clone()]).unwrap_or_default()
}

pub struct FulfillmentEngine {
    client: ContentGenerationClient,
    store: Arc<dyn PlanStore>,
    mode: ConsolidationMode,
}

impl FulfillmentEngine {
    pub fn new(client: ContentGenerationClient, store: Arc<dyn PlanStore>, mode: ConsolidationMode) -> Self {
        Self { client, store, mode }
    }

    /// Consolidate the ingredients of the settled `dish_names` and insert
    /// what is not already stocked or listed. Returns the inserted count.
    ///
    /// Nothing is written unless consolidation succeeds, and all entries
    /// go in together.
    pub async fn fulfill(
        &self,
        dish_names: &BTreeSet<String>,
        recipes: &[Recipe],
        plans: &[MealPlan],
        inventory: &[InventoryItem],
        shopping: &[ShoppingEntry],
    ) -> Result<usize, FulfillError> {
        let entries = self
            .entries_for(dish_names, recipes, plans, inventory, shopping)
            .await?;
        self.insert(&entries).await
    }

    /// The net-new shopping entries for `dish_names`, without writing them.
    pub async fn entries_for(
        &self,
        dish_names: &BTreeSet<String>,
        recipes: &[Recipe],
        plans: &[MealPlan],
        inventory: &[InventoryItem],
        shopping: &[ShoppingEntry],
    ) -> Result<Vec<NewShoppingEntry>, FulfillError> {
        let lines = collect_ingredients(dish_names, recipes);
        if lines.is_empty() {
            tracing::info!(dishes = dish_names.len(), "no ingredients to consolidate");
            return Ok(Vec::new());
        }

        let consolidated = self.client.consolidate(self.mode, &lines).await?;
        let consolidated_count = consolidated.len();
        let remaining = uncovered(consolidated, inventory, shopping);

        let slots = dish_slots(plans);
        let entries: Vec<NewShoppingEntry> = remaining
            .iter()
            .map(|item| NewShoppingEntry {
                name: item.name.trim().to_owned(),
                category: FoodCategory::from_label(&item.category),
                count: 1,
                source_label: Some(match sources_for(item, &lines) {
                    sources if sources.is_empty() => UNATTRIBUTED_SOURCE.to_owned(),
                    sources => source_label(&sources, &slots),
                }),
                amount_label: amount_label(&item.combined_amount),
            })
            .collect();

        tracing::info!(
            lines = lines.len(),
            consolidated = consolidated_count,
            uncovered = entries.len(),
            mode = %self.mode,
            "ingredients consolidated"
        );
        Ok(entries)
    }

    /// Insert `entries` in one write. Returns the inserted count.
    pub async fn insert(&self, entries: &[NewShoppingEntry]) -> Result<usize, FulfillError> {
        if entries.is_empty() {
            tracing::info!("all ingredients already covered");
            return Ok(0);
        }

        let added = self
            .store
            .insert_shopping(entries)
            .await
            .map_err(FulfillError::Persistence)?;
        tracing::info!(added, "shopping list fulfilled");
        Ok(added)
    }
}

/// Remove every auto-added entry among `entries`. Running it again removes
/// nothing further.
pub async fn clear_auto_added(store: &dyn PlanStore, entries: &[ShoppingEntry]) -> anyhow::Result<u64> {
    let ids: Vec<_> = entries
        .iter()
        .filter(|e| e.is_auto_added())
        .map(|e| e.id)
        .collect();
    if ids.is_empty() {
        return Ok(0);
    }
    let removed = store.delete_shopping(&ids).await?;
    tracing::info!(removed, "cleared auto-added shopping entries");
    Ok(removed)
}
