//! Prompt text for each kind of generation request.

use chrono::NaiveDate;

use chef_db::models::{FoodCategory, InventoryItem, MealHistory};

use super::IngredientLine;
use crate::settings::{ConsolidationMode, GenerationMode};

/// History entries included in a meal-plan prompt (a week of three meals).
pub const HISTORY_LIMIT: usize = 21;

const JSON_ONLY: &str = "Answer with the requested JSON only, with no text before or after it.";

const MENU_RULES: &str = "\
Menu rules:
- Name concrete dishes in Japanese. Never answer with vague names such as a set meal.
- Separate the dishes of one meal with \"・\", e.g. \"鮭の塩焼き・ほうれん草のおひたし・豆腐の味噌汁・白米\".
- Breakfast and lunch should be quick to prepare.
- Dinner should balance a staple, a main, a side and a soup.
Use ingredients that expire soon first, avoid repeating recent meals, and make good use of the stock.";

fn category_vocabulary() -> String {
    [
        FoodCategory::Vegetables,
        FoodCategory::Meat,
        FoodCategory::Seafood,
        FoodCategory::Dairy,
        FoodCategory::Egg,
        FoodCategory::Fruits,
        FoodCategory::Seasoning,
        FoodCategory::Grain,
        FoodCategory::Drink,
        FoodCategory::Other,
    ]
    .iter()
    .map(|c| c.label())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Expiry hint for a stock line, relative to `today`.
pub fn expiry_hint(expiry: NaiveDate, today: NaiveDate) -> String {
    match (expiry - today).num_days() {
        d if d < 0 => "expired".to_owned(),
        0 => "expires today".to_owned(),
        1 => "1 day left".to_owned(),
        d => format!("{d} days left"),
    }
}

pub fn stock_lines(inventory: &[InventoryItem], today: NaiveDate) -> String {
    if inventory.is_empty() {
        return "(no stock)".to_owned();
    }
    inventory
        .iter()
        .map(|item| {
            let mut line = format!("- {} ({}) x{}", item.name, item.category.label(), item.count);
            if let Some(expiry) = item.expiry {
                line.push_str(", ");
                line.push_str(&expiry_hint(expiry, today));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn history_lines(history: &[MealHistory]) -> String {
    if history.is_empty() {
        return "(no records)".to_owned();
    }
    history
        .iter()
        .take(HISTORY_LIMIT)
        .map(|h| format!("{} [{}] {}", h.eaten_on, h.meal_slot, h.menu_text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `(instructions, prompt)` for a three-meal plan.
pub fn meal_plan(
    mode: GenerationMode,
    today: NaiveDate,
    inventory: &[InventoryItem],
    history: &[MealHistory],
) -> (String, String) {
    let (task, breakfast, lunch, dinner) = match mode {
        GenerationMode::Morning => (
            "Plan today's breakfast, lunch and dinner.",
            "today's breakfast",
            "today's lunch",
            "today's dinner",
        ),
        GenerationMode::Evening => (
            "Plan tonight's dinner and tomorrow's breakfast and lunch.",
            "tomorrow's breakfast",
            "tomorrow's lunch",
            "tonight's dinner",
        ),
    };

    let instructions = format!(
        "You are an expert in Japanese home cooking. Propose meals based on the \
         refrigerator stock and the recent meal history.\n\n{MENU_RULES}\n\n{JSON_ONLY}"
    );

    let prompt = format!(
        "# Stock (as of {today})\n{stock}\n\n# Recent meals\n{history}\n\n# Task\n{task}\n\n\
         Respond with this JSON object:\n\
         {{\n  \"breakfast\": \"dishes for {breakfast}\",\n  \"lunch\": \"dishes for {lunch}\",\n  \
         \"dinner\": \"dishes for {dinner}\",\n  \"reason\": \"one or two sentences on why\"\n}}",
        stock = stock_lines(inventory, today),
        history = history_lines(history),
    );

    (instructions, prompt)
}

/// `(instructions, prompt)` for one dish's recipe.
pub fn recipe(dish: &str, servings: u8) -> (String, String) {
    let instructions = format!(
        "You are a professional cook. Write a recipe for {servings} servings.\n\
         - List every ingredient, including seasonings and garnishes.\n\
         - Give concrete amounts such as 300g, 大さじ2 or 1個.\n\
         - Write one sentence per step with heat levels and times, in cooking order.\n\
         Write ingredient names and steps in Japanese.\n{JSON_ONLY}"
    );

    let prompt = format!(
        "Dish: {dish}\n\nRespond with this JSON object:\n\
         {{\n  \"dishName\": \"{dish}\",\n  \"ingredients\": [{{\"name\": \"ingredient\", \"amount\": \"amount\"}}],\n  \
         \"steps\": [\"step 1\", \"step 2\"],\n  \"cookingTime\": \"約X分\"\n}}"
    );

    (instructions, prompt)
}

/// `(instructions, prompt)` for consolidating a shopping list.
pub fn consolidation(mode: ConsolidationMode, lines: &[IngredientLine]) -> (String, String) {
    let categories = category_vocabulary();
    let rules = match mode {
        ConsolidationMode::Merge => format!(
            "Merge identical ingredients and ingredients that the same product can replace \
             (for example 長ねぎ and ネギ). Use a common name for the merged item. Sum amounts \
             with the same unit; list amounts with different units as \"300g + 大さじ2\". \
             List every dish an ingredient is used in under sources. \
             Choose category from: {categories}."
        ),
        ConsolidationMode::Categorize => format!(
            "Assign a category to every ingredient. Keep names, amounts and dishes exactly \
             as given; do not merge entries. Choose category from: {categories}."
        ),
    };

    let instructions = format!("You manage ingredients for a home kitchen.\n{rules}\n{JSON_ONLY}");

    let listing = lines
        .iter()
        .map(|l| format!("- {} ({}) <- {}", l.name, l.amount, l.dish))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "# Ingredients\n{listing}\n\nRespond with this JSON array:\n\
         [\n  {{\"name\": \"ingredient\", \"combinedAmount\": \"amount\", \
         \"sources\": [\"dish\"], \"category\": \"category\"}}\n]"
    );

    (instructions, prompt)
}
