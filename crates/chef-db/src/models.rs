use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

/// Separator between dish names inside a composite menu string.
pub const DISH_SEPARATOR: char = '・';

/// Error returned when parsing an invalid enum value from its text form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Meal slot within a day.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 3] = [Self::Breakfast, Self::Lunch, Self::Dinner];

    /// Local hour a meal in this slot is nominally eaten at.
    pub fn nominal_hour(self) -> u32 {
        match self {
            Self::Breakfast => 8,
            Self::Lunch => 12,
            Self::Dinner => 19,
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        };
        f.write_str(s)
    }
}

impl FromStr for MealSlot {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            other => Err(ParseEnumError::new("meal slot", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Status of a meal plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    Completed,
    Changed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Planned => "planned",
            Self::Completed => "completed",
            Self::Changed => "changed",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "completed" => Ok(Self::Completed),
            "changed" => Ok(Self::Changed),
            other => Err(ParseEnumError::new("plan status", other)),
        }
    }
}

// ---------------------------------------------------------------------------

/// Food category shared by inventory and shopping entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FoodCategory {
    Vegetables,
    Meat,
    Seafood,
    Dairy,
    Egg,
    Fruits,
    Seasoning,
    Grain,
    Drink,
    Other,
}

impl FoodCategory {
    /// Japanese display label, also the vocabulary the generation service
    /// is asked to answer with.
    pub fn label(self) -> &'static str {
        match self {
            Self::Vegetables => "野菜",
            Self::Meat => "肉類",
            Self::Seafood => "魚介類",
            Self::Dairy => "乳製品",
            Self::Egg => "卵",
            Self::Fruits => "果物",
            Self::Seasoning => "調味料",
            Self::Grain => "主食",
            Self::Drink => "飲料",
            Self::Other => "その他",
        }
    }

    /// Lenient parse from either the english name or a Japanese label.
    ///
    /// Unknown labels fall back to [`FoodCategory::Other`].
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if let Ok(c) = label.to_ascii_lowercase().parse::<Self>() {
            return c;
        }
        match label {
            "野菜" => Self::Vegetables,
            "肉類" | "肉" => Self::Meat,
            "魚介類" | "魚" => Self::Seafood,
            "乳製品" => Self::Dairy,
            "卵" | "卵・日配品" => Self::Egg,
            "果物" => Self::Fruits,
            "調味料" => Self::Seasoning,
            "主食" | "米・麺類" => Self::Grain,
            "飲料" => Self::Drink,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FoodCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Vegetables => "vegetables",
            Self::Meat => "meat",
            Self::Seafood => "seafood",
            Self::Dairy => "dairy",
            Self::Egg => "egg",
            Self::Fruits => "fruits",
            Self::Seasoning => "seasoning",
            Self::Grain => "grain",
            Self::Drink => "drink",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for FoodCategory {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vegetables" => Ok(Self::Vegetables),
            "meat" => Ok(Self::Meat),
            "seafood" => Ok(Self::Seafood),
            "dairy" => Ok(Self::Dairy),
            "egg" => Ok(Self::Egg),
            "fruits" => Ok(Self::Fruits),
            "seasoning" => Ok(Self::Seasoning),
            "grain" => Ok(Self::Grain),
            "drink" => Ok(Self::Drink),
            "other" => Ok(Self::Other),
            other => Err(ParseEnumError::new("food category", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// One ingredient line of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub amount: String,
}

/// Split a composite menu string into trimmed, non-empty dish names.
pub fn split_dishes(menu_text: &str) -> Vec<String> {
    menu_text
        .split(DISH_SEPARATOR)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// One meal slot's dish assignment for a date.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlan {
    pub id: Uuid,
    pub plan_date: NaiveDate,
    pub meal_slot: MealSlot,
    pub menu_text: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

impl MealPlan {
    /// Dish names making up this plan's menu.
    pub fn dishes(&self) -> Vec<String> {
        split_dishes(&self.menu_text)
    }
}

/// A generated recipe, owned by exactly one meal plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub dish_name: String,
    pub ingredients: Json<Vec<Ingredient>>,
    pub steps: Json<Vec<String>>,
    pub cooking_time: String,
    pub created_at: DateTime<Utc>,
}

/// An item currently in stock.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InventoryItem {
    pub id: Uuid,
    pub name: String,
    pub category: FoodCategory,
    pub expiry: Option<NaiveDate>,
    pub count: i32,
    pub created_at: DateTime<Utc>,
}

/// An entry on the shopping list.
///
/// `source_label` is set only on entries created by automatic fulfillment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShoppingEntry {
    pub id: Uuid,
    pub name: String,
    pub category: FoodCategory,
    pub count: i32,
    pub checked: bool,
    pub source_label: Option<String>,
    pub amount_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ShoppingEntry {
    pub fn is_auto_added(&self) -> bool {
        self.source_label.is_some()
    }
}

/// A meal that was actually eaten.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealHistory {
    pub id: Uuid,
    pub eaten_on: NaiveDate,
    pub meal_slot: MealSlot,
    pub menu_text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_dishes_trims_and_drops_empty() {
        let dishes = split_dishes(" 鮭の塩焼き・キャベツの浅漬け ・・ わかめの味噌汁・");
        assert_eq!(
            dishes,
            vec!["鮭の塩焼き", "キャベツの浅漬け", "わかめの味噌汁"]
        );
    }

    #[test]
    fn split_dishes_of_blank_menu_is_empty() {
        assert!(split_dishes("  ・ ").is_empty());
    }

    #[test]
    fn meal_slot_roundtrip() {
        for slot in MealSlot::ALL {
            assert_eq!(slot.to_string().parse::<MealSlot>().unwrap(), slot);
        }
        assert!("brunch".parse::<MealSlot>().is_err());
    }

    #[test]
    fn category_from_japanese_labels() {
        assert_eq!(FoodCategory::from_label("肉類"), FoodCategory::Meat);
        assert_eq!(FoodCategory::from_label("卵・日配品"), FoodCategory::Egg);
        assert_eq!(FoodCategory::from_label("米・麺類"), FoodCategory::Grain);
        assert_eq!(FoodCategory::from_label(" 野菜 "), FoodCategory::Vegetables);
        assert_eq!(FoodCategory::from_label("Dairy"), FoodCategory::Dairy);
        assert_eq!(FoodCategory::from_label("宇宙食"), FoodCategory::Other);
    }

    #[test]
    fn plan_status_parse_error_names_kind() {
        let err = "done".parse::<PlanStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid plan status: \"done\"");
    }
}
