pub mod history;
pub mod inventory;
pub mod meal_plans;
pub mod recipes;
pub mod shopping;
