//! Meal plan generation, concurrent recipe generation and shopping list
//! reconciliation.

pub mod error;
pub mod fulfillment;
pub mod generation;
pub mod kitchen;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;
pub mod settings;
pub mod settlement;
pub mod store;
pub mod tracker;
