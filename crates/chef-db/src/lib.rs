//! Postgres persistence for meal plans, recipes, inventory, the shopping
//! list and meal history.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
