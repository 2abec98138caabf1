//! Client for the structured content generation service.
//!
//! [`TextGenerator`] is the raw text-in, text-out seam; [`ContentGenerationClient`]
//! builds prompts, enforces the per-call timeout and parses the responses
//! into typed values.

pub mod http;
pub mod parse;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use chef_db::models::{Ingredient, InventoryItem, MealHistory};

use crate::error::GenerationError;
use crate::settings::{ConsolidationMode, GenerationMode};

pub use http::{HttpGenerator, HttpGeneratorConfig};

/// What a request asks for. Carried alongside the prompt text so that
/// scripted generators can answer without parsing prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    MealPlan {
        mode: GenerationMode,
    },
    Recipe {
        dish: String,
    },
    Consolidate {
        mode: ConsolidationMode,
        ingredients: Vec<IngredientLine>,
    },
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: RequestKind,
    pub instructions: String,
    pub prompt: String,
}

/// A backend that turns a request into raw model text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Three menus plus the model's rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMenu {
    pub breakfast: String,
    pub lunch: String,
    pub dinner: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDetail {
    #[serde(default)]
    pub dish_name: String,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<String>,
    #[serde(default)]
    pub cooking_time: String,
}

/// One ingredient use gathered from a recipe, as sent for consolidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientLine {
    pub name: String,
    pub amount: String,
    pub dish: String,
}

/// One line of the consolidated shopping list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedIngredient {
    pub name: String,
    #[serde(default)]
    pub combined_amount: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub category: String,
}

/// Typed front end over a [`TextGenerator`].
#[derive(Clone)]
pub struct ContentGenerationClient {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    servings: u8,
}

impl ContentGenerationClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            generator,
            timeout,
            servings: 2,
        }
    }

    pub fn with_servings(mut self, servings: u8) -> Self {
        self.servings = servings;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn request(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        match tokio::time::timeout(self.timeout, self.generator.complete(&request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(kind = ?request.kind, timeout = ?self.timeout, "generation call timed out");
                Err(GenerationError::Timeout(self.timeout))
            }
        }
    }

    pub async fn daily_menu(
        &self,
        mode: GenerationMode,
        today: NaiveDate,
        inventory: &[InventoryItem],
        history: &[MealHistory],
    ) -> Result<DailyMenu, GenerationError> {
        let (instructions, prompt) = prompts::meal_plan(mode, today, inventory, history);
        let raw = self
            .request(GenerationRequest {
                kind: RequestKind::MealPlan { mode },
                instructions,
                prompt,
            })
            .await?;
        parse::parse_json(&raw)
    }

    pub async fn recipe(&self, dish: &str) -> Result<RecipeDetail, GenerationError> {
        let (instructions, prompt) = prompts::recipe(dish, self.servings);
        let raw = self
            .request(GenerationRequest {
                kind: RequestKind::Recipe {
                    dish: dish.to_owned(),
                },
                instructions,
                prompt,
            })
            .await?;
        parse::parse_json(&raw)
    }

    /// Consolidate ingredient lines. An empty input makes no call.
    pub async fn consolidate(
        &self,
        mode: ConsolidationMode,
        lines: &[IngredientLine],
    ) -> Result<Vec<ConsolidatedIngredient>, GenerationError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let (instructions, prompt) = prompts::consolidation(mode, lines);
        let raw = self
            .request(GenerationRequest {
                kind: RequestKind::Consolidate {
                    mode,
                    ingredients: lines.to_vec(),
                },
                instructions,
                prompt,
            })
            .await?;
        parse::parse_json(&raw)
    }
}
