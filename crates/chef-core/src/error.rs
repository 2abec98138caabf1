//! Error types shared across the chef core.

use std::time::Duration;

use uuid::Uuid;

/// Failure of a single call to the content generation service.
///
/// Cloneable so a per-dish failure can be recorded and reported more than
/// once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation service unavailable: {0}")]
    ModelUnavailable(String),

    #[error("generation was blocked by the content policy")]
    PolicyRefused,

    #[error("{}", .0.as_deref().unwrap_or("the model refused the request"))]
    Refusal(Option<String>),

    #[error("could not parse generation output: {0}")]
    MalformedOutput(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of plan creation or a plan update.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("meal plan {0} not found")]
    NotFound(Uuid),

    #[error("menu {0:?} contains no dish names")]
    EmptyMenu(String),

    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

/// Failure of a fulfillment run. Plans and recipes are never touched.
#[derive(Debug, thiserror::Error)]
pub enum FulfillError {
    #[error("ingredient consolidation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

/// Failure of a scheduled background run.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("background run was cancelled")]
    Cancelled,

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}
