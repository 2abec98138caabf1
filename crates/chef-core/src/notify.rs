//! Notification boundary.

use async_trait::async_trait;

use crate::settings::GenerationMode;

/// Delivers user-facing notifications. Delivery is skipped when
/// [`Notifier::is_permitted`] is false.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn is_permitted(&self) -> bool;

    async fn notify(&self, title: &str, body: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Message sent once a batch settles.
pub fn settlement_message(dish_count: usize, added_count: usize) -> Notification {
    let body = if added_count == 0 {
        format!("Recipes for {dish_count} dishes are ready. Nothing new to buy.")
    } else {
        format!(
            "Recipes for {dish_count} dishes are ready. Added {added_count} items to the shopping list."
        )
    };
    Notification {
        title: "Shopping list updated".to_owned(),
        body,
    }
}

/// Message sent after a scheduled background run created plans.
pub fn background_message(mode: GenerationMode) -> Notification {
    let body = match mode {
        GenerationMode::Morning => "Today's breakfast, lunch and dinner are planned.",
        GenerationMode::Evening => "Tonight's dinner and tomorrow's breakfast and lunch are planned.",
    };
    Notification {
        title: "Meal plan ready".to_owned(),
        body: body.to_owned(),
    }
}

/// Send `message` if permitted. Delivery failures are logged, never returned.
pub async fn dispatch(notifier: &dyn Notifier, message: &Notification) {
    if !notifier.is_permitted().await {
        tracing::debug!(title = %message.title, "notifications not permitted, skipping");
        return;
    }
    if let Err(e) = notifier.notify(&message.title, &message.body).await {
        tracing::warn!(error = %e, title = %message.title, "failed to deliver notification");
    }
}

/// Writes notifications to the log. Used by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn is_permitted(&self) -> bool {
        true
    }

    async fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(title, body, "notification");
        Ok(())
    }
}
