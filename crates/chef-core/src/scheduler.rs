//! Scheduled background generation.
//!
//! Runs fire at 05:00 (morning mode) or 17:00 (evening mode) local time.
//! Each firing registers the next trigger with the [`SchedulerHost`] before
//! doing any work, skips when the window is already planned, and reports
//! success or failure back to the host.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tokio_util::sync::CancellationToken;

use chef_db::models::{MealPlan, MealSlot};

use crate::error::SchedulerError;
use crate::generation::prompts::HISTORY_LIMIT;
use crate::notify::{self, Notifier};
use crate::orchestrator::{Orchestrator, PlanSet};
use crate::settings::GenerationMode;
use crate::store::PlanStore;

pub const MORNING_TRIGGER_HOUR: u32 = 5;
pub const EVENING_TRIGGER_HOUR: u32 = 17;

fn trigger_time(mode: GenerationMode) -> NaiveTime {
    let hour = match mode {
        GenerationMode::Morning => MORNING_TRIGGER_HOUR,
        GenerationMode::Evening => EVENING_TRIGGER_HOUR,
    };
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// The first trigger strictly after `now`: today's trigger time if it is
/// still ahead, otherwise tomorrow's.
pub fn next_trigger_after(mode: GenerationMode, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(trigger_time(mode));
    if today > now {
        today
    } else {
        today.checked_add_days(Days::new(1)).unwrap_or(today)
    }
}

/// Whether a background run for `mode` on `today` has nothing to do.
///
/// Morning runs skip when anything is planned for today. Evening runs skip
/// when tonight's dinner exists and tomorrow already has both breakfast
/// and lunch.
pub fn should_skip(mode: GenerationMode, today: NaiveDate, existing: &[MealPlan]) -> bool {
    let has = |date: NaiveDate, slot: MealSlot| {
        existing
            .iter()
            .any(|p| p.plan_date == date && p.meal_slot == slot)
    };
    match mode {
        GenerationMode::Morning => existing.iter().any(|p| p.plan_date == today),
        GenerationMode::Evening => {
            let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
            let tomorrow_count = [MealSlot::Breakfast, MealSlot::Lunch]
                .into_iter()
                .filter(|slot| has(tomorrow, *slot))
                .count();
            has(today, MealSlot::Dinner) && tomorrow_count >= 2
        }
    }
}

/// The platform side of scheduling.
#[async_trait]
pub trait SchedulerHost: Send + Sync {
    /// Register the next firing.
    async fn submit(&self, at: NaiveDateTime) -> anyhow::Result<()>;

    /// Report how the current firing ended.
    async fn complete(&self, success: bool);
}

#[derive(Debug)]
pub enum TriggerOutcome {
    Skipped,
    Generated(PlanSet),
}

pub struct ScheduledTrigger {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn PlanStore>,
    host: Arc<dyn SchedulerHost>,
    notifier: Arc<dyn Notifier>,
    mode: GenerationMode,
}

impl ScheduledTrigger {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn PlanStore>,
        host: Arc<dyn SchedulerHost>,
        notifier: Arc<dyn Notifier>,
        mode: GenerationMode,
    ) -> Self {
        Self {
            orchestrator,
            store,
            host,
            notifier,
            mode,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    /// Handle one firing at local time `now`.
    pub async fn handle_trigger(
        &self,
        now: NaiveDateTime,
        cancel: CancellationToken,
    ) -> Result<TriggerOutcome, SchedulerError> {
        let next = next_trigger_after(self.mode, now);
        if let Err(e) = self.host.submit(next).await {
            tracing::warn!(error = %e, %next, "failed to register next trigger");
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(SchedulerError::Cancelled),
            result = self.run(now.date()) => result,
        };

        match &result {
            Ok(TriggerOutcome::Skipped) => {
                tracing::info!(mode = %self.mode, "window already planned, skipping background run");
            }
            Ok(TriggerOutcome::Generated(set)) => {
                tracing::info!(mode = %self.mode, epoch = set.epoch, "background plan generated");
            }
            Err(e) => tracing::warn!(mode = %self.mode, error = %e, "background run failed"),
        }
        self.host.complete(result.is_ok()).await;
        result
    }

    async fn run(&self, today: NaiveDate) -> Result<TriggerOutcome, SchedulerError> {
        let until = today.checked_add_days(Days::new(2)).unwrap_or(today);
        let existing = self
            .store
            .plans_between(today, until)
            .await
            .map_err(SchedulerError::Persistence)?;
        if should_skip(self.mode, today, &existing) {
            return Ok(TriggerOutcome::Skipped);
        }

        let inventory = self.store.inventory().await.map_err(SchedulerError::Persistence)?;
        let history = self
            .store
            .recent_history(HISTORY_LIMIT)
            .await
            .map_err(SchedulerError::Persistence)?;

        let set = self
            .orchestrator
            .generate_plan_on(today, self.mode, &inventory, &history)
            .await?;
        notify::dispatch(self.notifier.as_ref(), &notify::background_message(self.mode)).await;
        Ok(TriggerOutcome::Generated(set))
    }
}

/// In-process [`SchedulerHost`] that remembers the registered trigger.
#[derive(Debug, Default)]
pub struct LocalScheduler {
    next: Mutex<Option<NaiveDateTime>>,
}

impl LocalScheduler {
    pub fn next(&self) -> Option<NaiveDateTime> {
        *self.next.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl SchedulerHost for LocalScheduler {
    async fn submit(&self, at: NaiveDateTime) -> anyhow::Result<()> {
        *self.next.lock().unwrap_or_else(|p| p.into_inner()) = Some(at);
        tracing::debug!(%at, "next trigger registered");
        Ok(())
    }

    async fn complete(&self, success: bool) {
        tracing::debug!(success, "background run finished");
    }
}

/// Fire `trigger` at every registered time until `cancel` fires. Each run
/// gets `run_budget` before it is cancelled.
pub async fn run_local(
    trigger: Arc<ScheduledTrigger>,
    host: Arc<LocalScheduler>,
    run_budget: Duration,
    cancel: CancellationToken,
) {
    let mode = trigger.mode();
    let mut next = next_trigger_after(mode, Local::now().naive_local());
    if let Err(e) = host.submit(next).await {
        tracing::warn!(error = %e, "failed to register first trigger");
    }
    tracing::info!(%mode, %next, "scheduler started");

    loop {
        let wait = (next - Local::now().naive_local())
            .to_std()
            .unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let now = Local::now().naive_local();
        let run_cancel = cancel.child_token();
        let deadline = run_cancel.clone();
        let budget = tokio::spawn(async move {
            tokio::time::sleep(run_budget).await;
            deadline.cancel();
        });

        // Failures are logged and reported to the host inside the trigger.
        let _ = trigger.handle_trigger(now, run_cancel).await;
        budget.abort();

        next = host.next().unwrap_or_else(|| next_trigger_after(mode, now));
        if cancel.is_cancelled() {
            break;
        }
    }

    tracing::info!("scheduler stopped");
}
