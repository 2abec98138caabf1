//! Batch settlement detection.
//!
//! A single subscriber consumes [`TrackerEvent`]s and re-evaluates the
//! current pending batch after each one. When every dish in the batch has
//! either a persisted recipe or a recorded error, the batch is taken out of
//! the shared state in one critical section and handed to fulfillment.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::fulfillment::FulfillmentEngine;
use crate::notify::{self, Notifier};
use crate::tracker::{GenerationState, PendingBatch, Tracker, TrackerEvent};

/// A batch taken for fulfillment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledBatch {
    pub epoch: u64,
    pub dishes: BTreeSet<String>,
    pub plan_ids: Vec<Uuid>,
    /// Dishes that ended with an error, and the error.
    pub failed: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    Added(usize),
    /// Auto-fill is off.
    Skipped,
    /// A newer batch was installed before the entries were written; they
    /// were dropped.
    Superseded,
    Failed(String),
}

/// Published once per settled batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReport {
    pub batch: SettledBatch,
    pub outcome: FulfillmentOutcome,
}

/// Whether `pending` is settled given the persisted dish names.
fn is_settled(state: &GenerationState, pending: &PendingBatch, persisted: &HashSet<String>) -> bool {
    !pending.is_empty()
        && pending.dishes.keys().all(|dish| {
            !state.in_flight.contains(dish)
                && (persisted.contains(dish) || state.failed.contains_key(dish))
        })
}

pub struct SettlementDetector {
    tracker: Arc<Tracker>,
    engine: FulfillmentEngine,
    notifier: Arc<dyn Notifier>,
    auto_fill: bool,
    reports: broadcast::Sender<SettlementReport>,
}

impl SettlementDetector {
    pub fn new(
        tracker: Arc<Tracker>,
        engine: FulfillmentEngine,
        notifier: Arc<dyn Notifier>,
        auto_fill: bool,
    ) -> Arc<Self> {
        let (reports, _) = broadcast::channel(16);
        Arc::new(Self {
            tracker,
            engine,
            notifier,
            auto_fill,
            reports,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementReport> {
        self.reports.subscribe()
    }

    /// Consume tracker events until the channel closes or `cancel` fires.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TrackerEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("settlement detector stopping");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    tracing::trace!(?event, "tracker event");
                    self.evaluate().await;
                }
            }
        }
    }

    /// Check the current pending batch and start fulfillment if it settled.
    ///
    /// Returns the taken batch, or `None` when nothing was taken. Safe to
    /// call any number of times: a batch is taken at most once.
    pub async fn evaluate(self: &Arc<Self>) -> Option<SettledBatch> {
        let (epoch, plan_ids) = {
            let state = self.tracker.state();
            if state.fulfilling || state.pending.is_empty() {
                return None;
            }
            if state.pending.dishes.keys().any(|d| state.in_flight.contains(d)) {
                return None;
            }
            (state.pending.epoch, state.pending.plan_ids.clone())
        };

        let persisted: HashSet<String> = match self.tracker.store().recipes_for_plans(&plan_ids).await {
            Ok(recipes) => recipes.into_iter().map(|r| r.dish_name).collect(),
            Err(e) => {
                tracing::warn!(error = %e, epoch, "failed to load recipes for settlement check");
                return None;
            }
        };

        let batch = {
            let mut state = self.tracker.state();
            if state.fulfilling || state.pending.epoch != epoch {
                return None;
            }
            let pending = state.pending.clone();
            if !is_settled(&state, &pending, &persisted) {
                return None;
            }

            let failed = pending
                .dishes
                .keys()
                .filter_map(|d| state.failed.get(d).map(|e| (d.clone(), e.clone())))
                .collect();
            state.pending = PendingBatch {
                epoch,
                ..PendingBatch::default()
            };
            state.fulfilling = true;

            SettledBatch {
                epoch,
                dishes: pending.dish_names(),
                plan_ids: pending.plan_ids,
                failed,
            }
        };

        tracing::info!(
            epoch,
            dishes = batch.dishes.len(),
            failed = batch.failed.len(),
            "batch settled"
        );

        let detector = Arc::clone(self);
        let handed = batch.clone();
        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(detector.fulfill(&handed)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::error!(epoch = handed.epoch, "fulfillment crashed");
                    FulfillmentOutcome::Failed("fulfillment crashed".to_owned())
                }
            };
            detector.tracker.state().fulfilling = false;
            // Nobody listening is fine.
            let _ = detector.reports.send(SettlementReport {
                batch: handed,
                outcome,
            });
            detector.tracker.emit(TrackerEvent::Reevaluate);
        });

        Some(batch)
    }

    async fn fulfill(&self, batch: &SettledBatch) -> FulfillmentOutcome {
        let dish_count = batch.dishes.len();

        if !self.auto_fill {
            tracing::info!(epoch = batch.epoch, "auto-fill disabled, skipping fulfillment");
            notify::dispatch(self.notifier.as_ref(), &notify::settlement_message(dish_count, 0)).await;
            return FulfillmentOutcome::Skipped;
        }

        match self.run_engine(batch).await {
            Ok(Some(added)) => {
                notify::dispatch(
                    self.notifier.as_ref(),
                    &notify::settlement_message(dish_count, added),
                )
                .await;
                FulfillmentOutcome::Added(added)
            }
            Ok(None) => FulfillmentOutcome::Superseded,
            Err(e) => {
                tracing::error!(epoch = batch.epoch, error = %e, "fulfillment failed");
                FulfillmentOutcome::Failed(e.to_string())
            }
        }
    }

    /// Returns `None` when a newer batch was installed while consolidating.
    async fn run_engine(&self, batch: &SettledBatch) -> Result<Option<usize>, crate::error::FulfillError> {
        use crate::error::FulfillError::Persistence;

        let store = self.tracker.store();
        let recipes = store.recipes_for_plans(&batch.plan_ids).await.map_err(Persistence)?;
        let mut plans = Vec::with_capacity(batch.plan_ids.len());
        for id in &batch.plan_ids {
            if let Some(plan) = store.get_plan(*id).await.map_err(Persistence)? {
                plans.push(plan);
            }
        }
        let inventory = store.inventory().await.map_err(Persistence)?;
        let shopping = store.shopping().await.map_err(Persistence)?;

        let entries = self
            .engine
            .entries_for(&batch.dishes, &recipes, &plans, &inventory, &shopping)
            .await?;

        // The orchestrator clears auto-added entries and installs the next
        // batch under the same lock.
        let _guard = self.tracker.lock_shopping().await;
        let latest = self.tracker.latest_epoch();
        if latest != batch.epoch {
            tracing::info!(
                epoch = batch.epoch,
                latest,
                dropped = entries.len(),
                "batch superseded during fulfillment, not writing shopping entries"
            );
            return Ok(None);
        }
        self.engine.insert(&entries).await.map(Some)
    }
}
