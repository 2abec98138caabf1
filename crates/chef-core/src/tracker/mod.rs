//! Recipe generation tracker.
//!
//! Owns the [`GenerationState`]: which dishes are in flight, which failed,
//! and the pending batch the settlement detector watches. Every recipe unit
//! runs on its own tokio task and reports back through [`Tracker::finish_dish`],
//! which emits a [`TrackerEvent`] for the single settlement subscriber.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use chef_db::queries::recipes::NewRecipe;

use crate::generation::ContentGenerationClient;
use crate::store::PlanStore;

/// The dishes of one generation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBatch {
    /// Increases with every installed batch.
    pub epoch: u64,
    /// Dish name to the batch plan that owns it (the first plan listing it).
    pub dishes: BTreeMap<String, Uuid>,
    pub plan_ids: Vec<Uuid>,
}

impl PendingBatch {
    pub fn is_empty(&self) -> bool {
        self.dishes.is_empty()
    }

    pub fn dish_names(&self) -> BTreeSet<String> {
        self.dishes.keys().cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct GenerationState {
    pub(crate) in_flight: HashSet<String>,
    pub(crate) failed: HashMap<String, String>,
    pub(crate) pending: PendingBatch,
    pub(crate) fulfilling: bool,
    next_epoch: u64,
}

/// Change notifications consumed by the settlement detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    DishSettled { dish: String, succeeded: bool },
    BatchInstalled { epoch: u64 },
    Reevaluate,
}

/// Terminal result of one recipe unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DishOutcome {
    Persisted,
    Failed(String),
}

pub struct Tracker {
    state: Mutex<GenerationState>,
    store: Arc<dyn PlanStore>,
    client: ContentGenerationClient,
    /// Serializes recipe writes per owning plan.
    plan_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    /// Held by fulfillment while it writes the shopping list and by the
    /// orchestrator while it clears auto-added entries and installs a batch.
    shopping_lock: tokio::sync::Mutex<()>,
    events: mpsc::UnboundedSender<TrackerEvent>,
    unit_timeout: Duration,
}

impl Tracker {
    /// Create a tracker and the receiving end of its event channel.
    pub fn new(
        store: Arc<dyn PlanStore>,
        client: ContentGenerationClient,
        unit_timeout: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(Self {
            state: Mutex::new(GenerationState::default()),
            store,
            client,
            plan_locks: Mutex::new(HashMap::new()),
            shopping_lock: tokio::sync::Mutex::new(()),
            events,
            unit_timeout,
        });
        (tracker, rx)
    }

    /// Lock the shared state, recovering from poisoning. No critical
    /// section in this crate awaits or panics mid-update.
    pub(crate) fn state(&self) -> MutexGuard<'_, GenerationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn emit(&self, event: TrackerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("settlement subscriber gone, dropping tracker event");
        }
    }

    pub fn store(&self) -> &Arc<dyn PlanStore> {
        &self.store
    }

    pub fn is_in_flight(&self, dish: &str) -> bool {
        self.state().in_flight.contains(dish)
    }

    pub fn error_for(&self, dish: &str) -> Option<String> {
        self.state().failed.get(dish).cloned()
    }

    pub fn in_flight(&self) -> BTreeSet<String> {
        self.state().in_flight.iter().cloned().collect()
    }

    pub fn pending_batch(&self) -> PendingBatch {
        self.state().pending.clone()
    }

    /// Epoch of the most recently installed batch.
    pub fn latest_epoch(&self) -> u64 {
        self.state().next_epoch
    }

    pub(crate) async fn lock_shopping(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.shopping_lock.lock().await
    }

    /// Install a new pending batch, replacing any previous one, and return
    /// its epoch. Stale errors for the batch's dishes are dropped so they
    /// cannot count as outcomes of the new cycle.
    pub fn install_batch(&self, dishes: BTreeMap<String, Uuid>, plan_ids: Vec<Uuid>) -> u64 {
        let epoch = {
            let mut state = self.state();
            state.next_epoch += 1;
            let epoch = state.next_epoch;
            for dish in dishes.keys() {
                state.failed.remove(dish);
            }
            let replaced = std::mem::replace(
                &mut state.pending,
                PendingBatch {
                    epoch,
                    dishes,
                    plan_ids,
                },
            );
            if !replaced.is_empty() {
                tracing::info!(
                    superseded = replaced.epoch,
                    epoch,
                    "pending batch superseded before settlement"
                );
            }
            epoch
        };
        self.emit(TrackerEvent::BatchInstalled { epoch });
        epoch
    }

    /// Start generating `dish` for `plan_id`.
    ///
    /// Does nothing and returns `false` when the dish is already in flight
    /// or the plan already owns a recipe for it.
    pub async fn start_dish(self: &Arc<Self>, plan_id: Uuid, dish: &str) -> bool {
        if !self.state().in_flight.insert(dish.to_owned()) {
            tracing::debug!(dish, "recipe already in flight");
            return false;
        }

        // Claimed before the lookup; released again if a recipe exists.
        match self.store.get_recipe(plan_id, dish).await {
            Ok(Some(_)) => {
                self.state().in_flight.remove(dish);
                self.emit(TrackerEvent::Reevaluate);
                return false;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%plan_id, dish, error = %e, "recipe lookup failed, generating anyway");
            }
        }

        tracing::info!(%plan_id, dish, "starting recipe generation");

        let tracker = Arc::clone(self);
        let dish = dish.to_owned();
        tokio::spawn(async move {
            let unit = tokio::time::timeout(tracker.unit_timeout, tracker.run_unit(plan_id, &dish));
            let outcome = match AssertUnwindSafe(unit).catch_unwind().await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => DishOutcome::Failed(format!(
                    "recipe generation abandoned after {:?}",
                    tracker.unit_timeout
                )),
                Err(_) => DishOutcome::Failed("recipe generation crashed".to_owned()),
            };
            tracker.finish_dish(plan_id, &dish, outcome);
        });

        true
    }

    async fn run_unit(&self, plan_id: Uuid, dish: &str) -> DishOutcome {
        let detail = match self.client.recipe(dish).await {
            Ok(detail) => detail,
            Err(e) => return DishOutcome::Failed(e.to_string()),
        };

        let new = NewRecipe {
            dish_name: dish.to_owned(),
            ingredients: detail.ingredients,
            steps: detail.steps,
            cooking_time: detail.cooking_time,
        };

        let lock = self.plan_lock(plan_id);
        let _guard = lock.lock().await;
        match self.store.insert_recipe(plan_id, &new).await {
            Ok(_) => DishOutcome::Persisted,
            Err(e) => DishOutcome::Failed(format!("failed to save recipe: {e:#}")),
        }
    }

    fn plan_lock(&self, plan_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .plan_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(plan_id).or_default())
    }

    /// Record a unit's outcome, then release the dish from `in_flight`.
    ///
    /// An outcome from a unit whose plan is not part of the current batch
    /// is not recorded against a dish the current batch is waiting on;
    /// instead the dish is restarted for the batch plan.
    pub fn finish_dish(self: &Arc<Self>, plan_id: Uuid, dish: &str, outcome: DishOutcome) {
        let restart_for = {
            let mut state = self.state();
            let stale_target = state
                .pending
                .dishes
                .get(dish)
                .copied()
                .filter(|_| !state.pending.plan_ids.contains(&plan_id));

            if stale_target.is_none() {
                match &outcome {
                    DishOutcome::Persisted => {
                        state.failed.remove(dish);
                    }
                    DishOutcome::Failed(message) => {
                        state.failed.insert(dish.to_owned(), message.clone());
                    }
                }
            }
            state.in_flight.remove(dish);
            stale_target
        };

        match &outcome {
            DishOutcome::Persisted => tracing::info!(%plan_id, dish, "recipe saved"),
            DishOutcome::Failed(message) => {
                tracing::warn!(%plan_id, dish, error = %message, "recipe generation failed")
            }
        }

        self.emit(TrackerEvent::DishSettled {
            dish: dish.to_owned(),
            succeeded: outcome == DishOutcome::Persisted,
        });

        if let Some(batch_plan) = restart_for {
            tracing::info!(%plan_id, %batch_plan, dish, "restarting superseded recipe for current batch");
            let tracker = Arc::clone(self);
            let dish = dish.to_owned();
            tokio::spawn(async move {
                tracker.start_dish(batch_plan, &dish).await;
            });
        }
    }
}
