//! Scripted collaborators shared by the chef-core integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{Semaphore, broadcast};

use chef_core::error::GenerationError;
use chef_core::generation::{GenerationRequest, RequestKind, TextGenerator};
use chef_core::kitchen::{Kitchen, KitchenConfig, wait_for_settlement};
use chef_core::notify::Notifier;
use chef_core::settings::Settings;
use chef_core::settlement::SettlementReport;
use chef_core::store::MemoryStore;

/// How a scripted recipe request behaves.
#[derive(Clone)]
pub enum DishScript {
    Ingredients(Vec<(&'static str, &'static str)>),
    Fail(GenerationError),
    /// Never answers; the client timeout turns this into `Timeout`.
    Hang,
    /// Waits for a permit on the gate, then answers with the ingredients.
    Gated(Arc<Semaphore>, Vec<(&'static str, &'static str)>),
    Panic,
}

/// A [`TextGenerator`] answering from per-kind scripts.
#[derive(Default)]
pub struct ScriptedGenerator {
    menus: Mutex<VecDeque<Result<String, GenerationError>>>,
    dishes: Mutex<HashMap<String, DishScript>>,
    consolidation: Mutex<Option<Result<String, GenerationError>>>,
    menu_gate: Mutex<Option<Arc<Semaphore>>>,
    consolidation_gate: Mutex<Option<Arc<Semaphore>>>,
    panic_consolidation: AtomicBool,
    pub menu_calls: AtomicUsize,
    pub recipe_calls: Mutex<HashMap<String, usize>>,
    pub consolidation_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_menu(&self, breakfast: &str, lunch: &str, dinner: &str) {
        let body = json!({
            "breakfast": breakfast,
            "lunch": lunch,
            "dinner": dinner,
            "reason": "在庫を活用",
        });
        self.menus
            .lock()
            .unwrap()
            .push_back(Ok(format!("```json\n{body}\n```")));
    }

    pub fn push_menu_error(&self, error: GenerationError) {
        self.menus.lock().unwrap().push_back(Err(error));
    }

    /// Hold every menu request until a permit is added to `gate`.
    pub fn gate_menus(&self, gate: Arc<Semaphore>) {
        *self.menu_gate.lock().unwrap() = Some(gate);
    }

    pub fn script_dish(&self, dish: &str, script: DishScript) {
        self.dishes.lock().unwrap().insert(dish.to_owned(), script);
    }

    /// Answer the next consolidation with `result` instead of echoing.
    pub fn script_consolidation(&self, result: Result<String, GenerationError>) {
        *self.consolidation.lock().unwrap() = Some(result);
    }

    /// Hold every consolidation request until a permit is added to `gate`.
    pub fn gate_consolidation(&self, gate: Arc<Semaphore>) {
        *self.consolidation_gate.lock().unwrap() = Some(gate);
    }

    /// Panic inside the next consolidation request.
    pub fn panic_next_consolidation(&self) {
        self.panic_consolidation.store(true, Ordering::SeqCst);
    }

    pub fn recipe_calls_for(&self, dish: &str) -> usize {
        self.recipe_calls.lock().unwrap().get(dish).copied().unwrap_or(0)
    }

    fn recipe_json(dish: &str, ingredients: &[(&str, &str)]) -> String {
        let ingredients: Vec<_> = ingredients
            .iter()
            .map(|(name, amount)| json!({"name": name, "amount": amount}))
            .collect();
        json!({
            "dishName": dish,
            "ingredients": ingredients,
            "steps": [format!("{dish}を作る")],
            "cookingTime": "約20分",
        })
        .to_string()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        match &request.kind {
            RequestKind::MealPlan { .. } => {
                self.menu_calls.fetch_add(1, Ordering::SeqCst);
                let gate = self.menu_gate.lock().unwrap().clone();
                if let Some(gate) = gate {
                    gate.acquire().await.unwrap().forget();
                }
                self.menus
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(GenerationError::ModelUnavailable("no menu scripted".into())))
            }
            RequestKind::Recipe { dish } => {
                *self.recipe_calls.lock().unwrap().entry(dish.clone()).or_default() += 1;
                let script = self.dishes.lock().unwrap().get(dish).cloned();
                match script {
                    None => Ok(Self::recipe_json(dish, &[("塩", "少々")])),
                    Some(DishScript::Ingredients(list)) => Ok(Self::recipe_json(dish, &list)),
                    Some(DishScript::Fail(e)) => Err(e),
                    Some(DishScript::Hang) => std::future::pending().await,
                    Some(DishScript::Gated(gate, list)) => {
                        gate.acquire().await.unwrap().forget();
                        Ok(Self::recipe_json(dish, &list))
                    }
                    Some(DishScript::Panic) => panic!("scripted panic for {dish}"),
                }
            }
            RequestKind::Consolidate { ingredients, .. } => {
                self.consolidation_calls.fetch_add(1, Ordering::SeqCst);
                let gate = self.consolidation_gate.lock().unwrap().clone();
                if let Some(gate) = gate {
                    gate.acquire().await.unwrap().forget();
                }
                if self.panic_consolidation.swap(false, Ordering::SeqCst) {
                    panic!("scripted consolidation panic");
                }
                if let Some(result) = self.consolidation.lock().unwrap().take() {
                    return result;
                }
                let echoed: Vec<_> = ingredients
                    .iter()
                    .map(|l| {
                        json!({
                            "name": l.name,
                            "combinedAmount": l.amount,
                            "sources": [l.dish],
                            "category": "その他",
                        })
                    })
                    .collect();
                Ok(serde_json::to_string(&echoed).unwrap())
            }
        }
    }
}

/// Records every delivered notification.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub panic_next: AtomicBool,
}

impl RecordingNotifier {
    pub fn bodies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn is_permitted(&self) -> bool {
        true
    }

    async fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted notifier panic");
        }
        self.sent
            .lock()
            .unwrap()
            .push((title.to_owned(), body.to_owned()));
        Ok(())
    }
}

pub struct TestKitchen {
    pub kitchen: Kitchen,
    pub store: Arc<MemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub notifier: Arc<RecordingNotifier>,
    pub reports: broadcast::Receiver<SettlementReport>,
}

pub const GENERATION_TIMEOUT: Duration = Duration::from_millis(300);

pub fn start(generator: Arc<ScriptedGenerator>, settings: Settings) -> TestKitchen {
    start_with_store(Arc::new(MemoryStore::new()), generator, settings)
}

pub fn start_with_store(
    store: Arc<MemoryStore>,
    generator: Arc<ScriptedGenerator>,
    settings: Settings,
) -> TestKitchen {
    let notifier = Arc::new(RecordingNotifier::default());
    let kitchen = Kitchen::start(
        store.clone(),
        generator.clone(),
        notifier.clone(),
        &settings,
        KitchenConfig {
            generation_timeout: GENERATION_TIMEOUT,
            unit_timeout: Duration::from_secs(2),
        },
    );
    let reports = kitchen.subscribe();
    TestKitchen {
        kitchen,
        store,
        generator,
        notifier,
        reports,
    }
}

impl TestKitchen {
    /// Wait until `n` consolidation requests have been made.
    pub async fn wait_for_consolidations(&self, n: usize) {
        for _ in 0..500 {
            if self.generator.consolidation_calls.load(Ordering::SeqCst) >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} consolidation requests");
    }

    pub async fn settlement(&mut self, epoch: u64) -> SettlementReport {
        wait_for_settlement(&mut self.reports, epoch, Duration::from_secs(5))
            .await
            .unwrap_or_else(|| panic!("batch {epoch} did not settle"))
    }

    /// Assert no report arrives within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Ok(report)) = tokio::time::timeout(window, self.reports.recv()).await {
            panic!("unexpected settlement report: {report:?}");
        }
    }
}
