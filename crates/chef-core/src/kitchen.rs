//! Wires the tracker, settlement detector and orchestrator together.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fulfillment::FulfillmentEngine;
use crate::generation::{ContentGenerationClient, TextGenerator};
use crate::notify::Notifier;
use crate::orchestrator::Orchestrator;
use crate::settings::Settings;
use crate::settlement::{SettlementDetector, SettlementReport};
use crate::store::PlanStore;
use crate::tracker::Tracker;

#[derive(Debug, Clone, Copy)]
pub struct KitchenConfig {
    /// Limit on each generation call.
    pub generation_timeout: Duration,
    /// Limit on a whole recipe unit, after which it is recorded as failed.
    pub unit_timeout: Duration,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        Self {
            generation_timeout: ContentGenerationClient::DEFAULT_TIMEOUT,
            unit_timeout: ContentGenerationClient::DEFAULT_TIMEOUT + Duration::from_secs(30),
        }
    }
}

/// A running set of coordination components sharing one generation state.
pub struct Kitchen {
    pub orchestrator: Arc<Orchestrator>,
    pub tracker: Arc<Tracker>,
    pub detector: Arc<SettlementDetector>,
    cancel: CancellationToken,
    detector_task: JoinHandle<()>,
}

impl Kitchen {
    /// Build the components and spawn the settlement subscriber.
    pub fn start(
        store: Arc<dyn PlanStore>,
        generator: Arc<dyn TextGenerator>,
        notifier: Arc<dyn Notifier>,
        settings: &Settings,
        config: KitchenConfig,
    ) -> Self {
        let client = ContentGenerationClient::new(generator, config.generation_timeout)
            .with_servings(settings.servings());

        let (tracker, events) = Tracker::new(Arc::clone(&store), client.clone(), config.unit_timeout);
        let engine = FulfillmentEngine::new(client.clone(), Arc::clone(&store), settings.consolidation);
        let detector = SettlementDetector::new(Arc::clone(&tracker), engine, notifier, settings.auto_fill);
        let orchestrator = Arc::new(Orchestrator::new(store, client, Arc::clone(&tracker)));

        let cancel = CancellationToken::new();
        let detector_task = tokio::spawn(Arc::clone(&detector).run(events, cancel.clone()));

        Self {
            orchestrator,
            tracker,
            detector,
            cancel,
            detector_task,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementReport> {
        self.detector.subscribe()
    }

    /// Stop the settlement subscriber. Units still running finish on their own.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.detector_task.await {
            tracing::warn!(error = %e, "settlement detector task failed");
        }
    }
}

/// Wait for the report of the batch with `epoch`, ignoring others.
pub async fn wait_for_settlement(
    reports: &mut broadcast::Receiver<SettlementReport>,
    epoch: u64,
    timeout: Duration,
) -> Option<SettlementReport> {
    let wait = async {
        loop {
            match reports.recv().await {
                Ok(report) if report.batch.epoch == epoch => return Some(report),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "settlement reports lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    };
    tokio::time::timeout(timeout, wait).await.ok().flatten()
}
