pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod resources;

pub use config::Config;
pub use controller::{BackoffConfig, Context, Error, FINALIZER, Result, error_policy, reconcile};
pub use crd::CanaryDeployment;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::Controller;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client};

use controller::analysis::MetricsQuerier;
use crd::CanaryPhase;
use health::HealthState;

/// Run the operator controller
///
/// This is the main controller loop that watches CanaryDeployment resources
/// and reconciles them. It can be called from main.rs or spawned as a
/// background task during integration tests.
pub async fn run_controller(
    client: Client,
    metrics_provider: Option<Arc<dyn MetricsQuerier>>,
    health_state: Option<Arc<HealthState>>,
) {
    tracing::info!("Starting controller for CanaryDeployment resources");

    let ctx = Arc::new(Context::new(client.clone(), metrics_provider, health_state));

    let canaries: Api<CanaryDeployment> = Api::all(client.clone());

    // Configure watcher to handle dynamic resource creation
    let watcher_config = WatcherConfig::default().any_semantic();

    // The controller's work queue keys by (namespace, name), deduplicates,
    // and serializes invocations per key; distinct rollouts reconcile in
    // parallel on the runtime's workers
    Controller::new(canaries, watcher_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    tracing::debug!("Reconciled: {}", obj.name);
                }
                Err(e) => {
                    tracing::error!("Reconciliation error: {:?}", e);
                }
            }
        })
        .await;

    // This should never complete in normal operation
    tracing::error!("Controller stream ended unexpectedly");
}

/// How often the fleet gauge is recomputed
const FLEET_METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Every rollout phase, for zeroing gauges of phases no rollout is in
const ALL_PHASES: [CanaryPhase; 6] = [
    CanaryPhase::Pending,
    CanaryPhase::Progressing,
    CanaryPhase::Paused,
    CanaryPhase::Succeeded,
    CanaryPhase::Failed,
    CanaryPhase::RollingBack,
];

/// Periodically tally rollouts by phase into the fleet gauge
///
/// Runs alongside the controller; a failed list leaves the previous tally
/// in place and retries on the next tick.
pub async fn run_fleet_metrics(client: Client, health_state: Arc<HealthState>) {
    let canaries: Api<CanaryDeployment> = Api::all(client);

    loop {
        match canaries.list(&ListParams::default()).await {
            Ok(rollouts) => {
                let mut counts: HashMap<CanaryPhase, i64> = HashMap::new();
                for rollout in &rollouts.items {
                    let phase = rollout.status.as_ref().map(|s| s.phase).unwrap_or_default();
                    *counts.entry(phase).or_default() += 1;
                }
                for phase in ALL_PHASES {
                    health_state.metrics.set_rollouts_by_phase(
                        &phase.to_string(),
                        counts.get(&phase).copied().unwrap_or(0),
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Failed to list rollouts for fleet metrics: {}", e);
            }
        }

        tokio::time::sleep(FLEET_METRICS_INTERVAL).await;
    }
}
