use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use gateway_cd_operator::config::Config;
use gateway_cd_operator::controller::analysis::{MetricsQuerier, PrometheusProvider};
use gateway_cd_operator::health::{HealthState, run_metrics_server, run_probe_server};
use gateway_cd_operator::{run_controller, run_fleet_metrics};

/// Lease configuration
const LEASE_NAME: &str = "gateway-cd-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the TLS crypto provider before any TLS operations
    // Note: install_default() may fail if called multiple times (e.g., in tests),
    // but a single failure during startup is fatal since TLS won't work
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        // Check if a provider is already installed (common in test scenarios)
        if rustls::crypto::CryptoProvider::get_default().is_none() {
            return Err(
                "Failed to install rustls crypto provider and no provider is available".into(),
            );
        }
        // A provider is already installed, which is fine
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gateway_cd_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .init();

    info!("Starting gateway-cd-operator");

    let config = Config::from_env();

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Metrics backend for canary analysis; absent means every analysis passes
    let metrics_provider: Option<Arc<dyn MetricsQuerier>> = match &config.metrics_backend_url {
        Some(url) => {
            info!("Using metrics backend at {}", url);
            Some(Arc::new(PrometheusProvider::new(url)))
        }
        None => {
            info!("No metrics backend configured, analysis is disabled");
            None
        }
    };

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Track leadership status
    let is_leader = Arc::new(AtomicBool::new(false));

    // Start probe and metrics servers immediately (probes should work even
    // as non-leader)
    let probe_handle = {
        let health_state = health_state.clone();
        let addr = config.health_probe_bind_address.clone();
        tokio::spawn(async move {
            if let Err(e) = run_probe_server(health_state, &addr).await {
                error!("Probe server error: {}", e);
            }
        })
    };

    let metrics_handle = {
        let health_state = health_state.clone();
        let addr = config.metrics_bind_address.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(health_state, &addr).await {
                error!("Metrics server error: {}", e);
            }
        })
    };

    // Keep the per-phase fleet gauge current
    let fleet_metrics_handle = {
        let health_state = health_state.clone();
        let fleet_client = client.clone();
        tokio::spawn(async move {
            run_fleet_metrics(fleet_client, health_state).await;
        })
    };

    // Lease renewal task handle, if leader election is enabled
    let lease_renewal_handle = if config.leader_elect {
        // Get pod identity for leader election
        let pod_name = std::env::var("POD_NAME").unwrap_or_else(|_| {
            warn!("POD_NAME not set, using hostname");
            hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        });
        let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| {
            warn!("POD_NAMESPACE not set, using 'default'");
            "default".to_string()
        });

        info!(
            holder_id = %pod_name,
            namespace = %namespace,
            lease_name = LEASE_NAME,
            "Initializing leader election"
        );

        let lease_lock = LeaseLock::new(
            client.clone(),
            &namespace,
            LeaseLockParams {
                holder_id: pod_name.clone(),
                lease_name: LEASE_NAME.to_string(),
                lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
            },
        );

        // Acquire leadership before starting the controller
        info!("Waiting to acquire leadership...");
        loop {
            match lease_lock.try_acquire_or_renew().await {
                Ok(result) => {
                    if result.acquired_lease {
                        info!("Acquired leadership");
                        is_leader.store(true, Ordering::SeqCst);
                        break;
                    } else {
                        info!("Another instance is leader, waiting...");
                    }
                }
                Err(e) => {
                    warn!("Failed to acquire lease: {}, retrying...", e);
                }
            }
            tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
        }

        // Start lease renewal background task
        let is_leader = is_leader.clone();
        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

                match lease_lock.try_acquire_or_renew().await {
                    Ok(result) => {
                        if !result.acquired_lease {
                            error!("Lost leadership! Shutting down...");
                            is_leader.store(false, Ordering::SeqCst);
                            // Exit so Kubernetes restarts us and we re-enter election
                            std::process::exit(1);
                        }
                    }
                    Err(e) => {
                        error!("Failed to renew lease: {}. Shutting down...", e);
                        is_leader.store(false, Ordering::SeqCst);
                        std::process::exit(1);
                    }
                }
            }
        }))
    } else {
        info!("Leader election disabled");
        is_leader.store(true, Ordering::SeqCst);
        None
    };

    info!("Watching CanaryDeployment resources (apiVersion: gateway-cd.io/v1alpha1)");

    health_state.set_ready(true).await;

    // Start the controller
    let controller_handle = {
        let health_state = health_state.clone();
        let controller_client = client.clone();
        let provider = metrics_provider.clone();
        tokio::spawn(async move {
            run_controller(controller_client, provider, Some(health_state)).await;
        })
    };

    // Lease renewal only exits via process::exit() or panic; monitor it
    // without requiring leader election to be enabled
    let lease_future = async {
        if let Some(handle) = lease_renewal_handle {
            if let Err(e) = handle.await {
                error!("Lease renewal task panicked: {}", e);
            }
        } else {
            std::future::pending::<()>().await;
        }
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Controller task panicked: {}", e);
            }
        }
        result = probe_handle => {
            if let Err(e) = result {
                error!("Probe server task panicked: {}", e);
            }
        }
        result = metrics_handle => {
            if let Err(e) = result {
                error!("Metrics server task panicked: {}", e);
            }
        }
        result = fleet_metrics_handle => {
            if let Err(e) = result {
                error!("Fleet metrics task panicked: {}", e);
            }
        }
        _ = lease_future => {}
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;
            info!("Marked operator as not ready");

            // Give in-flight reconciliations time to complete
            info!(
                "Waiting {}s for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
