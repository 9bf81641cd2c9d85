//! Operator spawning utilities for integration tests
//!
//! Each test gets its own operator instance to avoid watch/state issues
//! between tests. The operator runs in the test's tokio runtime.

use std::sync::Arc;

use kube::Client;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use gateway_cd_operator::controller::analysis::MetricsQuerier;
use gateway_cd_operator::run_controller;

/// A scoped operator that runs for the duration of a test
pub struct ScopedOperator {
    handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ScopedOperator {
    /// Start a new operator instance without a metrics backend
    pub async fn start(client: Client) -> Self {
        Self::start_with_provider(client, None).await
    }

    /// Start a new operator instance with the given metrics backend
    pub async fn start_with_provider(
        client: Client,
        metrics_provider: Option<Arc<dyn MetricsQuerier>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tracing::info!("Starting scoped operator controller...");

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = run_controller(client, metrics_provider, None) => {
                    tracing::debug!("Operator exited normally");
                }
                _ = shutdown_rx => {
                    tracing::debug!("Operator received shutdown signal");
                }
            }
        });

        // Give the controller a moment to start watching
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        Self {
            handle,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

impl Drop for ScopedOperator {
    fn drop(&mut self) {
        // Send shutdown signal (ignore error if receiver already dropped)
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}
