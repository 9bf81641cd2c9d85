//! Process configuration
//!
//! Everything is read from the environment, matching how the operator is
//! deployed (flags become env vars in the manifest). An empty
//! `METRICS_BACKEND_URL` disables analysis: the reconciler then treats
//! every step as healthy without issuing a single metrics call.

use std::env;

/// Default bind address for the Prometheus metrics endpoint
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default bind address for the liveness/readiness probes
pub const DEFAULT_HEALTH_PROBE_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Operator process configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Bind address for the /metrics endpoint
    pub metrics_bind_address: String,
    /// Bind address for /healthz and /readyz
    pub health_probe_bind_address: String,
    /// Whether to run leader election before reconciling
    pub leader_elect: bool,
    /// Base URL of the metrics backend; None disables analysis
    pub metrics_backend_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metrics_bind_address: DEFAULT_METRICS_BIND_ADDRESS.to_string(),
            health_probe_bind_address: DEFAULT_HEALTH_PROBE_BIND_ADDRESS.to_string(),
            leader_elect: false,
            metrics_backend_url: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> Self {
        Self {
            metrics_bind_address: env::var("METRICS_BIND_ADDRESS")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_METRICS_BIND_ADDRESS.to_string()),
            health_probe_bind_address: env::var("HEALTH_PROBE_BIND_ADDRESS")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_HEALTH_PROBE_BIND_ADDRESS.to_string()),
            leader_elect: env::var("LEADER_ELECT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            metrics_backend_url: env::var("METRICS_BACKEND_URL")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}
