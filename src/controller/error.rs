//! Error types for the CanaryDeployment controller

use std::time::Duration;

use thiserror::Error;

/// Variants keep the `Error` suffix so call sites distinguish them from
/// `kube::Error` at a glance.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("HTTPRoute not found: {0}")]
    RouteNotFoundError(String),

    #[error("Transient error (will retry): {0}")]
    TransientError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            // Conflicts and throttling clear on their own; other 4xx
            // responses need a spec or RBAC fix first. 5xx and transport
            // errors are worth retrying.
            Error::KubeError(kube::Error::Api(resp)) => match resp.code {
                409 | 429 => true,
                code if (400..500).contains(&code) => false,
                _ => true,
            },
            Error::KubeError(_) => true,
            Error::TransientError(_) => true,
            // The route may appear; mid-rollout this is a transient condition
            Error::RouteNotFoundError(_) => true,
            // Requeued so the invariant violation stays visible in the logs
            Error::InternalError(_) => true,
            Error::ValidationError(_) | Error::SerializationError(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Requeue backoff for transient failures
///
/// Delays double per attempt but stay inside the narrow band the rollout
/// loop budgets for retries; a small random spread keeps a fleet of
/// rollouts that failed together from retrying in lockstep.
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Delay for the first retry
    pub initial_delay: Duration,
    /// Ceiling for all retries
    pub max_delay: Duration,
    /// Fractional spread applied to every delay (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doubled = self
            .initial_delay
            .saturating_mul(1u32 << attempt.min(8))
            .min(self.max_delay);

        // +/- jitter around the doubled delay
        let spread = 1.0 + self.jitter * (2.0 * rand::random::<f64>() - 1.0);
        doubled.mul_f64(spread.max(0.0))
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Nothing to gain from a quick retry; wait out the full window
            // so manual intervention has a chance
            self.max_delay
        }
    }
}
