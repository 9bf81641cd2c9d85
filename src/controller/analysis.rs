//! Canary analysis against a Prometheus-compatible metrics backend
//!
//! An analysis run executes each user-defined metric criterion plus the
//! standard success-rate and p95-latency checks, and folds everything into
//! a single pass/fail verdict. A query error counts as a failed check: an
//! unreachable metrics backend must not let a bad canary through.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::crd::{AnalysisPhase, AnalysisRunStatus, CanaryDeployment, MetricResult, ServiceRef};

/// Client-side timeout for a single metrics query
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while querying the metrics backend
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Request failed (connect, timeout, malformed response body)
    #[error("metrics backend request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Backend answered with a non-200 HTTP status
    #[error("metrics backend returned HTTP {0}")]
    HttpStatusError(u16),

    /// Backend answered but reported a query failure
    #[error("metrics backend returned status {0:?}")]
    QueryStatusError(String),

    /// The query matched no samples
    #[error("query returned no samples")]
    NoSamples,

    /// The sample value was not a parseable float
    #[error("failed to parse sample value {0:?}")]
    BadSampleValue(String),

    /// The sample value was NaN or infinite
    #[error("sample value {0:?} is not a finite number")]
    NonFiniteValue(String),
}

/// A Prometheus instant-query response
#[derive(Debug, serde::Deserialize)]
pub struct PrometheusResponse {
    pub status: String,
    #[serde(default)]
    pub data: PrometheusData,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct PrometheusData {
    #[serde(default)]
    pub result: Vec<PrometheusResult>,
}

#[derive(Debug, serde::Deserialize)]
pub struct PrometheusResult {
    /// `[unix-timestamp, stringified-float]`
    pub value: (f64, String),
}

/// Extract the scalar of the first sample from a query response. NaN and
/// infinities are rejected: comparing against them silently passes or
/// fails thresholds for the wrong reason.
pub fn scalar_from_response(response: PrometheusResponse) -> Result<f64, QueryError> {
    if response.status != "success" {
        return Err(QueryError::QueryStatusError(response.status));
    }

    let sample = response.data.result.first().ok_or(QueryError::NoSamples)?;
    let value = sample
        .value
        .1
        .parse::<f64>()
        .map_err(|_| QueryError::BadSampleValue(sample.value.1.clone()))?;

    if !value.is_finite() {
        return Err(QueryError::NonFiniteValue(sample.value.1.clone()));
    }

    Ok(value)
}

/// Verdict of one analysis run, with the reasons for any failed checks
#[derive(Debug, Clone)]
pub struct AnalysisVerdict {
    /// The run as recorded into the rollout status
    pub run: AnalysisRunStatus,
    /// One line per failed check
    pub failures: Vec<String>,
}

impl AnalysisVerdict {
    /// Whether every check passed
    pub fn passed(&self) -> bool {
        self.run.passed
    }

    /// Single-line summary of the failed checks
    pub fn reason(&self) -> String {
        self.failures.join("; ")
    }
}

/// Trait for querying the metrics backend
///
/// Production code uses [`PrometheusProvider`] against a real server;
/// tests substitute their own querier to steer verdicts.
#[async_trait]
pub trait MetricsQuerier: Send + Sync {
    /// Execute an instant query and return the first scalar result
    async fn query_instant(&self, query: &str) -> Result<f64, QueryError>;

    /// Run a full analysis pass for a rollout
    async fn run_analysis(&self, canary: &CanaryDeployment) -> AnalysisVerdict {
        let template = canary.spec.analysis.clone().unwrap_or_default();
        let mut run = AnalysisRunStatus {
            phase: AnalysisPhase::Running,
            started_at: Some(Utc::now().to_rfc3339()),
            passed: true,
            ..Default::default()
        };
        let mut failures = Vec::new();

        for metric in &template.metrics {
            let query = substitute_placeholders(&metric.query, canary);
            match self.query_instant(&query).await {
                Ok(value) => {
                    let passed = compare_values(value, metric.threshold, &metric.operator);
                    if !passed {
                        failures.push(format!(
                            "metric {}: {} {} {} not satisfied",
                            metric.name, value, metric.operator, metric.threshold
                        ));
                        run.passed = false;
                    }
                    run.metric_results.push(MetricResult {
                        name: metric.name.clone(),
                        value,
                        threshold: metric.threshold,
                        passed,
                    });
                }
                Err(e) => {
                    warn!("Query for metric {} failed: {}", metric.name, e);
                    failures.push(format!("metric {} query failed: {}", metric.name, e));
                    run.passed = false;
                }
            }
        }

        if template.success_rate > 0.0 {
            match self
                .query_instant(&success_rate_query(&canary.spec.service))
                .await
            {
                Ok(rate) => {
                    run.success_rate = rate;
                    if rate < template.success_rate {
                        failures.push(format!(
                            "success rate {:.4} below minimum {:.4}",
                            rate, template.success_rate
                        ));
                        run.passed = false;
                    }
                }
                Err(e) => {
                    warn!("Success rate query failed: {}", e);
                    failures.push(format!("success rate query failed: {}", e));
                    run.passed = false;
                }
            }
        }

        if template.max_latency > 0 {
            match self
                .query_instant(&latency_query(&canary.spec.service))
                .await
            {
                Ok(latency_ms) => {
                    run.average_latency_ms = latency_ms as i32;
                    if run.average_latency_ms > template.max_latency {
                        failures.push(format!(
                            "p95 latency {}ms above maximum {}ms",
                            run.average_latency_ms, template.max_latency
                        ));
                        run.passed = false;
                    }
                }
                Err(e) => {
                    warn!("Latency query failed: {}", e);
                    failures.push(format!("latency query failed: {}", e));
                    run.passed = false;
                }
            }
        }

        run.phase = if run.passed {
            AnalysisPhase::Successful
        } else {
            AnalysisPhase::Failed
        };
        run.completed_at = Some(Utc::now().to_rfc3339());

        debug!(passed = run.passed, failures = failures.len(), "Analysis run completed");
        AnalysisVerdict { run, failures }
    }
}

/// Metrics provider backed by the Prometheus HTTP query API
pub struct PrometheusProvider {
    base_url: String,
    client: reqwest::Client,
}

impl PrometheusProvider {
    /// Create a provider for the given base URL (e.g. `http://prometheus:9090`)
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(QUERY_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl MetricsQuerier for PrometheusProvider {
    async fn query_instant(&self, query: &str) -> Result<f64, QueryError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueryError::HttpStatusError(response.status().as_u16()));
        }

        let parsed: PrometheusResponse = response.json().await?;
        scalar_from_response(parsed)
    }
}

/// Standard success-rate query: non-5xx share of canary traffic over 5m
pub fn success_rate_query(service: &ServiceRef) -> String {
    let canary = service.canary_name();
    format!(
        r#"sum(rate(http_requests_total{{service="{canary}",code!~"5.."}}[5m])) / sum(rate(http_requests_total{{service="{canary}"}}[5m]))"#
    )
}

/// Standard p95 latency query over 5m, in milliseconds
pub fn latency_query(service: &ServiceRef) -> String {
    let canary = service.canary_name();
    format!(
        r#"histogram_quantile(0.95, sum(rate(http_request_duration_seconds_bucket{{service="{canary}"}}[5m])) by (le)) * 1000"#
    )
}

/// Substitute the well-known placeholders in a user-defined query
pub fn substitute_placeholders(query: &str, canary: &CanaryDeployment) -> String {
    let namespace = canary.metadata.namespace.clone().unwrap_or_default();
    let name = canary.metadata.name.clone().unwrap_or_default();

    query
        .replace("{{.Service}}", &canary.spec.service.name)
        .replace("{{.CanaryService}}", &canary.spec.service.canary_name())
        .replace("{{.Namespace}}", &namespace)
        .replace("{{.Name}}", &name)
}

/// Compare a measured value to a threshold with the declared operator
pub fn compare_values(value: f64, threshold: f64, operator: &str) -> bool {
    match operator {
        ">" => value > threshold,
        ">=" => value >= threshold,
        "<" => value < threshold,
        "<=" => value <= threshold,
        "==" => value == threshold,
        "!=" => value != threshold,
        _ => false,
    }
}
