use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Suffix appended to the stable service name to locate the canary service.
pub const CANARY_SERVICE_SUFFIX: &str = "-canary";

/// Default dwell between steps when a step carries no (parseable) duration.
pub const DEFAULT_STEP_DWELL: Duration = Duration::from_secs(30);

/// CanaryDeployment is the Schema for the canarydeployments API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "gateway-cd.io",
    version = "v1alpha1",
    kind = "CanaryDeployment",
    plural = "canarydeployments",
    shortname = "canary",
    namespaced,
    status = "CanaryDeploymentStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Canary Weight", "type":"integer", "jsonPath":".status.canaryWeight"}"#,
    printcolumn = r#"{"name":"Step", "type":"integer", "jsonPath":".status.currentStep"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CanaryDeploymentSpec {
    /// Workload being rolled out. Carried for provenance; the engine never
    /// reads the workload itself.
    pub target_ref: WorkloadRef,

    /// The stable service. The canary service is `<name>-canary` on the
    /// same port; the provisioner must follow this convention.
    pub service: ServiceRef,

    /// Locates the HTTPRoute whose backend weights the engine rewrites.
    pub gateway: GatewayRef,

    /// Ordered traffic-weight steps, length >= 1, non-decreasing weights.
    pub traffic_split: Vec<TrafficSplitStep>,

    /// Success criteria evaluated between steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisTemplate>,

    /// Automatically promote once analysis succeeds.
    #[serde(default)]
    pub auto_promote: bool,

    /// Skip analysis entirely (useful for testing).
    #[serde(default)]
    pub skip_analysis: bool,
}

/// References the target workload of a rollout
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadRef {
    /// API version of the target workload (e.g. "apps/v1")
    pub api_version: String,
    /// Kind of the target workload (Deployment, StatefulSet, ...)
    pub kind: String,
    /// Name of the target workload
    pub name: String,
}

/// References the stable Kubernetes service
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRef {
    /// Name of the stable service
    pub name: String,
    /// Service port carrying canary traffic
    pub port: i32,
}

impl ServiceRef {
    /// Name of the companion canary service.
    pub fn canary_name(&self) -> String {
        format!("{}{}", self.name, CANARY_SERVICE_SUFFIX)
    }
}

/// References the Gateway API objects the rollout manipulates
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRef {
    /// Name of the HTTPRoute to manage
    pub http_route: String,

    /// Name of the Gateway (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// Namespace of the Gateway API resources; the rollout's own namespace
    /// when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// One traffic-weight step of a rollout
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSplitStep {
    /// Percentage of traffic routed to the canary (0-100)
    pub weight: i32,

    /// How long to hold this weight before the next step (e.g. "90s", "5m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Pause at this step for manual approval
    #[serde(default)]
    pub pause: bool,
}

impl TrafficSplitStep {
    /// Dwell before advancing past this step. Absent or unparseable
    /// durations fall back to [`DEFAULT_STEP_DWELL`].
    pub fn dwell(&self) -> Duration {
        self.duration
            .as_deref()
            .and_then(parse_step_duration)
            .unwrap_or(DEFAULT_STEP_DWELL)
    }
}

/// Parse a human duration string ("30s", "5m", "1h", or bare seconds).
pub fn parse_step_duration(duration: &str) -> Option<Duration> {
    let duration = duration.trim();
    if duration.is_empty() {
        return None;
    }

    let (value, unit) = match duration.find(|c: char| c.is_alphabetic()) {
        Some(idx) => duration.split_at(idx),
        None => (duration, "s"),
    };

    let value: u64 = value.trim().parse().ok()?;
    match unit {
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

/// Success criteria for canary analysis
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTemplate {
    /// User-defined metrics to evaluate between steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<AnalysisMetric>,

    /// Minimum success rate for canary traffic (0.0-1.0); 0 disables the check
    #[serde(default)]
    pub success_rate: f64,

    /// Maximum acceptable p95 latency in milliseconds; 0 disables the check
    #[serde(default)]
    pub max_latency: i32,

    /// How often to run analysis (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_interval: Option<String>,
}

impl AnalysisTemplate {
    /// Whether any criterion is configured at all.
    pub fn has_criteria(&self) -> bool {
        !self.metrics.is_empty() || self.success_rate > 0.0 || self.max_latency > 0
    }
}

/// A user-defined metric criterion
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetric {
    /// Name of the metric
    pub name: String,
    /// Query to execute against the metrics backend
    pub query: String,
    /// Threshold the measured value is compared against
    pub threshold: f64,
    /// Comparison operator (>, <, >=, <=, ==, !=)
    pub operator: String,
}

/// Observed state of a CanaryDeployment
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanaryDeploymentStatus {
    /// Current phase of the rollout
    #[serde(default)]
    pub phase: CanaryPhase,

    /// Human-readable one-liner describing the last transition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Index into spec.trafficSplit; equals its length once Succeeded
    #[serde(default)]
    pub current_step: i32,

    /// Percentage of traffic currently routed to the canary
    #[serde(default)]
    pub canary_weight: i32,

    /// Percentage of traffic currently routed to the stable service
    #[serde(default)]
    pub stable_weight: i32,

    /// Kubernetes-style conditions for external consumers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// When the current phase was entered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// Verdict of the most recent analysis run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_run: Option<AnalysisRunStatus>,
}

/// Rollout lifecycle phase
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq, Hash)]
pub enum CanaryPhase {
    /// Rollout observed but not yet started
    #[default]
    Pending,
    /// Stepping through the traffic split
    Progressing,
    /// Holding at a step awaiting manual approval
    Paused,
    /// All traffic on the canary; terminal
    Succeeded,
    /// Rolled back or rejected; terminal
    Failed,
    /// Returning all traffic to the stable service
    RollingBack,
}

impl CanaryPhase {
    /// Terminal phases accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CanaryPhase::Succeeded | CanaryPhase::Failed)
    }
}

impl std::fmt::Display for CanaryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanaryPhase::Pending => write!(f, "Pending"),
            CanaryPhase::Progressing => write!(f, "Progressing"),
            CanaryPhase::Paused => write!(f, "Paused"),
            CanaryPhase::Succeeded => write!(f, "Succeeded"),
            CanaryPhase::Failed => write!(f, "Failed"),
            CanaryPhase::RollingBack => write!(f, "RollingBack"),
        }
    }
}

/// Phase of a single analysis run
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum AnalysisPhase {
    #[default]
    Running,
    Successful,
    Failed,
}

/// Verdict of one analysis run
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRunStatus {
    /// Phase of the run
    #[serde(default)]
    pub phase: AnalysisPhase,

    /// Success rate observed for canary traffic
    #[serde(default)]
    pub success_rate: f64,

    /// p95 latency observed for canary traffic, in milliseconds
    #[serde(default)]
    pub average_latency_ms: i32,

    /// Per-metric results for user-defined criteria
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metric_results: Vec<MetricResult>,

    /// When the run started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    /// When the run completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,

    /// Conjunction of every individual check
    #[serde(default)]
    pub passed: bool,
}

/// Result of evaluating one user-defined metric
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricResult {
    /// Name of the metric
    pub name: String,
    /// Measured value
    pub value: f64,
    /// Configured threshold
    pub threshold: f64,
    /// Whether the check passed
    pub passed: bool,
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: String,

    /// Generation observed when the condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl CanaryDeployment {
    /// Namespace of the managed HTTPRoute: the gateway ref's namespace, or
    /// the rollout's own namespace when unset.
    pub fn route_namespace(&self) -> String {
        self.spec
            .gateway
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .or_else(|| self.metadata.namespace.clone())
            .unwrap_or_default()
    }

    /// Whether analysis should run between steps: not skipped and at least
    /// one criterion configured.
    pub fn analysis_enabled(&self) -> bool {
        !self.spec.skip_analysis
            && self
                .spec
                .analysis
                .as_ref()
                .is_some_and(AnalysisTemplate::has_criteria)
    }
}
