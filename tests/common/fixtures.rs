//! Test fixtures and builders for CanaryDeployment and HTTPRoute resources
//!
//! # Quick Start
//!
//! For simple unit tests, use the convenience functions:
//! ```rust,ignore
//! let canary = create_test_canary("my-rollout", "default", &[(10, "1s", false), (100, "", false)]);
//! ```
//!
//! For more complex configurations, use the builder pattern:
//! ```rust,ignore
//! let canary = CanaryDeploymentBuilder::new("my-rollout", "default")
//!     .with_step(20, Some("1s"), false)
//!     .with_step(100, None, false)
//!     .with_success_rate(0.99)
//!     .build();
//! ```

use std::collections::BTreeMap;

use kube::core::ObjectMeta;

use gateway_cd_operator::crd::{
    AnalysisMetric, AnalysisTemplate, CanaryDeployment, CanaryDeploymentSpec,
    CanaryDeploymentStatus, CanaryPhase, GatewayRef, HTTPRoute, ServiceRef, TrafficSplitStep,
    WorkloadRef,
};

// =============================================================================
// Convenience Functions for Simple Test Cases
// =============================================================================

/// Create a basic test rollout from `(weight, duration, pause)` triples.
/// An empty duration string means "no duration".
pub fn create_test_canary(
    name: &str,
    namespace: &str,
    steps: &[(i32, &str, bool)],
) -> CanaryDeployment {
    let mut builder = CanaryDeploymentBuilder::new(name, namespace);
    for (weight, duration, pause) in steps {
        let duration = if duration.is_empty() {
            None
        } else {
            Some(*duration)
        };
        builder = builder.with_step(*weight, duration, *pause);
    }
    builder.build()
}

/// A rollout already observed by the engine, in the given phase
pub fn create_observed_canary(
    name: &str,
    namespace: &str,
    steps: &[(i32, &str, bool)],
    phase: CanaryPhase,
    current_step: i32,
    canary_weight: i32,
) -> CanaryDeployment {
    let mut canary = create_test_canary(name, namespace, steps);
    canary.status = Some(status_with(phase, current_step, canary_weight));
    canary
}

/// A status snapshot with consistent weights
pub fn status_with(phase: CanaryPhase, current_step: i32, canary_weight: i32) -> CanaryDeploymentStatus {
    CanaryDeploymentStatus {
        phase,
        current_step,
        canary_weight,
        stable_weight: 100 - canary_weight,
        ..Default::default()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for CanaryDeployment test resources
pub struct CanaryDeploymentBuilder {
    name: String,
    namespace: String,
    service_name: String,
    service_port: i32,
    route_name: String,
    steps: Vec<TrafficSplitStep>,
    analysis: Option<AnalysisTemplate>,
    skip_analysis: bool,
    annotations: BTreeMap<String, String>,
    status: Option<CanaryDeploymentStatus>,
}

impl CanaryDeploymentBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            service_name: "checkout".to_string(),
            service_port: 8080,
            route_name: "checkout".to_string(),
            steps: Vec::new(),
            analysis: None,
            skip_analysis: false,
            annotations: BTreeMap::new(),
            status: None,
        }
    }

    pub fn with_service(mut self, name: &str, port: i32) -> Self {
        self.service_name = name.to_string();
        self.service_port = port;
        self
    }

    pub fn with_route(mut self, name: &str) -> Self {
        self.route_name = name.to_string();
        self
    }

    pub fn with_step(mut self, weight: i32, duration: Option<&str>, pause: bool) -> Self {
        self.steps.push(TrafficSplitStep {
            weight,
            duration: duration.map(str::to_string),
            pause,
        });
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisTemplate) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        let mut analysis = self.analysis.unwrap_or_default();
        analysis.success_rate = success_rate;
        self.analysis = Some(analysis);
        self
    }

    pub fn with_max_latency(mut self, max_latency: i32) -> Self {
        let mut analysis = self.analysis.unwrap_or_default();
        analysis.max_latency = max_latency;
        self.analysis = Some(analysis);
        self
    }

    pub fn with_metric(mut self, name: &str, query: &str, threshold: f64, operator: &str) -> Self {
        let mut analysis = self.analysis.unwrap_or_default();
        analysis.metrics.push(AnalysisMetric {
            name: name.to_string(),
            query: query.to_string(),
            threshold,
            operator: operator.to_string(),
        });
        self.analysis = Some(analysis);
        self
    }

    pub fn with_skip_analysis(mut self) -> Self {
        self.skip_analysis = true;
        self
    }

    pub fn with_annotation(mut self, key: &str, value: &str) -> Self {
        self.annotations.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_status(mut self, status: CanaryDeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn build(self) -> CanaryDeployment {
        let spec = CanaryDeploymentSpec {
            target_ref: WorkloadRef {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                name: self.service_name.clone(),
            },
            service: ServiceRef {
                name: self.service_name.clone(),
                port: self.service_port,
            },
            gateway: GatewayRef {
                http_route: self.route_name.clone(),
                gateway: None,
                namespace: None,
            },
            traffic_split: self.steps,
            analysis: self.analysis,
            auto_promote: false,
            skip_analysis: self.skip_analysis,
        };

        let mut canary = CanaryDeployment::new(&self.name, spec);
        canary.metadata = ObjectMeta {
            name: Some(self.name),
            namespace: Some(self.namespace),
            annotations: if self.annotations.is_empty() {
                None
            } else {
                Some(self.annotations)
            },
            ..Default::default()
        };
        canary.status = self.status;
        canary
    }
}

// =============================================================================
// HTTPRoute fixtures
// =============================================================================

/// A single-rule route pointing all traffic at the stable service, with
/// fields the engine must preserve
pub fn create_test_route(name: &str, namespace: &str) -> HTTPRoute {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "HTTPRoute",
        "metadata": {"name": name, "namespace": namespace},
        "spec": {
            "parentRefs": [{"name": "public-gateway"}],
            "hostnames": ["shop.example.com"],
            "rules": [{
                "matches": [{"path": {"type": "PathPrefix", "value": "/"}}],
                "backendRefs": [{"name": "checkout", "port": 8080, "weight": 100}]
            }]
        }
    }))
    .expect("static route fixture must deserialize")
}
