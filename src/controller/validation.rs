//! Validation logic for CanaryDeployment specs
//!
//! Well-formedness checks only, applied once at the Pending gate. The
//! existence of the referenced HTTPRoute is an I/O concern and is checked
//! by the reconciler alongside these checks; target workloads and services
//! may be created concurrently and are deliberately not required here.

use crate::controller::error::{Error, Result};
use crate::crd::CanaryDeployment;

/// Minimum step weight
pub const MIN_WEIGHT: i32 = 0;

/// Maximum step weight
pub const MAX_WEIGHT: i32 = 100;

/// Comparison operators understood by the analyzer
pub const RECOGNIZED_OPERATORS: [&str; 6] = [">", ">=", "<", "<=", "==", "!="];

/// Validate the rollout spec
pub fn validate_spec(canary: &CanaryDeployment) -> Result<()> {
    validate_service(canary)?;
    validate_gateway(canary)?;
    validate_traffic_split(canary)?;
    validate_analysis(canary)?;
    Ok(())
}

fn validate_service(canary: &CanaryDeployment) -> Result<()> {
    let service = &canary.spec.service;

    if service.name.is_empty() {
        return Err(Error::ValidationError(
            "service name must not be empty".to_string(),
        ));
    }

    if !(1..=65535).contains(&service.port) {
        return Err(Error::ValidationError(format!(
            "service port {} is out of range 1-65535",
            service.port
        )));
    }

    Ok(())
}

fn validate_gateway(canary: &CanaryDeployment) -> Result<()> {
    if canary.spec.gateway.http_route.is_empty() {
        return Err(Error::ValidationError(
            "gateway.httpRoute must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_traffic_split(canary: &CanaryDeployment) -> Result<()> {
    let steps = &canary.spec.traffic_split;

    if steps.is_empty() {
        return Err(Error::ValidationError(
            "trafficSplit must contain at least one step".to_string(),
        ));
    }

    let mut previous = MIN_WEIGHT;
    for (idx, step) in steps.iter().enumerate() {
        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&step.weight) {
            return Err(Error::ValidationError(format!(
                "step {} weight {} is out of range {}-{}",
                idx, step.weight, MIN_WEIGHT, MAX_WEIGHT
            )));
        }

        if step.weight < previous {
            return Err(Error::ValidationError(format!(
                "step {} weight {} decreases from previous weight {}",
                idx, step.weight, previous
            )));
        }
        previous = step.weight;
    }

    Ok(())
}

fn validate_analysis(canary: &CanaryDeployment) -> Result<()> {
    let Some(analysis) = &canary.spec.analysis else {
        return Ok(());
    };

    if !(0.0..=1.0).contains(&analysis.success_rate) {
        return Err(Error::ValidationError(format!(
            "analysis.successRate {} is out of range 0.0-1.0",
            analysis.success_rate
        )));
    }

    if analysis.max_latency < 0 {
        return Err(Error::ValidationError(format!(
            "analysis.maxLatency {} must not be negative",
            analysis.max_latency
        )));
    }

    for metric in &analysis.metrics {
        if metric.name.is_empty() {
            return Err(Error::ValidationError(
                "analysis metric name must not be empty".to_string(),
            ));
        }
        if metric.query.is_empty() {
            return Err(Error::ValidationError(format!(
                "analysis metric {} has an empty query",
                metric.name
            )));
        }
        if !recognized_operator(&metric.operator) {
            return Err(Error::ValidationError(format!(
                "analysis metric {} has unrecognized operator {:?}",
                metric.name, metric.operator
            )));
        }
    }

    Ok(())
}

/// Whether an analysis comparison operator is recognized
pub fn recognized_operator(operator: &str) -> bool {
    RECOGNIZED_OPERATORS.contains(&operator)
}
