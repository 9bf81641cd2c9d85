//! Partial typed view of the Gateway API HTTPRoute.
//!
//! The engine owns exactly one thing on a route: the `backendRefs` of each
//! rule. Everything else (parentRefs, hostnames, match predicates, filters,
//! timeouts) belongs to other controllers and round-trips untouched through
//! flattened passthrough maps, so a read-modify-write never drops fields.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTPRoute from gateway.networking.k8s.io, typed only as deeply as the
/// traffic-split rewrite needs
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "HTTPRoute",
    plural = "httproutes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteSpec {
    /// Routing rules; each receives the same traffic split
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<HTTPRouteRule>,

    /// Fields the engine does not interpret (parentRefs, hostnames, ...)
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, Value>,
}

/// One rule of an HTTPRoute
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPRouteRule {
    /// Match predicates, preserved verbatim; a rule without any is match-all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<Value>,

    /// Weighted backends; the only field the engine rewrites
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backend_refs: Vec<HTTPBackendRef>,

    /// Fields the engine does not interpret (filters, timeouts, ...)
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, Value>,
}

/// A weighted backend reference within a rule
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HTTPBackendRef {
    /// Name of the backend service
    pub name: String,

    /// Service port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    /// Proportion of the rule's traffic this backend receives
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,

    /// Fields the engine does not interpret (group, kind, filters, ...)
    #[serde(flatten)]
    pub passthrough: BTreeMap<String, Value>,
}

impl HTTPBackendRef {
    /// A plain service backend with an explicit weight.
    pub fn weighted(name: impl Into<String>, port: i32, weight: i32) -> Self {
        Self {
            name: name.into(),
            port: Some(port),
            weight: Some(weight),
            passthrough: BTreeMap::new(),
        }
    }
}
