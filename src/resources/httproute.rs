//! Traffic-split mutation of the managed HTTPRoute
//!
//! The mutator is stateless: given a desired canary weight it rewrites the
//! backendRefs of every rule so the stable backend receives `100 - w` and
//! the canary backend receives `w`, and writes the route back. Retry policy
//! belongs to the reconciler; errors propagate verbatim.

use kube::Api;
use kube::api::PostParams;
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::crd::{CanaryDeployment, CanaryDeploymentSpec, HTTPBackendRef, HTTPRoute};

/// Backend refs realizing a canary weight:
/// - `w == 0`: stable only (no canary entry)
/// - `w == 100`: canary only (promotion complete)
/// - otherwise: stable first, then canary
pub fn backend_refs_for_weight(spec: &CanaryDeploymentSpec, canary_weight: i32) -> Vec<HTTPBackendRef> {
    let service = &spec.service;
    let stable = HTTPBackendRef::weighted(&service.name, service.port, 100 - canary_weight);
    let canary = HTTPBackendRef::weighted(service.canary_name(), service.port, canary_weight);

    match canary_weight {
        0 => vec![stable],
        100 => vec![canary],
        _ => vec![stable, canary],
    }
}

/// Rewrite every rule of a route to carry the given canary weight. Rules
/// without a match predicate gain an explicit match-all; everything except
/// backendRefs is left untouched.
pub fn apply_traffic_split(route: &mut HTTPRoute, spec: &CanaryDeploymentSpec, canary_weight: i32) {
    for rule in &mut route.spec.rules {
        if rule.matches.is_empty() {
            rule.matches = vec![serde_json::json!({})];
        }
        rule.backend_refs = backend_refs_for_weight(spec, canary_weight);
    }
}

fn route_api(client: &kube::Client, canary: &CanaryDeployment) -> Api<HTTPRoute> {
    Api::namespaced(client.clone(), &canary.route_namespace())
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// Fetch the managed route, rewrite its backend weights, and write it back.
/// Write conflicts and missing routes surface to the caller unchanged.
pub async fn update_traffic_split(
    client: &kube::Client,
    canary: &CanaryDeployment,
    canary_weight: i32,
) -> Result<()> {
    let api = route_api(client, canary);
    let route_name = &canary.spec.gateway.http_route;

    let mut route = api.get(route_name).await.map_err(|e| {
        if is_not_found(&e) {
            Error::RouteNotFoundError(format!("{}/{}", canary.route_namespace(), route_name))
        } else {
            Error::KubeError(e)
        }
    })?;

    apply_traffic_split(&mut route, &canary.spec, canary_weight);

    api.replace(route_name, &PostParams::default(), &route)
        .await?;

    info!(
        route = %route_name,
        canary_weight,
        stable_weight = 100 - canary_weight,
        "Updated traffic split"
    );
    Ok(())
}

/// Whether the managed route exists (Pending validation gate).
pub async fn route_exists(client: &kube::Client, canary: &CanaryDeployment) -> Result<bool> {
    let api = route_api(client, canary);
    Ok(api.get_opt(&canary.spec.gateway.http_route).await?.is_some())
}

/// Teardown on deletion: return all traffic to the stable service. A route
/// that is already gone counts as cleaned up.
pub async fn cleanup(client: &kube::Client, canary: &CanaryDeployment) -> Result<()> {
    match update_traffic_split(client, canary, 0).await {
        Ok(()) => Ok(()),
        Err(Error::RouteNotFoundError(route)) => {
            debug!("Route {} already gone, nothing to clean up", route);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
