//! Author-to-engine intent channel carried in annotations
//!
//! An intent is an annotation `gateway-cd.io/<intent> = "true"`. The engine
//! honors an intent in exactly one phase (abort/promote/resume while
//! Paused, pause while Progressing) and removes the annotation when it
//! acts; an intent set in a phase that does not honor it stays in place.

use std::collections::BTreeMap;

use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use tracing::debug;

use crate::controller::context::FIELD_MANAGER;
use crate::controller::error::Result;
use crate::crd::CanaryDeployment;

/// Annotation prefix reserved for intents
pub const ANNOTATION_PREFIX: &str = "gateway-cd.io/";

/// A one-shot instruction from the rollout author
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Abandon the rollout and return traffic to stable
    Abort,
    /// Skip all remaining steps and promote
    Promote,
    /// Continue past the current pause
    Resume,
    /// Hold at the current step as if it carried `pause: true`
    Pause,
}

/// Fixed precedence: abort beats promote beats resume beats pause.
pub const PRECEDENCE: [Intent; 4] = [Intent::Abort, Intent::Promote, Intent::Resume, Intent::Pause];

impl Intent {
    /// The annotation key carrying this intent
    pub fn annotation(&self) -> &'static str {
        match self {
            Intent::Abort => "gateway-cd.io/abort",
            Intent::Promote => "gateway-cd.io/promote",
            Intent::Resume => "gateway-cd.io/resume",
            Intent::Pause => "gateway-cd.io/pause",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Abort => write!(f, "abort"),
            Intent::Promote => write!(f, "promote"),
            Intent::Resume => write!(f, "resume"),
            Intent::Pause => write!(f, "pause"),
        }
    }
}

/// Whether a specific intent is requested in the annotation map
pub fn requested(annotations: &BTreeMap<String, String>, intent: Intent) -> bool {
    annotations
        .get(intent.annotation())
        .is_some_and(|v| v == "true")
}

/// The highest-precedence pending intent among those a phase honors
pub fn first_pending(
    annotations: &BTreeMap<String, String>,
    honored: &[Intent],
) -> Option<Intent> {
    PRECEDENCE
        .iter()
        .copied()
        .find(|intent| honored.contains(intent) && requested(annotations, *intent))
}

/// Pending intents of a rollout, honoring the given set
pub fn pending_for(canary: &CanaryDeployment, honored: &[Intent]) -> Option<Intent> {
    canary
        .metadata
        .annotations
        .as_ref()
        .and_then(|ann| first_pending(ann, honored))
}

/// Consume an intent: remove its annotation so a duplicate click cannot
/// re-trigger it. Called after the status write that acted on it.
pub async fn clear(client: &kube::Client, canary: &CanaryDeployment, intent: Intent) -> Result<()> {
    let ns = canary.namespace().unwrap_or_default();
    let api: Api<CanaryDeployment> = Api::namespaced(client.clone(), &ns);
    let name = canary.name_any();

    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                intent.annotation(): null
            }
        }
    });

    api.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;

    debug!("Cleared {} intent on {}", intent, name);
    Ok(())
}
