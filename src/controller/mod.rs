pub mod analysis;
pub mod context;
pub mod error;
pub mod intents;
pub mod reconciler;
pub mod state_machine;
pub mod status;
pub mod validation;

pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use reconciler::{FINALIZER, error_policy, reconcile};
pub use state_machine::{RolloutEvent, RolloutStateMachine, TransitionContext, TransitionResult};
pub use status::{ConditionBuilder, StatusManager};
pub use validation::validate_spec;
