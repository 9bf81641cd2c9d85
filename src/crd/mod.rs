mod canary_deployment;
mod httproute;

pub use canary_deployment::*;
pub use httproute::*;
