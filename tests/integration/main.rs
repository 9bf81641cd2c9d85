//! Integration tests for gateway-cd-operator
//!
//! These tests require a running Kubernetes cluster accessible via kubeconfig.
//! Tests are marked with #[ignore] and must be run explicitly:
//!
//! ```bash
//! cargo test --test integration -- --ignored --test-threads=1
//! ```
//!
//! The tests use your existing kubeconfig (~/.kube/config or KUBECONFIG env var).
//! Note: Tests run sequentially to avoid conflicts.

mod namespace;
mod operator;
mod prometheus_stub;
mod wait;


pub use fixtures::*;
pub use namespace::*;
pub use operator::*;
pub use prometheus_stub::*;
pub use wait::*;
