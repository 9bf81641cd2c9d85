//! In-process stub Prometheus backend for analysis scenarios
//!
//! Serves GET /api/v1/query, answering every query with a configurable
//! scalar so a test can steer the analyzer's verdict.

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde_json::json;
use tokio::sync::RwLock;

/// A stub metrics backend returning a configurable scalar
pub struct StubPrometheus {
    value: Arc<RwLock<f64>>,
    /// Base URL the provider should be pointed at
    pub base_url: String,
}

async fn query(State(value): State<Arc<RwLock<f64>>>) -> Json<serde_json::Value> {
    let value = *value.read().await;
    Json(json!({
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [{"metric": {}, "value": [1722600000.0, value.to_string()]}]
        }
    }))
}

impl StubPrometheus {
    /// Start the stub on an ephemeral port
    pub async fn start(initial_value: f64) -> Self {
        let value = Arc::new(RwLock::new(initial_value));

        let app = Router::new()
            .route("/api/v1/query", get(query))
            .with_state(value.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub prometheus");
        let addr = listener.local_addr().expect("stub prometheus address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            value,
            base_url: format!("http://{}", addr),
        }
    }

    /// Change the scalar every subsequent query returns
    pub async fn set(&self, value: f64) {
        *self.value.write().await = value;
    }
}
