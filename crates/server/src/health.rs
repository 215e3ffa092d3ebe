use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use cloudpilot_agent::Orchestrator;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub orchestrator: Arc<Orchestrator>,
    pub reasoner: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub registry: HealthCheck,
    pub reasoner: &'static str,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let registry = registry_check(&state.orchestrator);
    let ready = registry.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "cloudpilot-server runtime initialized".to_string(),
        },
        registry,
        reasoner: state.reasoner,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn registry_check(orchestrator: &Orchestrator) -> HealthCheck {
    let registry = orchestrator.registry();
    if registry.is_empty() {
        HealthCheck { status: "degraded", detail: "capability registry is empty".to_string() }
    } else {
        HealthCheck {
            status: "ready",
            detail: format!("{} capabilities registered", registry.len()),
        }
    }
}
