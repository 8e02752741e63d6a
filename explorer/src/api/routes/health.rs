//! Health check routes.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};

use crate::api::models::{ComponentHealth, HealthResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
}

async fn check_components(state: &AppState) -> Vec<ComponentHealth> {
    let mut components = Vec::with_capacity(2);

    if let Some(database) = &state.database {
        components.push(match database.ping().await {
            Ok(()) => ComponentHealth {
                name: "database".to_string(),
                status: "healthy".to_string(),
                message: None,
            },
            Err(e) => ComponentHealth {
                name: "database".to_string(),
                status: "unhealthy".to_string(),
                message: Some(e.to_string()),
            },
        });
    }

    let harness = state.poll_adapter.registry().harness();
    components.push(ComponentHealth {
        name: "workers".to_string(),
        status: if harness.is_running() { "healthy" } else { "unhealthy" }.to_string(),
        message: Some(format!(
            "{}/{} busy",
            harness.active_count(),
            harness.config().max_workers
        )),
    });

    components
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let components = check_components(&state).await;
    let healthy = components.iter().all(|c| c.status == "healthy");

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        components,
    })
}

/// 200 when every component is healthy, 503 otherwise.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let components = check_components(&state).await;
    if components.iter().all(|c| c.status == "healthy") {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "uptime_secs": uptime
        })),
    )
}
