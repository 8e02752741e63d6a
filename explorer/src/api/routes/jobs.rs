//! Job registry introspection.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::JobStatsResponse;
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(job_stats))
}

async fn job_stats(State(state): State<AppState>) -> Json<JobStatsResponse> {
    let registry = state.poll_adapter.registry();
    Json(JobStatsResponse {
        cache_backend: registry.cache().backend(),
        max_workers: registry.harness().config().max_workers,
        stats: registry.stats(),
        jobs: registry.snapshots(),
    })
}
