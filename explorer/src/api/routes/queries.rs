//! Poll and retry routes for query functions.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use crate::api::error::ApiResult;
use crate::api::models::{PollResponse, QueryListResponse, SelectionParams};
use crate::api::server::AppState;
use crate::domain::JobKey;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_queries))
        .route("/{identity}/poll", get(poll_query))
        .route("/{identity}/retry", post(retry_query))
}

async fn list_queries(State(state): State<AppState>) -> Json<QueryListResponse> {
    Json(QueryListResponse {
        queries: state.queries.identities(),
    })
}

/// One UI timer tick.
async fn poll_query(
    State(state): State<AppState>,
    Path(identity): Path<String>,
    Query(params): Query<SelectionParams>,
) -> ApiResult<Json<PollResponse>> {
    let query = state.queries.get(&identity)?;
    let selection = params.selection();
    let outcome = state.poll_adapter.poll(&query, &selection).await;

    Ok(Json(PollResponse::from_outcome(
        JobKey::fingerprint(&identity, &selection),
        outcome,
        state.poll_adapter.config().max_intervals,
    )))
}

async fn retry_query(
    State(state): State<AppState>,
    Path(identity): Path<String>,
    Query(params): Query<SelectionParams>,
) -> ApiResult<Json<PollResponse>> {
    let query = state.queries.get(&identity)?;
    let selection = params.selection();
    selection.ensure_not_empty()?;
    let outcome = state.poll_adapter.retry(&query, &selection).await;

    Ok(Json(PollResponse::from_outcome(
        JobKey::fingerprint(&identity, &selection),
        outcome,
        state.poll_adapter.config().max_intervals,
    )))
}
