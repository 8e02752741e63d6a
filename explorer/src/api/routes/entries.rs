//! Search bar entries.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::api::models::{EntriesResponse, EntrySearchParams};
use crate::api::server::AppState;

const DEFAULT_LIMIT: usize = 50;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(search_entries))
}

async fn search_entries(
    State(state): State<AppState>,
    Query(params): Query<EntrySearchParams>,
) -> Json<EntriesResponse> {
    let term = params.q.unwrap_or_default();
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    Json(EntriesResponse {
        total: state.entries.len(),
        entries: state
            .entries
            .search(&term, limit)
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}
