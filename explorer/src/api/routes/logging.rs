//! Log filter routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{LogFilterResponse, ModuleInfo, UpdateLogFilterRequest};
use crate::api::server::AppState;
use crate::logging::available_modules;

pub fn router() -> Router<AppState> {
    Router::new().route("/filter", get(get_filter).put(update_filter))
}

fn filter_response(filter: String) -> LogFilterResponse {
    LogFilterResponse {
        filter,
        available_modules: available_modules()
            .into_iter()
            .map(|(name, description)| ModuleInfo {
                name: name.to_string(),
                description: description.to_string(),
            })
            .collect(),
    }
}

async fn get_filter(State(state): State<AppState>) -> ApiResult<Json<LogFilterResponse>> {
    let logging = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging is not configured"))?;
    Ok(Json(filter_response(logging.get_filter())))
}

async fn update_filter(
    State(state): State<AppState>,
    Json(request): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LogFilterResponse>> {
    let logging = state
        .logging_config
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Logging is not configured"))?;
    logging.set_filter(&request.filter)?;
    Ok(Json(filter_response(logging.get_filter())))
}
