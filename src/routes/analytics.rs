use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::auth::require_user;
use crate::response::{ok, AppError};
use crate::services::analytics;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(overall))
        .route("/plans/:plan_id", get(for_plan))
        .route("/streak", get(streak))
        .route("/risk", get(risk))
}

async fn overall(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(analytics::overall_summary(state.pool(), &user.id).await?))
}

async fn for_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(analytics::plan_analytics(state.pool(), &user.id, &plan_id).await?))
}

async fn streak(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(analytics::streak(state.pool(), &user.id).await?))
}

async fn risk(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(analytics::risk(state.pool(), &user.id).await?))
}
