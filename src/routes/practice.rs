use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::auth::require_user;
use crate::response::{ok, AppError};
use crate::services::practice::{self, CompletePracticeInput, StartPracticeInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions))
        .route("/start", post(start))
        .route("/state", get(get_state).patch(patch_state))
        .route("/:id", get(get_session))
        .route("/:id/complete", post(complete))
}

#[derive(Debug, Deserialize)]
struct StatePatchRequest {
    #[serde(default)]
    state: Map<String, Value>,
}

async fn list_sessions(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(practice::list_practice_sessions(state.pool(), &user.id).await?))
}

async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(practice_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(practice::get_practice_session(state.pool(), &user.id, &practice_id).await?))
}

async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StartPracticeInput>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let started = practice::start_practice(state.pool(), &user.id, payload).await?;
    Ok((StatusCode::CREATED, ok(started)))
}

async fn get_state(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(practice::get_practice_state(state.pool(), &user.id).await?))
}

async fn patch_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<StatePatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(practice::patch_practice_state(state.pool(), &user.id, payload.state).await?))
}

async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(practice_id): Path<String>,
    Json(payload): Json<CompletePracticeInput>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(practice::complete_practice(state.pool(), &user.id, &practice_id, payload).await?))
}
