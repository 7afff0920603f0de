use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::Router;
use serde::Serialize;

use crate::auth::require_user;
use crate::response::{ok, ok_with_message, AppError};
use crate::services::notification;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread_count", get(unread_count))
        .route("/:id/read", patch(mark_read))
        .route("/mark_all_read", post(mark_all_read))
}

#[derive(Debug, Serialize)]
struct AffectedData {
    affected: u64,
}

async fn list(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(notification::list_notifications(state.pool(), &user.id).await?))
}

async fn unread_count(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(notification::unread_count(state.pool(), &user.id).await?))
}

async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(notification_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(notification::mark_read(state.pool(), &user.id, &notification_id).await?))
}

async fn mark_all_read(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let affected = notification::mark_all_read(state.pool(), &user.id).await?;
    Ok(ok_with_message(
        AffectedData { affected },
        "All notifications marked as read.",
    ))
}
