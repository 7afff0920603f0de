use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::require_user;
use crate::response::{ok, ok_with_message, AppError};
use crate::services::plan::{
    self, CreatePlanInput, FlashcardQuery, PlanPatch, StatusUpdate, VocabularyQuery,
};
use crate::services::session::{self, FlashcardState};
use crate::state::AppState;

use super::{parse_flag, parse_number};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_plans).post(create_plan))
        .route("/:id", get(get_plan).patch(update_plan).delete(delete_plan))
        .route("/:id/vocabulary", get(list_vocabulary))
        .route("/:id/flashcards", get(flashcards))
        .route("/:id/vocabulary/:vocab_id/status", patch(update_vocabulary_status))
        .route("/:id/progress", get(progress))
        .route("/:id/start_session", post(start_session))
        .route("/:id/session", get(get_session).patch(patch_session))
        .route("/:id/end_session", post(end_session))
}

#[derive(Debug, Deserialize)]
struct ListPlansQuery {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VocabularyListQuery {
    status: Option<String>,
    search: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlashcardListQuery {
    status: Option<String>,
    shuffle: Option<String>,
    limit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProgressQuery {
    days: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionPatchRequest {
    state: FlashcardState,
}

async fn list_plans(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListPlansQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let plans = plan::list_plans(state.pool(), &user.id, query.status.as_deref()).await?;
    Ok(ok(plans))
}

async fn create_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePlanInput>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let detail = plan::create_plan(state.pool(), &user, payload).await?;
    Ok((StatusCode::CREATED, ok(detail)))
}

async fn get_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(plan::plan_detail(state.pool(), &user.id, &plan_id).await?))
}

async fn update_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
    Json(payload): Json<PlanPatch>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(plan::update_plan(state.pool(), &user.id, &plan_id, payload).await?))
}

async fn delete_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    plan::delete_plan(state.pool(), &user.id, &plan_id).await?;
    Ok(ok_with_message((), "Learning plan deleted."))
}

async fn list_vocabulary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
    Query(query): Query<VocabularyListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let page = plan::list_plan_vocabulary(
        state.pool(),
        &user.id,
        &plan_id,
        VocabularyQuery {
            status: query.status,
            search: query.search,
            page: parse_number(query.page.as_deref()),
            page_size: parse_number(query.page_size.as_deref()),
        },
    )
    .await?;
    Ok(ok(page))
}

async fn flashcards(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
    Query(query): Query<FlashcardListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let cards = plan::get_flashcards(
        state.pool(),
        &user.id,
        &plan_id,
        FlashcardQuery {
            status: query.status,
            shuffle: parse_flag(query.shuffle.as_deref()),
            limit: parse_number(query.limit.as_deref()),
        },
    )
    .await?;
    Ok(ok(cards))
}

async fn update_vocabulary_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((plan_id, vocabulary_id)): Path<(String, String)>,
    Json(payload): Json<StatusUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let card = plan::update_vocabulary_status(state.pool(), &user.id, &plan_id, &vocabulary_id, payload).await?;
    Ok(ok(card))
}

async fn progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
    Query(query): Query<ProgressQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let days = parse_number(query.days.as_deref());
    Ok(ok(plan::get_daily_progress(state.pool(), &user.id, &plan_id, days).await?))
}

async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let started = session::start_or_resume_flashcard_session(state.pool(), &user.id, &plan_id).await?;
    let status = if started.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, ok(started)))
}

async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    Ok(ok(session::get_flashcard_session(state.pool(), &user.id, &plan_id).await?))
}

async fn patch_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
    Json(payload): Json<SessionPatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let updated = session::patch_flashcard_state(state.pool(), &user.id, &plan_id, payload.state).await?;
    Ok(ok(updated))
}

async fn end_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plan_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &headers).await?;
    let ended = session::end_session(state.pool(), &user.id, &plan_id).await?;
    Ok(ok_with_message(ended, "Session ended successfully."))
}
