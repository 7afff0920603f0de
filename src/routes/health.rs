use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    schema_version: Option<String>,
    uptime: u64,
    timestamp: String,
}

pub async fn health(State(state): State<AppState>) -> Response {
    let ok = state.db().ping().await;
    let schema_version = if ok {
        state.db().schema_version().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "schema version lookup failed");
            None
        })
    } else {
        None
    };

    let response = HealthResponse {
        status: if ok { "ok" } else { "degraded" },
        database: if ok { "connected" } else { "disconnected" },
        schema_version,
        uptime: state.uptime_seconds(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}
