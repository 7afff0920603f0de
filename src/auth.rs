use axum::http::HeaderMap;

use crate::response::AppError;
use crate::services::users::{self, User};
use crate::state::AppState;

/// Header carrying the caller's id, set by the upstream auth gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn extract_user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, AppError> {
    let user_id = extract_user_id(headers).ok_or_else(|| AppError::unauthorized("Authentication required."))?;

    users::get_user(state.pool(), &user_id)
        .await?
        .ok_or_else(|| {
            tracing::debug!(user_id = %user_id, "unknown caller");
            AppError::unauthorized("Authentication required.")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn blank_header_is_treated_as_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_user_id(&headers), None);
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(extract_user_id(&headers), None);
        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" abc "));
        assert_eq!(extract_user_id(&headers).as_deref(), Some("abc"));
    }
}
