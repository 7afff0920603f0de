mod analytics;
mod health;
mod notifications;
mod plans;
mod practice;

use std::str::FromStr;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::response::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .nest("/api/plans", plans::router())
        .nest("/api/practice", practice::router())
        .nest("/api/analytics", analytics::router())
        .nest("/api/notifications", notifications::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> impl IntoResponse {
    AppError::not_found("Route not found.")
}

/// Lenient numeric query parameter: anything that does not parse is treated
/// as absent.
pub(crate) fn parse_number<T: FromStr>(raw: Option<&str>) -> Option<T> {
    raw.map(str::trim).and_then(|value| value.parse::<T>().ok())
}

pub(crate) fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_parse_leniently() {
        assert_eq!(parse_number::<usize>(Some("25")), Some(25));
        assert_eq!(parse_number::<usize>(Some("-3")), None);
        assert_eq!(parse_number::<usize>(Some("abc")), None);
        assert_eq!(parse_number::<i64>(None), None);
    }

    #[test]
    fn only_true_enables_flags() {
        assert!(parse_flag(Some("TRUE")));
        assert!(!parse_flag(Some("1")));
        assert!(!parse_flag(None));
    }
}
