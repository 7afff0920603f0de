mod common;

use chrono::{Duration, Utc};
use serde_json::{json, Map};

use common::{seed_travel_words, setup, today, travel_plan};
use vocab_planner::services::progress;
use vocab_planner::services::session::{self, FlashcardState, SessionState};
use vocab_planner::services::ServiceError;

fn flashcard_state(state: &SessionState) -> &FlashcardState {
    match state {
        SessionState::Flashcard(state) => state,
        SessionState::Practice(_) => panic!("expected flashcard state"),
    }
}

#[tokio::test]
async fn second_start_resumes_the_active_session() {
    let fx = setup().await;
    seed_travel_words(&fx, 3).await;
    let plan = travel_plan(&fx).await;
    let pool = fx.pool();

    let first = session::start_or_resume_flashcard_session(pool, &fx.learner.id, &plan.plan.id)
        .await
        .unwrap();
    assert!(!first.resumed);
    assert_eq!(first.session.state.current_index, 0);
    assert!(first.session.state.started_at.is_some());

    let mut extra = Map::new();
    extra.insert("deck_order".to_string(), json!(["a", "b"]));
    session::patch_flashcard_state(
        pool,
        &fx.learner.id,
        &plan.plan.id,
        FlashcardState {
            current_index: 2,
            completed_ids: vec![json!("a"), json!("b")],
            started_at: first.session.state.started_at,
            extra,
            ..FlashcardState::default()
        },
    )
    .await
    .unwrap();

    let second = session::start_or_resume_flashcard_session(pool, &fx.learner.id, &plan.plan.id)
        .await
        .unwrap();
    assert!(second.resumed);
    assert_eq!(second.session.id, first.session.id);
    assert_eq!(second.session.state.current_index, 2);
    assert_eq!(second.session.state.completed_ids.len(), 2);
    assert!(second.session.state.extra.is_empty());

    let active: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "learning_sessions" WHERE "userId" = ? AND "isActive" = 1"#,
    )
    .bind(&fx.learner.id)
    .fetch_one(pool)
    .await
    .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn patch_replaces_state_and_keeps_unknown_keys() {
    let fx = setup().await;
    let plan = travel_plan(&fx).await;
    let pool = fx.pool();
    session::start_or_resume_flashcard_session(pool, &fx.learner.id, &plan.plan.id)
        .await
        .unwrap();

    let mut extra = Map::new();
    extra.insert("theme".to_string(), json!("dark"));
    let mut statuses = Map::new();
    statuses.insert("v1".to_string(), json!("learned"));
    session::patch_flashcard_state(
        pool,
        &fx.learner.id,
        &plan.plan.id,
        FlashcardState {
            current_index: 5,
            statuses,
            extra,
            ..FlashcardState::default()
        },
    )
    .await
    .unwrap();

    let stored = session::get_flashcard_session(pool, &fx.learner.id, &plan.plan.id)
        .await
        .unwrap();
    let state = flashcard_state(&stored.state);
    assert_eq!(state.current_index, 5);
    assert_eq!(state.statuses.get("v1"), Some(&json!("learned")));
    assert_eq!(state.extra.get("theme"), Some(&json!("dark")));
    assert!(state.started_at.is_none());
}

#[tokio::test]
async fn ending_a_session_logs_study_minutes() {
    let fx = setup().await;
    let plan = travel_plan(&fx).await;
    let pool = fx.pool();
    session::start_or_resume_flashcard_session(pool, &fx.learner.id, &plan.plan.id)
        .await
        .unwrap();

    session::patch_flashcard_state(
        pool,
        &fx.learner.id,
        &plan.plan.id,
        FlashcardState::fresh(Utc::now() - Duration::minutes(25)),
    )
    .await
    .unwrap();

    let ended = session::end_session(pool, &fx.learner.id, &plan.plan.id).await.unwrap();
    assert!(!ended.is_active);
    assert!(ended.completed_at.is_some());

    let day = progress::get_day(pool, &fx.learner.id, &plan.plan.id, today())
        .await
        .unwrap()
        .unwrap();
    assert!((25..=26).contains(&day.study_time_minutes));
    assert_eq!(day.words_studied, 0);

    let err = session::end_session(pool, &fx.learner.id, &plan.plan.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let restarted = session::start_or_resume_flashcard_session(pool, &fx.learner.id, &plan.plan.id)
        .await
        .unwrap();
    assert!(!restarted.resumed);
    assert_ne!(restarted.session.id, ended.id);
}

#[tokio::test]
async fn session_calls_without_active_session_are_not_found() {
    let fx = setup().await;
    let plan = travel_plan(&fx).await;
    let pool = fx.pool();

    let err = session::get_flashcard_session(pool, &fx.learner.id, &plan.plan.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = session::patch_flashcard_state(pool, &fx.learner.id, &plan.plan.id, FlashcardState::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = session::start_or_resume_flashcard_session(pool, &fx.other.id, &plan.plan.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
