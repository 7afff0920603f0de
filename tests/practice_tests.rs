mod common;

use serde_json::{json, Map};

use common::{seed_travel_words, setup, today, travel_plan, Fixture};
use vocab_planner::services::plan::{self, LearningStatus, VocabularyQuery};
use vocab_planner::services::practice::{self, CompletePracticeInput, PracticeType, StartPracticeInput};
use vocab_planner::services::progress;
use vocab_planner::services::ServiceError;

fn start_input(plan_id: &str, practice_type: &str, word_count: Option<i64>) -> StartPracticeInput {
    StartPracticeInput {
        plan_id: plan_id.to_string(),
        practice_type: practice_type.to_string(),
        word_count,
    }
}

async fn active_practice_sessions(fx: &Fixture) -> i64 {
    sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "learning_sessions"
           WHERE "userId" = ? AND "sessionType" = 'practice' AND "isActive" = 1"#,
    )
    .bind(&fx.learner.id)
    .fetch_one(fx.pool())
    .await
    .unwrap()
}

#[tokio::test]
async fn start_validates_type_and_word_count() {
    let fx = setup().await;
    seed_travel_words(&fx, 3).await;
    let detail = travel_plan(&fx).await;
    let pool = fx.pool();

    let err = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "dictation", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation { field: "practice_type", .. }));

    for bad in [0, 101] {
        let err = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "flashcard", Some(bad)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { field: "word_count", .. }));
    }

    let err = practice::start_practice(pool, &fx.other.id, start_input(&detail.plan.id, "flashcard", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn start_on_empty_plan_is_not_found() {
    let fx = setup().await;
    let detail = travel_plan(&fx).await;

    let err = practice::start_practice(fx.pool(), &fx.learner.id, start_input(&detail.plan.id, "flashcard", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert_eq!(active_practice_sessions(&fx).await, 0);
}

#[tokio::test]
async fn start_caps_questions_to_snapshot_and_word_count() {
    let fx = setup().await;
    seed_travel_words(&fx, 4).await;
    let detail = travel_plan(&fx).await;
    let pool = fx.pool();

    let started = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "english_input", None))
        .await
        .unwrap();
    assert_eq!(started.total_questions, 4);
    assert_eq!(started.practice_type, PracticeType::EnglishInput);
    for question in &started.questions {
        assert!(question.prompt.starts_with("nghĩa của "));
        assert_eq!(question.hint.as_deref(), Some("(noun)"));
        assert!(question.answer.as_deref().is_some_and(|a| a.starts_with("word")));
    }

    let started = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "flashcard", Some(2)))
        .await
        .unwrap();
    assert_eq!(started.total_questions, 2);
    assert_eq!(started.questions.len(), 2);
}

#[tokio::test]
async fn new_start_replaces_the_active_practice() {
    let fx = setup().await;
    seed_travel_words(&fx, 3).await;
    let detail = travel_plan(&fx).await;
    let pool = fx.pool();

    let first = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "flashcard", None))
        .await
        .unwrap();
    let second = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "vietnamese_input", None))
        .await
        .unwrap();
    assert_ne!(first.session_id, second.session_id);
    assert_eq!(active_practice_sessions(&fx).await, 1);

    let state = practice::get_practice_state(pool, &fx.learner.id).await.unwrap();
    assert_eq!(state.session_id, second.session_id);
    assert_eq!(state.practice_type, PracticeType::VietnameseInput);
    assert_eq!(state.total_questions, 3);
}

#[tokio::test]
async fn state_patch_merges_keys() {
    let fx = setup().await;
    seed_travel_words(&fx, 3).await;
    let detail = travel_plan(&fx).await;
    let pool = fx.pool();

    let err = practice::get_practice_state(pool, &fx.learner.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let started = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "flashcard", None))
        .await
        .unwrap();

    let mut partial = Map::new();
    partial.insert("current_index".to_string(), json!(2));
    partial.insert("answers".to_string(), json!([{"correct": true}, {"correct": false}]));
    let view = practice::patch_practice_state(pool, &fx.learner.id, partial).await.unwrap();

    assert_eq!(view.current_index, 2);
    assert_eq!(view.answers.len(), 2);
    assert_eq!(view.session_id, started.session_id);
    assert_eq!(view.questions, started.questions);

    let mut bad = Map::new();
    bad.insert("current_index".to_string(), json!("two"));
    let err = practice::patch_practice_state(pool, &fx.learner.id, bad).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation { field: "state", .. }));

    let reread = practice::get_practice_state(pool, &fx.learner.id).await.unwrap();
    assert_eq!(reread.current_index, 2);
}

#[tokio::test]
async fn completion_records_results_and_statuses() {
    let fx = setup().await;
    let words = seed_travel_words(&fx, 3).await;
    let detail = travel_plan(&fx).await;
    let pool = fx.pool();

    let started = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "flashcard", None))
        .await
        .unwrap();

    let results = vec![
        json!({"vocabulary_id": words[0].id, "correct": true, "self_evaluation": "mastered"}),
        json!({"vocabulary_id": words[1].id, "correct": false, "self_evaluation": "so-so"}),
        json!({"vocabulary_id": "not-in-plan", "correct": true, "self_evaluation": "learned"}),
    ];

    let done = practice::complete_practice(
        pool,
        &fx.learner.id,
        &started.session_id,
        CompletePracticeInput {
            results,
            duration_seconds: 185,
        },
    )
    .await
    .unwrap();
    assert_eq!(done.correct_answers, 2);
    assert_eq!(done.incorrect_answers, 1);
    assert_eq!(done.accuracy_rate, 66.7);
    assert!(done.completed_at.is_some());
    assert_eq!(done.plan_name, "Trip prep");
    assert_eq!(active_practice_sessions(&fx).await, 0);

    let page = plan::list_plan_vocabulary(pool, &fx.learner.id, &detail.plan.id, VocabularyQuery::default())
        .await
        .unwrap();
    let status_of = |id: &str| page.results.iter().find(|i| i.vocabulary.id == id).map(|i| i.status);
    assert_eq!(status_of(&words[0].id), Some(LearningStatus::Mastered));
    assert_eq!(status_of(&words[1].id), Some(LearningStatus::New));

    let day = progress::get_day(pool, &fx.learner.id, &detail.plan.id, today())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(day.words_studied, 3);
    assert_eq!(day.study_time_minutes, 3);

    let err = practice::complete_practice(
        pool,
        &fx.learner.id,
        &started.session_id,
        CompletePracticeInput {
            results: Vec::new(),
            duration_seconds: 10,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ServiceError::Validation { .. }));
}

#[tokio::test]
async fn malformed_results_are_skipped_without_failing_the_batch() {
    let fx = setup().await;
    let words = seed_travel_words(&fx, 2).await;
    let detail = travel_plan(&fx).await;
    let pool = fx.pool();

    let started = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "flashcard", Some(2)))
        .await
        .unwrap();

    let results = vec![
        json!({"vocabulary_id": words[0].id, "correct": true, "self_evaluation": "mastered"}),
        json!({"vocabulary_id": 42, "correct": 1}),
        json!("not an object"),
        json!({"vocabulary_id": words[1].id, "correct": 0, "self_evaluation": ["learned"]}),
    ];
    let done = practice::complete_practice(
        pool,
        &fx.learner.id,
        &started.session_id,
        CompletePracticeInput {
            results: results.clone(),
            duration_seconds: 30,
        },
    )
    .await
    .unwrap();
    assert_eq!(done.correct_answers, 2);
    assert_eq!(done.total_questions, 2);
    assert_eq!(done.results, results);

    let page = plan::list_plan_vocabulary(pool, &fx.learner.id, &detail.plan.id, VocabularyQuery::default())
        .await
        .unwrap();
    let item = |id: &str| page.results.iter().find(|i| i.vocabulary.id == id).cloned().unwrap();
    assert_eq!(item(&words[0].id).status, LearningStatus::Mastered);
    assert_eq!(item(&words[0].id).review_count, 1);
    assert_eq!(item(&words[1].id).status, LearningStatus::New);

    let stored = practice::get_practice_session(pool, &fx.learner.id, &started.session_id)
        .await
        .unwrap();
    assert_eq!(stored.results, results);
}

#[tokio::test]
async fn history_lists_only_own_sessions() {
    let fx = setup().await;
    seed_travel_words(&fx, 2).await;
    let detail = travel_plan(&fx).await;
    let pool = fx.pool();

    let started = practice::start_practice(pool, &fx.learner.id, start_input(&detail.plan.id, "flashcard", None))
        .await
        .unwrap();

    let history = practice::list_practice_sessions(pool, &fx.learner.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, started.session_id);
    assert!(history[0].completed_at.is_none());
    assert_eq!(history[0].accuracy_rate, 0.0);

    assert!(practice::list_practice_sessions(pool, &fx.other.id).await.unwrap().is_empty());

    let fetched = practice::get_practice_session(pool, &fx.learner.id, &started.session_id)
        .await
        .unwrap();
    assert_eq!(fetched.total_questions, 2);

    let err = practice::get_practice_session(pool, &fx.other.id, &started.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
