#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{Duration, NaiveDate, Utc};
use sqlx::SqlitePool;

use vocab_planner::db::Database;
use vocab_planner::services::plan::{self, CreatePlanInput, PlanDetail};
use vocab_planner::services::users::{self, User, UserRole};
use vocab_planner::services::vocabulary::{self, NewVocabulary, Topic, Vocabulary};

pub struct Fixture {
    pub db: Database,
    pub admin: User,
    pub learner: User,
    pub other: User,
    pub travel: Topic,
    pub food: Topic,
}

impl Fixture {
    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn days_from_today(offset: i64) -> NaiveDate {
    today() + Duration::days(offset)
}

pub async fn setup() -> Fixture {
    let db = Database::connect_in_memory().await.expect("in-memory database");
    let pool = db.pool();

    let admin = users::create_user(pool, "admin", UserRole::Admin).await.unwrap();
    let learner = users::create_user(pool, "linh", UserRole::Learner).await.unwrap();
    let other = users::create_user(pool, "minh", UserRole::Learner).await.unwrap();

    let travel = vocabulary::create_topic(pool, &admin, "Travel", Some("Getting around"))
        .await
        .unwrap();
    let food = vocabulary::create_topic(pool, &admin, "Food", None).await.unwrap();

    Fixture {
        db,
        admin,
        learner,
        other,
        travel,
        food,
    }
}

pub async fn add_word(
    pool: &SqlitePool,
    actor: &User,
    word: &str,
    level: &str,
    topics: &[&Topic],
    is_system: bool,
) -> Vocabulary {
    vocabulary::create_vocabulary(
        pool,
        actor,
        NewVocabulary {
            word: word.to_string(),
            meaning: format!("meaning of {word}"),
            meaning_vi: Some(format!("nghĩa của {word}")),
            word_type: Some("noun".to_string()),
            level: Some(level.to_string()),
            is_system,
            topic_ids: topics.iter().map(|t| t.id.clone()).collect(),
            ..NewVocabulary::default()
        },
    )
    .await
    .unwrap()
}

/// Seeds `count` system words at A1 under the travel topic.
pub async fn seed_travel_words(fx: &Fixture, count: usize) -> Vec<Vocabulary> {
    let mut words = Vec::with_capacity(count);
    for i in 0..count {
        words.push(add_word(fx.pool(), &fx.admin, &format!("word{i:02}"), "A1", &[&fx.travel], true).await);
    }
    words
}

pub fn plan_input(fx: &Fixture, start: NaiveDate, end: NaiveDate) -> CreatePlanInput {
    CreatePlanInput {
        name: "Trip prep".to_string(),
        start_date: start,
        end_date: end,
        daily_study_time: 20,
        topic_ids: vec![fx.travel.id.clone()],
        selected_levels: vec!["A1".to_string()],
    }
}

/// A plan that started two days ago and runs for ten days.
pub async fn travel_plan(fx: &Fixture) -> PlanDetail {
    plan::create_plan(
        fx.pool(),
        &fx.learner,
        plan_input(fx, days_from_today(-2), days_from_today(7)),
    )
    .await
    .unwrap()
}

pub async fn set_words_studied(pool: &SqlitePool, user: &User, plan_id: &str, date: NaiveDate, words: i64) {
    sqlx::query(
        r#"INSERT INTO "learning_progress"
           ("id","userId","planId","date","wordsStudied","plannedWords","status","createdAt","updatedAt")
           VALUES (?,?,?,?,?,0,'upcoming',?,?)
           ON CONFLICT ("userId","planId","date") DO UPDATE SET "wordsStudied" = excluded."wordsStudied""#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.id)
    .bind(plan_id)
    .bind(date)
    .bind(words)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn request(method: &str, uri: &str, user: Option<&User>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", &user.id);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
