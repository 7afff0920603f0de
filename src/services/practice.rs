use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::plan::{self, LearningStatus, PlanVocabularyItem};
use super::progress;
use super::session::{self, PracticeState, SessionState, SessionType};
use super::{new_id, now, today, ServiceError, ServiceResult};

pub const DEFAULT_WORD_COUNT: i64 = 10;
pub const MAX_WORD_COUNT: i64 = 100;
const HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeType {
    Flashcard,
    EnglishInput,
    VietnameseInput,
}

impl PracticeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flashcard => "flashcard",
            Self::EnglishInput => "english_input",
            Self::VietnameseInput => "vietnamese_input",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flashcard" => Some(Self::Flashcard),
            "english_input" => Some(Self::EnglishInput),
            "vietnamese_input" => Some(Self::VietnameseInput),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeQuestion {
    pub id: String,
    pub vocabulary_id: String,
    pub word_type: Option<String>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meaning_vi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phonetics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_sentence: Option<String>,
}

/// One answered question, read leniently from whatever the client sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PracticeResult {
    pub vocabulary_id: Option<String>,
    pub correct: bool,
    pub self_evaluation: Option<String>,
}

impl PracticeResult {
    /// `None` when the entry is not a JSON object.
    pub fn interpret(entry: &Value) -> Option<Self> {
        let fields = entry.as_object()?;
        let vocabulary_id = match fields.get("vocabulary_id") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let self_evaluation = match fields.get("self_evaluation") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        };
        Some(Self {
            vocabulary_id,
            correct: fields.get("correct").is_some_and(truthy),
            self_evaluation,
        })
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PracticeSession {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub plan_name: String,
    pub practice_type: PracticeType,
    pub total_questions: i64,
    pub correct_answers: i64,
    pub incorrect_answers: i64,
    pub accuracy_rate: f64,
    pub results: Vec<Value>,
    pub duration_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Percentage rounded to one decimal.
pub fn accuracy_rate(correct: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (correct as f64 / total as f64 * 1000.0).round() / 10.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartPracticeInput {
    pub plan_id: String,
    pub practice_type: String,
    #[serde(default)]
    pub word_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PracticeStart {
    pub session_id: String,
    pub learning_session_id: String,
    pub practice_type: PracticeType,
    pub questions: Vec<PracticeQuestion>,
    pub total_questions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PracticeStateView {
    pub session_id: String,
    pub practice_type: PracticeType,
    pub current_index: i64,
    pub questions: Vec<PracticeQuestion>,
    pub answers: Vec<Value>,
    pub total_questions: usize,
}

impl From<&PracticeState> for PracticeStateView {
    fn from(state: &PracticeState) -> Self {
        Self {
            session_id: state.practice_session_id.clone(),
            practice_type: state.practice_type,
            current_index: state.current_index,
            questions: state.questions.clone(),
            answers: state.answers.clone(),
            total_questions: state.questions.len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletePracticeInput {
    #[serde(default)]
    pub results: Vec<Value>,
    pub duration_seconds: i64,
}

pub fn generate_questions(items: &[PlanVocabularyItem], practice_type: PracticeType) -> Vec<PracticeQuestion> {
    items
        .iter()
        .map(|item| {
            let v = &item.vocabulary;
            let mut question = PracticeQuestion {
                id: item.id.clone(),
                vocabulary_id: v.id.clone(),
                word_type: v.word_type.clone(),
                prompt: v.word.clone(),
                hint: None,
                answer: None,
                meaning: None,
                meaning_vi: None,
                phonetics: None,
                example_sentence: None,
            };
            match practice_type {
                PracticeType::EnglishInput => {
                    question.prompt = v.meaning_vi.clone().unwrap_or_else(|| v.meaning.clone());
                    question.hint = v.word_type.as_ref().map(|wt| format!("({wt})"));
                    question.answer = Some(v.word.clone());
                }
                PracticeType::VietnameseInput => {
                    question.hint = v.phonetics.clone();
                    question.answer = Some(v.meaning_vi.clone().unwrap_or_else(|| v.meaning.clone()));
                }
                PracticeType::Flashcard => {
                    question.meaning = Some(v.meaning.clone());
                    question.meaning_vi = v.meaning_vi.clone();
                    question.phonetics = v.phonetics.clone();
                    question.example_sentence = v.example_sentence.clone();
                }
            }
            question
        })
        .collect()
}

pub async fn start_practice(pool: &SqlitePool, user_id: &str, input: StartPracticeInput) -> ServiceResult<PracticeStart> {
    let practice_type = PracticeType::parse(input.practice_type.trim()).ok_or_else(|| {
        ServiceError::validation("practice_type", format!("unknown practice type {}", input.practice_type))
    })?;
    let word_count = input.word_count.unwrap_or(DEFAULT_WORD_COUNT);
    if !(1..=MAX_WORD_COUNT).contains(&word_count) {
        return Err(ServiceError::validation(
            "word_count",
            format!("must be between 1 and {MAX_WORD_COUNT}"),
        ));
    }

    let plan = plan::get_plan(pool, user_id, &input.plan_id).await?;
    let mut items = plan::plan_vocabulary(pool, &plan.id).await?;
    if items.is_empty() {
        return Err(ServiceError::not_found("No vocabulary in this learning plan."));
    }
    items.shuffle(&mut rand::rng());
    items.truncate(word_count as usize);

    let questions = generate_questions(&items, practice_type);
    let total_questions = questions.len() as i64;
    let practice_id = new_id();
    let ts = now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"INSERT INTO "practice_sessions"
           ("id","userId","planId","practiceType","totalQuestions","correctAnswers","results","durationSeconds","createdAt")
           VALUES (?,?,?,?,?,0,'[]',0,?)"#,
    )
    .bind(&practice_id)
    .bind(user_id)
    .bind(&plan.id)
    .bind(practice_type.as_str())
    .bind(total_questions)
    .bind(ts)
    .execute(&mut *tx)
    .await?;

    let replaced = session::deactivate_practice_sessions(&mut *tx, user_id, None).await?;

    let state = SessionState::Practice(PracticeState {
        practice_session_id: practice_id.clone(),
        practice_type,
        current_index: 0,
        questions: questions.clone(),
        answers: Vec::new(),
        started_at: Some(ts),
        extra: Map::new(),
    });
    let learning_session = session::insert_session(&mut *tx, user_id, &plan.id, state)
        .await?
        .ok_or_else(|| ServiceError::Conflict("a practice session is already active".to_string()))?;

    tx.commit().await?;

    tracing::info!(
        practice_id = %practice_id,
        plan_id = %plan.id,
        practice_type = practice_type.as_str(),
        total_questions,
        replaced,
        "practice started"
    );

    Ok(PracticeStart {
        session_id: practice_id,
        learning_session_id: learning_session.id,
        practice_type,
        questions,
        total_questions,
    })
}

async fn active_practice_state(pool: &SqlitePool, user_id: &str) -> ServiceResult<session::LearningSession> {
    session::find_active(pool, user_id, None, SessionType::Practice)
        .await?
        .ok_or_else(|| ServiceError::not_found("No active practice session."))
}

pub async fn get_practice_state(pool: &SqlitePool, user_id: &str) -> ServiceResult<PracticeStateView> {
    let active = active_practice_state(pool, user_id).await?;
    match &active.state {
        SessionState::Practice(state) => Ok(PracticeStateView::from(state)),
        SessionState::Flashcard(_) => Err(ServiceError::not_found("No active practice session.")),
    }
}

/// Merges `partial` into the stored state key by key; keys not named in the
/// patch keep their value.
pub async fn patch_practice_state(
    pool: &SqlitePool,
    user_id: &str,
    partial: Map<String, Value>,
) -> ServiceResult<PracticeStateView> {
    let mut active = active_practice_state(pool, user_id).await?;

    let mut merged = match serde_json::to_value(&active.state)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in partial {
        merged.insert(key, value);
    }
    let state: PracticeState = serde_json::from_value(Value::Object(merged))
        .map_err(|err| ServiceError::validation("state", err.to_string()))?;

    let view = PracticeStateView::from(&state);
    active.state = SessionState::Practice(state);
    active.last_activity_at = now();
    session::save_state(pool, &active).await?;
    Ok(view)
}

pub async fn complete_practice(
    pool: &SqlitePool,
    user_id: &str,
    practice_id: &str,
    input: CompletePracticeInput,
) -> ServiceResult<PracticeSession> {
    if input.duration_seconds < 0 {
        return Err(ServiceError::validation("duration_seconds", "must not be negative"));
    }

    let practice = get_practice_session(pool, user_id, practice_id).await?;
    if practice.completed_at.is_some() {
        return Err(ServiceError::validation("session", "Practice session already completed."));
    }

    let completed_at = now();
    let interpreted: Vec<PracticeResult> = input
        .results
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let result = PracticeResult::interpret(entry);
            if result.is_none() {
                tracing::warn!(practice_id = %practice.id, index, "skipping malformed practice result");
            }
            result
        })
        .collect();
    let correct = interpreted.iter().filter(|r| r.correct).count() as i64;

    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(
        r#"UPDATE "practice_sessions"
           SET "correctAnswers" = ?, "results" = ?, "durationSeconds" = ?, "completedAt" = ?
           WHERE "id" = ? AND "userId" = ? AND "completedAt" IS NULL"#,
    )
    .bind(correct)
    .bind(serde_json::to_string(&input.results)?)
    .bind(input.duration_seconds)
    .bind(completed_at)
    .bind(&practice.id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(ServiceError::validation("session", "Practice session already completed."));
    }

    let mut reviewed = 0usize;
    for result in &interpreted {
        let Some(label) = result.self_evaluation.as_deref() else {
            continue;
        };
        let Some(status) = LearningStatus::parse(label) else {
            tracing::warn!(practice_id = %practice.id, label, "skipping invalid self-evaluation");
            continue;
        };
        let Some(vocabulary_id) = result.vocabulary_id.as_deref() else {
            tracing::warn!(practice_id = %practice.id, "skipping result without vocabulary id");
            continue;
        };
        if plan::apply_review(&mut *tx, &practice.plan_id, vocabulary_id, status, None).await? {
            reviewed += 1;
        } else {
            tracing::warn!(practice_id = %practice.id, vocabulary_id, "skipping vocabulary outside plan");
        }
    }

    session::deactivate_practice_sessions(&mut *tx, user_id, Some(completed_at)).await?;
    progress::add_activity(
        &mut *tx,
        user_id,
        &practice.plan_id,
        today(),
        practice.total_questions,
        input.duration_seconds / 60,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        practice_id = %practice.id,
        correct,
        total = practice.total_questions,
        reviewed,
        "practice completed"
    );

    Ok(PracticeSession {
        correct_answers: correct,
        incorrect_answers: practice.total_questions - correct,
        accuracy_rate: accuracy_rate(correct, practice.total_questions),
        results: input.results,
        duration_seconds: input.duration_seconds,
        completed_at: Some(completed_at),
        ..practice
    })
}

pub async fn list_practice_sessions(pool: &SqlitePool, user_id: &str) -> ServiceResult<Vec<PracticeSession>> {
    let rows = sqlx::query(
        r#"SELECT ps."id" AS "id", ps."userId" AS "userId", ps."planId" AS "planId", p."name" AS "planName",
                  ps."practiceType" AS "practiceType", ps."totalQuestions" AS "totalQuestions",
                  ps."correctAnswers" AS "correctAnswers", ps."results" AS "results",
                  ps."durationSeconds" AS "durationSeconds", ps."createdAt" AS "createdAt",
                  ps."completedAt" AS "completedAt"
           FROM "practice_sessions" ps
           JOIN "learning_plans" p ON p."id" = ps."planId"
           WHERE ps."userId" = ?
           ORDER BY ps."createdAt" DESC
           LIMIT ?"#,
    )
    .bind(user_id)
    .bind(HISTORY_LIMIT)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_practice_row).collect()
}

pub async fn get_practice_session(pool: &SqlitePool, user_id: &str, practice_id: &str) -> ServiceResult<PracticeSession> {
    let row = sqlx::query(
        r#"SELECT ps."id" AS "id", ps."userId" AS "userId", ps."planId" AS "planId", p."name" AS "planName",
                  ps."practiceType" AS "practiceType", ps."totalQuestions" AS "totalQuestions",
                  ps."correctAnswers" AS "correctAnswers", ps."results" AS "results",
                  ps."durationSeconds" AS "durationSeconds", ps."createdAt" AS "createdAt",
                  ps."completedAt" AS "completedAt"
           FROM "practice_sessions" ps
           JOIN "learning_plans" p ON p."id" = ps."planId"
           WHERE ps."id" = ? AND ps."userId" = ?"#,
    )
    .bind(practice_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => map_practice_row(&row),
        None => Err(ServiceError::not_found("Practice session not found.")),
    }
}

fn map_practice_row(row: &SqliteRow) -> ServiceResult<PracticeSession> {
    let practice_type: String = row.try_get("practiceType")?;
    let results: String = row.try_get("results")?;
    let total_questions: i64 = row.try_get("totalQuestions")?;
    let correct_answers: i64 = row.try_get("correctAnswers")?;
    Ok(PracticeSession {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        plan_id: row.try_get("planId")?,
        plan_name: row.try_get("planName")?,
        practice_type: PracticeType::parse(&practice_type).unwrap_or(PracticeType::Flashcard),
        total_questions,
        correct_answers,
        incorrect_answers: total_questions - correct_answers,
        accuracy_rate: accuracy_rate(correct_answers, total_questions),
        results: serde_json::from_str(&results)?,
        duration_seconds: row.try_get("durationSeconds")?,
        created_at: row.try_get("createdAt")?,
        completed_at: row.try_get("completedAt")?,
    })
}
