use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::plan;
use super::practice::{PracticeQuestion, PracticeType};
use super::progress;
use super::{new_id, now, today, ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    FlashcardStudy,
    Practice,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlashcardStudy => "flashcard_study",
            Self::Practice => "practice",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "practice" => Self::Practice,
            _ => Self::FlashcardStudy,
        }
    }
}

/// Cursor of a flashcard run. Unknown keys sent by the client ride along in
/// `extra` and are written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlashcardState {
    #[serde(default)]
    pub current_index: i64,
    #[serde(default)]
    pub completed_ids: Vec<Value>,
    #[serde(default)]
    pub statuses: Map<String, Value>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlashcardState {
    pub fn fresh(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(started_at),
            ..Self::default()
        }
    }

    /// The four cursor fields only, as handed back on resume.
    pub fn condensed(&self) -> Self {
        Self {
            current_index: self.current_index,
            completed_ids: self.completed_ids.clone(),
            statuses: self.statuses.clone(),
            started_at: self.started_at,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeState {
    pub practice_session_id: String,
    pub practice_type: PracticeType,
    #[serde(default)]
    pub current_index: i64,
    #[serde(default)]
    pub questions: Vec<PracticeQuestion>,
    #[serde(default)]
    pub answers: Vec<Value>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Stored as a bare JSON object; the row's session type says which variant
/// it holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SessionState {
    Flashcard(FlashcardState),
    Practice(PracticeState),
}

impl SessionState {
    pub fn decode(session_type: SessionType, raw: &str) -> serde_json::Result<Self> {
        Ok(match session_type {
            SessionType::FlashcardStudy => Self::Flashcard(serde_json::from_str(raw)?),
            SessionType::Practice => Self::Practice(serde_json::from_str(raw)?),
        })
    }

    pub fn session_type(&self) -> SessionType {
        match self {
            Self::Flashcard(_) => SessionType::FlashcardStudy,
            Self::Practice(_) => SessionType::Practice,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Flashcard(state) => state.started_at,
            Self::Practice(state) => state.started_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningSession {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub session_type: SessionType,
    pub state: SessionState,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    pub id: String,
    pub state: FlashcardState,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStart {
    pub session: SessionHandle,
    pub resumed: bool,
}

pub async fn start_or_resume_flashcard_session(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
) -> ServiceResult<SessionStart> {
    let plan = plan::get_plan(pool, user_id, plan_id).await?;

    if let Some(existing) = find_active(pool, user_id, Some(&plan.id), SessionType::FlashcardStudy).await? {
        return Ok(resumed(existing));
    }

    let state = SessionState::Flashcard(FlashcardState::fresh(now()));
    let inserted = {
        let mut conn = pool.acquire().await?;
        insert_session(&mut *conn, user_id, &plan.id, state).await?
    };
    match inserted {
        Some(session) => {
            tracing::info!(session_id = %session.id, plan_id = %plan.id, "flashcard session started");
            let state = match session.state {
                SessionState::Flashcard(state) => state,
                SessionState::Practice(_) => FlashcardState::default(),
            };
            Ok(SessionStart {
                session: SessionHandle { id: session.id, state },
                resumed: false,
            })
        }
        None => {
            // Lost the race to a concurrent start; hand back the winner.
            let existing = find_active(pool, user_id, Some(&plan.id), SessionType::FlashcardStudy)
                .await?
                .ok_or_else(|| ServiceError::Conflict("session start raced with session end".to_string()))?;
            Ok(resumed(existing))
        }
    }
}

fn resumed(session: LearningSession) -> SessionStart {
    let state = match &session.state {
        SessionState::Flashcard(state) => state.condensed(),
        SessionState::Practice(_) => FlashcardState::default(),
    };
    SessionStart {
        session: SessionHandle { id: session.id, state },
        resumed: true,
    }
}

pub async fn get_flashcard_session(pool: &SqlitePool, user_id: &str, plan_id: &str) -> ServiceResult<LearningSession> {
    let plan = plan::get_plan(pool, user_id, plan_id).await?;
    find_active(pool, user_id, Some(&plan.id), SessionType::FlashcardStudy)
        .await?
        .ok_or_else(|| ServiceError::not_found("No active session found."))
}

/// Replaces the flashcard state wholesale.
pub async fn patch_flashcard_state(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
    state: FlashcardState,
) -> ServiceResult<LearningSession> {
    let mut session = get_flashcard_session(pool, user_id, plan_id).await?;
    session.state = SessionState::Flashcard(state);
    session.last_activity_at = now();
    save_state(pool, &session).await?;
    Ok(session)
}

pub async fn end_session(pool: &SqlitePool, user_id: &str, plan_id: &str) -> ServiceResult<LearningSession> {
    let mut session = get_flashcard_session(pool, user_id, plan_id).await?;
    let ended_at = now();

    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"UPDATE "learning_sessions" SET "isActive" = 0, "completedAt" = ?
           WHERE "id" = ? AND "isActive" = 1"#,
    )
    .bind(ended_at)
    .bind(&session.id)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("No active session found."));
    }

    let minutes = session
        .state
        .started_at()
        .map(|started| (ended_at - started).num_minutes().max(0))
        .unwrap_or(0);
    if session.state.started_at().is_some() {
        progress::add_activity(&mut *tx, user_id, &session.plan_id, today(), 0, minutes).await?;
    }
    tx.commit().await?;

    tracing::info!(session_id = %session.id, minutes, "flashcard session ended");

    session.is_active = false;
    session.completed_at = Some(ended_at);
    Ok(session)
}

/// Inserts an active session. Returns `None` when one is already active for
/// the same (user, plan, type).
pub(crate) async fn insert_session(
    conn: &mut SqliteConnection,
    user_id: &str,
    plan_id: &str,
    state: SessionState,
) -> ServiceResult<Option<LearningSession>> {
    let ts = now();
    let session = LearningSession {
        id: new_id(),
        user_id: user_id.to_string(),
        plan_id: plan_id.to_string(),
        session_type: state.session_type(),
        state,
        is_active: true,
        started_at: ts,
        last_activity_at: ts,
        completed_at: None,
    };

    let result = sqlx::query(
        r#"INSERT OR IGNORE INTO "learning_sessions"
           ("id","userId","planId","sessionType","state","isActive","startedAt","lastActivityAt")
           VALUES (?,?,?,?,?,1,?,?)"#,
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.plan_id)
    .bind(session.session_type.as_str())
    .bind(serde_json::to_string(&session.state)?)
    .bind(session.started_at)
    .bind(session.last_activity_at)
    .execute(conn)
    .await?;

    Ok((result.rows_affected() > 0).then_some(session))
}

pub(crate) async fn find_active(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: Option<&str>,
    session_type: SessionType,
) -> ServiceResult<Option<LearningSession>> {
    let row = sqlx::query(
        r#"SELECT "id","userId","planId","sessionType","state","isActive","startedAt","lastActivityAt","completedAt"
           FROM "learning_sessions"
           WHERE "userId" = ?1 AND "sessionType" = ?2 AND "isActive" = 1
             AND (?3 IS NULL OR "planId" = ?3)
           ORDER BY "startedAt" DESC
           LIMIT 1"#,
    )
    .bind(user_id)
    .bind(session_type.as_str())
    .bind(plan_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| map_session_row(&row)).transpose()
}

pub(crate) async fn save_state(pool: &SqlitePool, session: &LearningSession) -> ServiceResult<()> {
    sqlx::query(r#"UPDATE "learning_sessions" SET "state" = ?, "lastActivityAt" = ? WHERE "id" = ?"#)
        .bind(serde_json::to_string(&session.state)?)
        .bind(session.last_activity_at)
        .bind(&session.id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Closes every active practice session the user has, across plans.
pub(crate) async fn deactivate_practice_sessions(
    conn: &mut SqliteConnection,
    user_id: &str,
    completed_at: Option<DateTime<Utc>>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE "learning_sessions" SET "isActive" = 0, "completedAt" = COALESCE(?, "completedAt")
           WHERE "userId" = ? AND "sessionType" = 'practice' AND "isActive" = 1"#,
    )
    .bind(completed_at)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

fn map_session_row(row: &SqliteRow) -> ServiceResult<LearningSession> {
    let session_type = SessionType::from_str(&row.try_get::<String, _>("sessionType")?);
    let raw_state: String = row.try_get("state")?;
    Ok(LearningSession {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        plan_id: row.try_get("planId")?,
        session_type,
        state: SessionState::decode(session_type, &raw_state)?,
        is_active: row.try_get("isActive")?,
        started_at: row.try_get("startedAt")?,
        last_activity_at: row.try_get("lastActivityAt")?,
        completed_at: row.try_get("completedAt")?,
    })
}
