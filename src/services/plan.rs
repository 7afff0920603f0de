use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

use super::progress::{self, DailyProgress};
use super::users::User;
use super::vocabulary::{existing_topic_ids, is_valid_level, map_vocabulary_row, Topic, Vocabulary};
use super::{new_id, now, today, ServiceError, ServiceResult};

const VOCABULARY_PAGE_SIZE: i64 = 20;
const VOCABULARY_MAX_PAGE_SIZE: i64 = 100;
const FLASHCARD_MAX_LIMIT: usize = 200;
/// Longest allowed plan, counted from start to end date.
pub const MAX_PLAN_DAYS: i64 = 730;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Paused,
    Completed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStatus {
    New,
    Learned,
    Mastered,
    ReviewRequired,
}

impl LearningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learned => "learned",
            Self::Mastered => "mastered",
            Self::ReviewRequired => "review_required",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "learned" => Some(Self::Learned),
            "mastered" => Some(Self::Mastered),
            "review_required" => Some(Self::ReviewRequired),
            _ => None,
        }
    }

    fn from_db(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::New)
    }

    /// Statuses a flashcard deck draws from when no filter is given.
    pub const STUDY_DECK: [LearningStatus; 3] = [Self::New, Self::ReviewRequired, Self::Learned];
}

#[derive(Debug, Clone, Serialize)]
pub struct LearningPlan {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_study_time: i64,
    pub status: PlanStatus,
    pub selected_levels: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LearningPlan {
    pub fn total_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    pub fn words_per_day(&self, snapshot_count: i64) -> i64 {
        let total_days = self.total_days();
        if total_days > 0 {
            (snapshot_count / total_days).max(1)
        } else {
            snapshot_count
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: LearningPlan,
    pub selected_topics: Vec<Topic>,
    pub vocabulary_count: i64,
    pub progress_summary: BTreeMap<String, i64>,
    pub total_days: i64,
    pub words_per_day: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlanInput {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_study_time: i64,
    #[serde(default)]
    pub topic_ids: Vec<String>,
    #[serde(default)]
    pub selected_levels: Vec<String>,
}

/// Fields a learner may change on an existing plan. Anything else in the
/// request body is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub daily_study_time: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanVocabularyItem {
    pub id: String,
    pub vocabulary: Vocabulary,
    pub status: LearningStatus,
    pub user_note: Option<String>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub review_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VocabularyPage {
    pub count: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<PlanVocabularyItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Flashcard {
    pub id: String,
    pub vocabulary_id: String,
    pub word: String,
    pub meaning: String,
    pub meaning_vi: Option<String>,
    pub phonetics: Option<String>,
    pub word_type: Option<String>,
    pub example_sentence: Option<String>,
    pub level: Option<String>,
    pub status: LearningStatus,
    pub user_note: Option<String>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub review_count: i64,
}

impl From<PlanVocabularyItem> for Flashcard {
    fn from(item: PlanVocabularyItem) -> Self {
        let v = item.vocabulary;
        Self {
            id: item.id,
            vocabulary_id: v.id,
            word: v.word,
            meaning: v.meaning,
            meaning_vi: v.meaning_vi,
            phonetics: v.phonetics,
            word_type: v.word_type,
            example_sentence: v.example_sentence,
            level: v.level,
            status: item.status,
            user_note: item.user_note,
            last_reviewed_at: item.last_reviewed_at,
            review_count: item.review_count,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VocabularyQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct FlashcardQuery {
    pub status: Option<String>,
    pub shuffle: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub user_note: Option<String>,
}

fn validate_dates(start: NaiveDate, end: NaiveDate) -> ServiceResult<()> {
    if end <= start {
        return Err(ServiceError::validation("end_date", "End date must be after start date."));
    }
    if (end - start).num_days() >= MAX_PLAN_DAYS {
        return Err(ServiceError::validation(
            "end_date",
            format!("A plan may span at most {MAX_PLAN_DAYS} days."),
        ));
    }
    Ok(())
}

fn parse_status_filter(status: Option<&str>) -> ServiceResult<Option<LearningStatus>> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => LearningStatus::parse(raw)
            .map(Some)
            .ok_or_else(|| ServiceError::validation("status", format!("unknown status {raw}"))),
    }
}

pub async fn create_plan(pool: &SqlitePool, user: &User, input: CreatePlanInput) -> ServiceResult<PlanDetail> {
    validate_dates(input.start_date, input.end_date)?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(ServiceError::validation("name", "name must not be empty"));
    }
    if input.daily_study_time < 0 {
        return Err(ServiceError::validation("daily_study_time", "must not be negative"));
    }
    if input.selected_levels.is_empty() {
        return Err(ServiceError::validation("selected_levels", "select at least one level"));
    }
    if let Some(bad) = input.selected_levels.iter().find(|level| !is_valid_level(level)) {
        return Err(ServiceError::validation("selected_levels", format!("unknown level {bad}")));
    }

    let mut levels: Vec<String> = Vec::with_capacity(input.selected_levels.len());
    for level in input.selected_levels {
        if !levels.contains(&level) {
            levels.push(level);
        }
    }

    let topic_ids = existing_topic_ids(pool, &input.topic_ids).await?;

    let ts = now();
    let plan = LearningPlan {
        id: new_id(),
        user_id: user.id.clone(),
        name: name.to_string(),
        start_date: input.start_date,
        end_date: input.end_date,
        daily_study_time: input.daily_study_time,
        status: PlanStatus::Active,
        selected_levels: levels,
        created_at: ts,
        updated_at: ts,
    };

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"INSERT INTO "learning_plans"
           ("id","userId","name","startDate","endDate","dailyStudyTime","status","selectedLevels","createdAt","updatedAt")
           VALUES (?,?,?,?,?,?,?,?,?,?)"#,
    )
    .bind(&plan.id)
    .bind(&plan.user_id)
    .bind(&plan.name)
    .bind(plan.start_date)
    .bind(plan.end_date)
    .bind(plan.daily_study_time)
    .bind(plan.status.as_str())
    .bind(serde_json::to_string(&plan.selected_levels)?)
    .bind(plan.created_at)
    .bind(plan.updated_at)
    .execute(&mut *tx)
    .await?;

    for topic_id in &topic_ids {
        sqlx::query(r#"INSERT OR IGNORE INTO "learning_plan_topics" ("planId","topicId") VALUES (?,?)"#)
            .bind(&plan.id)
            .bind(topic_id)
            .execute(&mut *tx)
            .await?;
    }

    let snapshot = select_snapshot_vocabulary(&mut *tx, &user.id, &topic_ids, &plan.selected_levels).await?;
    for vocabulary_id in &snapshot {
        sqlx::query(
            r#"INSERT INTO "learning_plan_vocabulary" ("id","planId","vocabularyId","status","reviewCount")
               VALUES (?,?,?,'new',0)"#,
        )
        .bind(new_id())
        .bind(&plan.id)
        .bind(vocabulary_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        plan_id = %plan.id,
        user_id = %user.id,
        topics = topic_ids.len(),
        snapshot = snapshot.len(),
        "learning plan created"
    );

    build_detail(pool, plan).await
}

/// System vocabulary plus the learner's own words, tagged with any selected
/// topic and at a selected level.
async fn select_snapshot_vocabulary(
    conn: &mut SqliteConnection,
    user_id: &str,
    topic_ids: &[String],
    levels: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    if topic_ids.is_empty() || levels.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"SELECT DISTINCT v."id" AS "id"
           FROM "vocabularies" v
           JOIN "vocabulary_topics" vt ON vt."vocabularyId" = v."id"
           WHERE (v."isSystem" = 1 OR v."ownerId" = "#,
    );
    qb.push_bind(user_id);
    qb.push(r#") AND vt."topicId" IN ("#);
    {
        let mut sep = qb.separated(", ");
        for id in topic_ids {
            sep.push_bind(id);
        }
    }
    qb.push(r#") AND v."level" IN ("#);
    {
        let mut sep = qb.separated(", ");
        for level in levels {
            sep.push_bind(level);
        }
    }
    qb.push(r#") ORDER BY v."id""#);

    let rows = qb.build().fetch_all(&mut *conn).await?;
    let mut seen = HashSet::with_capacity(rows.len());
    let mut ids = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.try_get("id")?;
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    Ok(ids)
}

pub async fn get_plan(pool: &SqlitePool, user_id: &str, plan_id: &str) -> ServiceResult<LearningPlan> {
    let row = sqlx::query(
        r#"SELECT "id","userId","name","startDate","endDate","dailyStudyTime","status","selectedLevels","createdAt","updatedAt"
           FROM "learning_plans" WHERE "id" = ? AND "userId" = ?"#,
    )
    .bind(plan_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => map_plan_row(&row),
        None => Err(ServiceError::not_found("Learning plan not found.")),
    }
}

pub async fn plan_detail(pool: &SqlitePool, user_id: &str, plan_id: &str) -> ServiceResult<PlanDetail> {
    let plan = get_plan(pool, user_id, plan_id).await?;
    build_detail(pool, plan).await
}

pub async fn list_plans(pool: &SqlitePool, user_id: &str, status: Option<&str>) -> ServiceResult<Vec<PlanDetail>> {
    let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(
            PlanStatus::parse(raw)
                .ok_or_else(|| ServiceError::validation("status", format!("unknown plan status {raw}")))?,
        ),
    };

    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"SELECT "id","userId","name","startDate","endDate","dailyStudyTime","status","selectedLevels","createdAt","updatedAt"
           FROM "learning_plans" WHERE "userId" = "#,
    );
    qb.push_bind(user_id);
    if let Some(status) = status {
        qb.push(r#" AND "status" = "#);
        qb.push_bind(status.as_str());
    }
    qb.push(r#" ORDER BY "createdAt" DESC"#);

    let rows = qb.build().fetch_all(pool).await?;
    let mut plans = Vec::with_capacity(rows.len());
    for row in &rows {
        let plan = map_plan_row(row)?;
        plans.push(build_detail(pool, plan).await?);
    }
    Ok(plans)
}

pub async fn update_plan(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
    patch: PlanPatch,
) -> ServiceResult<PlanDetail> {
    let mut plan = get_plan(pool, user_id, plan_id).await?;

    if let Some(name) = patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("name", "name must not be empty"));
        }
        plan.name = name.to_string();
    }
    if let Some(start_date) = patch.start_date {
        plan.start_date = start_date;
    }
    if let Some(end_date) = patch.end_date {
        plan.end_date = end_date;
    }
    validate_dates(plan.start_date, plan.end_date)?;
    if let Some(minutes) = patch.daily_study_time {
        if minutes < 0 {
            return Err(ServiceError::validation("daily_study_time", "must not be negative"));
        }
        plan.daily_study_time = minutes;
    }
    if let Some(raw) = patch.status {
        plan.status = PlanStatus::parse(&raw)
            .ok_or_else(|| ServiceError::validation("status", format!("unknown plan status {raw}")))?;
    }
    plan.updated_at = now();

    sqlx::query(
        r#"UPDATE "learning_plans"
           SET "name" = ?, "startDate" = ?, "endDate" = ?, "dailyStudyTime" = ?, "status" = ?, "updatedAt" = ?
           WHERE "id" = ?"#,
    )
    .bind(&plan.name)
    .bind(plan.start_date)
    .bind(plan.end_date)
    .bind(plan.daily_study_time)
    .bind(plan.status.as_str())
    .bind(plan.updated_at)
    .bind(&plan.id)
    .execute(pool)
    .await?;

    let words_per_day = plan.words_per_day(snapshot_count(pool, &plan.id).await?);
    progress::sync_daily_schedule(pool, &plan, words_per_day, today()).await?;

    tracing::info!(plan_id = %plan.id, status = plan.status.as_str(), "learning plan updated");
    build_detail(pool, plan).await
}

pub async fn delete_plan(pool: &SqlitePool, user_id: &str, plan_id: &str) -> ServiceResult<()> {
    let result = sqlx::query(r#"DELETE FROM "learning_plans" WHERE "id" = ? AND "userId" = ?"#)
        .bind(plan_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("Learning plan not found."));
    }
    tracing::info!(plan_id, user_id, "learning plan deleted");
    Ok(())
}

pub async fn snapshot_count(pool: &SqlitePool, plan_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "learning_plan_vocabulary" WHERE "planId" = ?"#)
        .bind(plan_id)
        .fetch_one(pool)
        .await
}

pub async fn status_counts(pool: &SqlitePool, plan_id: &str) -> Result<BTreeMap<String, i64>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT "status", COUNT(*) AS "count" FROM "learning_plan_vocabulary"
           WHERE "planId" = ? GROUP BY "status""#,
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    let mut counts = BTreeMap::new();
    for row in &rows {
        counts.insert(row.try_get::<String, _>("status")?, row.try_get::<i64, _>("count")?);
    }
    Ok(counts)
}

async fn plan_topics(pool: &SqlitePool, plan_id: &str) -> Result<Vec<Topic>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT t."id" AS "id", t."name" AS "name", t."description" AS "description", t."createdAt" AS "createdAt"
           FROM "topics" t JOIN "learning_plan_topics" pt ON pt."topicId" = t."id"
           WHERE pt."planId" = ? ORDER BY t."name""#,
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(Topic {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                description: row.try_get("description")?,
                created_at: row.try_get("createdAt")?,
            })
        })
        .collect()
}

async fn build_detail(pool: &SqlitePool, plan: LearningPlan) -> ServiceResult<PlanDetail> {
    let vocabulary_count = snapshot_count(pool, &plan.id).await?;
    let progress_summary = status_counts(pool, &plan.id).await?;
    let selected_topics = plan_topics(pool, &plan.id).await?;
    Ok(PlanDetail {
        total_days: plan.total_days(),
        words_per_day: plan.words_per_day(vocabulary_count),
        plan,
        selected_topics,
        vocabulary_count,
        progress_summary,
    })
}

pub async fn list_plan_vocabulary(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
    query: VocabularyQuery,
) -> ServiceResult<VocabularyPage> {
    let plan = get_plan(pool, user_id, plan_id).await?;
    let status = parse_status_filter(query.status.as_deref())?;
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(VOCABULARY_PAGE_SIZE)
        .clamp(1, VOCABULARY_MAX_PAGE_SIZE);
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| ServiceError::validation("page", "page is out of range"))?;

    let mut count_qb = QueryBuilder::<Sqlite>::new(
        r#"SELECT COUNT(*) FROM "learning_plan_vocabulary" pv
           JOIN "vocabularies" v ON v."id" = pv."vocabularyId"
           WHERE pv."planId" = "#,
    );
    count_qb.push_bind(&plan.id);
    push_vocabulary_filters(&mut count_qb, status, search.as_deref());
    let count: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = plan_vocabulary_select(&plan.id);
    push_vocabulary_filters(&mut qb, status, search.as_deref());
    qb.push(r#" ORDER BY v."word" ASC LIMIT "#);
    qb.push_bind(page_size);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb.build().fetch_all(pool).await?;
    let results = rows
        .iter()
        .map(map_plan_vocabulary_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(VocabularyPage {
        count,
        page,
        page_size,
        results,
    })
}

pub async fn get_flashcards(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
    query: FlashcardQuery,
) -> ServiceResult<Vec<Flashcard>> {
    let plan = get_plan(pool, user_id, plan_id).await?;
    let status = parse_status_filter(query.status.as_deref())?;

    let mut qb = plan_vocabulary_select(&plan.id);
    match status {
        Some(status) => {
            qb.push(r#" AND pv."status" = "#);
            qb.push_bind(status.as_str());
        }
        None => {
            qb.push(r#" AND pv."status" IN ("#);
            let mut sep = qb.separated(", ");
            for status in LearningStatus::STUDY_DECK {
                sep.push_bind(status.as_str());
            }
            sep.push_unseparated(")");
        }
    }
    qb.push(r#" ORDER BY v."word" ASC"#);
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit.min(FLASHCARD_MAX_LIMIT) as i64);
    }

    let rows = qb.build().fetch_all(pool).await?;
    let mut cards = rows
        .iter()
        .map(|row| map_plan_vocabulary_row(row).map(Flashcard::from))
        .collect::<Result<Vec<_>, _>>()?;

    if query.shuffle {
        cards.shuffle(&mut rand::rng());
    }
    Ok(cards)
}

pub async fn update_vocabulary_status(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
    vocabulary_id: &str,
    update: StatusUpdate,
) -> ServiceResult<Flashcard> {
    let plan = get_plan(pool, user_id, plan_id).await?;
    let status = LearningStatus::parse(update.status.trim())
        .ok_or_else(|| ServiceError::validation("status", format!("unknown status {}", update.status)))?;
    let words_per_day = plan.words_per_day(snapshot_count(pool, &plan.id).await?);

    let mut tx = pool.begin().await?;
    let found = apply_review(&mut *tx, &plan.id, vocabulary_id, status, update.user_note.as_deref()).await?;
    if !found {
        return Err(ServiceError::not_found("Vocabulary not found in this plan."));
    }
    progress::record_review(&mut *tx, user_id, &plan.id, today(), status, words_per_day).await?;
    tx.commit().await?;

    tracing::debug!(plan_id = %plan.id, vocabulary_id, status = status.as_str(), "vocabulary status updated");

    let mut qb = plan_vocabulary_select(&plan.id);
    qb.push(r#" AND pv."vocabularyId" = "#);
    qb.push_bind(vocabulary_id);
    let row = qb.build().fetch_one(pool).await?;
    Ok(Flashcard::from(map_plan_vocabulary_row(&row)?))
}

/// Stamps one review on a plan entry. Returns `false` when the vocabulary is
/// not part of the plan.
pub(crate) async fn apply_review(
    conn: &mut SqliteConnection,
    plan_id: &str,
    vocabulary_id: &str,
    status: LearningStatus,
    user_note: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE "learning_plan_vocabulary"
           SET "status" = ?, "userNote" = COALESCE(?, "userNote"), "lastReviewedAt" = ?, "reviewCount" = "reviewCount" + 1
           WHERE "planId" = ? AND "vocabularyId" = ?"#,
    )
    .bind(status.as_str())
    .bind(user_note)
    .bind(now())
    .bind(plan_id)
    .bind(vocabulary_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn plan_vocabulary(pool: &SqlitePool, plan_id: &str) -> Result<Vec<PlanVocabularyItem>, sqlx::Error> {
    let mut qb = plan_vocabulary_select(plan_id);
    qb.push(r#" ORDER BY v."word" ASC"#);
    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(map_plan_vocabulary_row).collect()
}

pub async fn get_daily_progress(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
    days: Option<usize>,
) -> ServiceResult<Vec<DailyProgress>> {
    let plan = get_plan(pool, user_id, plan_id).await?;
    let words_per_day = plan.words_per_day(snapshot_count(pool, &plan.id).await?);
    progress::sync_daily_schedule(pool, &plan, words_per_day, today()).await?;
    progress::list_progress(pool, user_id, &plan.id, days).await
}

fn plan_vocabulary_select(plan_id: &str) -> QueryBuilder<'_, Sqlite> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"SELECT pv."id" AS "entryId", pv."status" AS "status", pv."userNote" AS "userNote",
                  pv."lastReviewedAt" AS "lastReviewedAt", pv."reviewCount" AS "reviewCount",
                  v."id" AS "id", v."word" AS "word", v."meaning" AS "meaning", v."meaningVi" AS "meaningVi",
                  v."phonetics" AS "phonetics", v."wordType" AS "wordType", v."exampleSentence" AS "exampleSentence",
                  v."level" AS "level", v."isSystem" AS "isSystem", v."ownerId" AS "ownerId", v."createdAt" AS "createdAt"
           FROM "learning_plan_vocabulary" pv
           JOIN "vocabularies" v ON v."id" = pv."vocabularyId"
           WHERE pv."planId" = "#,
    );
    qb.push_bind(plan_id);
    qb
}

fn push_vocabulary_filters<'a>(
    qb: &mut QueryBuilder<'a, Sqlite>,
    status: Option<LearningStatus>,
    search: Option<&'a str>,
) {
    if let Some(status) = status {
        qb.push(r#" AND pv."status" = "#);
        qb.push_bind(status.as_str());
    }
    if let Some(pattern) = search {
        qb.push(r#" AND (v."word" LIKE "#);
        qb.push_bind(pattern);
        qb.push(r#" ESCAPE '\' OR v."meaning" LIKE "#);
        qb.push_bind(pattern);
        qb.push(r#" ESCAPE '\')"#);
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn map_plan_row(row: &SqliteRow) -> ServiceResult<LearningPlan> {
    let status: String = row.try_get("status")?;
    let levels: String = row.try_get("selectedLevels")?;
    Ok(LearningPlan {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        name: row.try_get("name")?,
        start_date: row.try_get("startDate")?,
        end_date: row.try_get("endDate")?,
        daily_study_time: row.try_get("dailyStudyTime")?,
        status: PlanStatus::parse(&status).unwrap_or(PlanStatus::Active),
        selected_levels: serde_json::from_str(&levels)?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

fn map_plan_vocabulary_row(row: &SqliteRow) -> Result<PlanVocabularyItem, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(PlanVocabularyItem {
        id: row.try_get("entryId")?,
        vocabulary: map_vocabulary_row(row)?,
        status: LearningStatus::from_db(&status),
        user_note: row.try_get("userNote")?,
        last_reviewed_at: row.try_get("lastReviewedAt")?,
        review_count: row.try_get("reviewCount")?,
    })
}
