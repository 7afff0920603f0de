use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::plan::{LearningPlan, LearningStatus};
use super::{new_id, now, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Upcoming,
    Completed,
    Missed,
}

impl DayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Completed => "completed",
            Self::Missed => "missed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "missed" => Self::Missed,
            _ => Self::Upcoming,
        }
    }

    /// Status of a scheduled day given what was studied on it.
    pub fn classify(date: NaiveDate, words_studied: i64, planned_words: i64, today: NaiveDate) -> Self {
        if words_studied >= planned_words {
            Self::Completed
        } else if date < today {
            Self::Missed
        } else {
            Self::Upcoming
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyProgress {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub date: NaiveDate,
    pub words_studied: i64,
    pub words_mastered: i64,
    pub words_review_required: i64,
    pub study_time_minutes: i64,
    pub planned_words: i64,
    pub status: DayStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Get-or-create for the (user, plan, date) row. Concurrent callers race on
/// the unique key and all but one insert become no-ops.
pub async fn ensure_day(
    conn: &mut SqliteConnection,
    user_id: &str,
    plan_id: &str,
    date: NaiveDate,
    planned_words: i64,
) -> Result<(), sqlx::Error> {
    let ts = now();
    sqlx::query(
        r#"INSERT INTO "learning_progress"
           ("id","userId","planId","date","plannedWords","status","createdAt","updatedAt")
           VALUES (?,?,?,?,?,'upcoming',?,?)
           ON CONFLICT ("userId","planId","date") DO NOTHING"#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(plan_id)
    .bind(date)
    .bind(planned_words)
    .bind(ts)
    .bind(ts)
    .execute(conn)
    .await?;
    Ok(())
}

/// One reviewed word: bumps today's counters and closes the day once the
/// target is reached.
pub async fn record_review(
    conn: &mut SqliteConnection,
    user_id: &str,
    plan_id: &str,
    date: NaiveDate,
    status: LearningStatus,
    words_per_day: i64,
) -> Result<(), sqlx::Error> {
    ensure_day(conn, user_id, plan_id, date, words_per_day).await?;

    let mastered = i64::from(status == LearningStatus::Mastered);
    let review_required = i64::from(status == LearningStatus::ReviewRequired);

    sqlx::query(
        r#"UPDATE "learning_progress"
           SET "wordsStudied" = "wordsStudied" + 1,
               "wordsMastered" = "wordsMastered" + ?,
               "wordsReviewRequired" = "wordsReviewRequired" + ?,
               "updatedAt" = ?
           WHERE "userId" = ? AND "planId" = ? AND "date" = ?"#,
    )
    .bind(mastered)
    .bind(review_required)
    .bind(now())
    .bind(user_id)
    .bind(plan_id)
    .bind(date)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"UPDATE "learning_progress"
           SET "status" = 'completed'
           WHERE "userId" = ?1 AND "planId" = ?2 AND "date" = ?3
             AND "wordsStudied" >= (CASE WHEN "plannedWords" > 0 THEN "plannedWords" ELSE ?4 END)"#,
    )
    .bind(user_id)
    .bind(plan_id)
    .bind(date)
    .bind(words_per_day)
    .execute(conn)
    .await?;

    Ok(())
}

/// Additive counters for session/practice activity.
pub async fn add_activity(
    conn: &mut SqliteConnection,
    user_id: &str,
    plan_id: &str,
    date: NaiveDate,
    words_studied: i64,
    study_minutes: i64,
) -> Result<(), sqlx::Error> {
    ensure_day(conn, user_id, plan_id, date, 0).await?;

    sqlx::query(
        r#"UPDATE "learning_progress"
           SET "wordsStudied" = "wordsStudied" + ?,
               "studyTimeMinutes" = "studyTimeMinutes" + ?,
               "updatedAt" = ?
           WHERE "userId" = ? AND "planId" = ? AND "date" = ?"#,
    )
    .bind(words_studied.max(0))
    .bind(study_minutes.max(0))
    .bind(now())
    .bind(user_id)
    .bind(plan_id)
    .bind(date)
    .execute(conn)
    .await?;
    Ok(())
}

/// Aligns the plan's progress rows with its date range. Re-running it is a
/// no-op: counters are never touched and rows are only rewritten when their
/// planned words or status actually change.
pub async fn sync_daily_schedule(
    pool: &SqlitePool,
    plan: &LearningPlan,
    words_per_day: i64,
    today: NaiveDate,
) -> ServiceResult<()> {
    let mut tx = pool.begin().await?;

    let pruned = sqlx::query(
        r#"DELETE FROM "learning_progress"
           WHERE "planId" = ? AND ("date" < ? OR "date" > ?)"#,
    )
    .bind(&plan.id)
    .bind(plan.start_date)
    .bind(plan.end_date)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let mut day = plan.start_date;
    while day <= plan.end_date {
        ensure_day(&mut *tx, &plan.user_id, &plan.id, day, words_per_day).await?;
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    let rows = sqlx::query(
        r#"SELECT "id","date","wordsStudied","plannedWords","status"
           FROM "learning_progress" WHERE "planId" = ?"#,
    )
    .bind(&plan.id)
    .fetch_all(&mut *tx)
    .await?;

    let mut updated = 0u64;
    for row in &rows {
        let id: String = row.try_get("id")?;
        let date: NaiveDate = row.try_get("date")?;
        let words_studied: i64 = row.try_get("wordsStudied")?;
        let planned_words: i64 = row.try_get("plannedWords")?;
        let status = DayStatus::from_str(&row.try_get::<String, _>("status")?);

        let next_status = DayStatus::classify(date, words_studied, words_per_day, today);
        if planned_words == words_per_day && status == next_status {
            continue;
        }

        sqlx::query(
            r#"UPDATE "learning_progress"
               SET "plannedWords" = ?, "status" = ?, "updatedAt" = ?
               WHERE "id" = ?"#,
        )
        .bind(words_per_day)
        .bind(next_status.as_str())
        .bind(now())
        .bind(&id)
        .execute(&mut *tx)
        .await?;
        updated += 1;
    }

    tx.commit().await?;

    tracing::debug!(plan_id = %plan.id, pruned, updated, "daily schedule synced");
    Ok(())
}

pub async fn list_progress(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
    days: Option<usize>,
) -> ServiceResult<Vec<DailyProgress>> {
    let rows = sqlx::query(
        r#"SELECT "id","userId","planId","date","wordsStudied","wordsMastered","wordsReviewRequired",
                  "studyTimeMinutes","plannedWords","status","createdAt","updatedAt"
           FROM "learning_progress"
           WHERE "userId" = ? AND "planId" = ?
           ORDER BY "date" ASC"#,
    )
    .bind(user_id)
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    let mut items = rows
        .iter()
        .map(map_progress_row)
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(days) = days {
        let skip = items.len().saturating_sub(days);
        items.drain(..skip);
    }
    Ok(items)
}

pub async fn get_day(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: &str,
    date: NaiveDate,
) -> ServiceResult<Option<DailyProgress>> {
    let row = sqlx::query(
        r#"SELECT "id","userId","planId","date","wordsStudied","wordsMastered","wordsReviewRequired",
                  "studyTimeMinutes","plannedWords","status","createdAt","updatedAt"
           FROM "learning_progress"
           WHERE "userId" = ? AND "planId" = ? AND "date" = ?"#,
    )
    .bind(user_id)
    .bind(plan_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| map_progress_row(&row)).transpose()?)
}

fn map_progress_row(row: &SqliteRow) -> Result<DailyProgress, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(DailyProgress {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        plan_id: row.try_get("planId")?,
        date: row.try_get("date")?,
        words_studied: row.try_get("wordsStudied")?,
        words_mastered: row.try_get("wordsMastered")?,
        words_review_required: row.try_get("wordsReviewRequired")?,
        study_time_minutes: row.try_get("studyTimeMinutes")?,
        planned_words: row.try_get("plannedWords")?,
        status: DayStatus::from_str(&status),
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn classify_completed_wins_over_past() {
        let today = date("2024-03-10");
        assert_eq!(DayStatus::classify(date("2024-03-01"), 5, 5, today), DayStatus::Completed);
        assert_eq!(DayStatus::classify(date("2024-03-01"), 4, 5, today), DayStatus::Missed);
    }

    #[test]
    fn classify_today_and_future_are_upcoming() {
        let today = date("2024-03-10");
        assert_eq!(DayStatus::classify(today, 0, 3, today), DayStatus::Upcoming);
        assert_eq!(DayStatus::classify(date("2024-03-20"), 1, 3, today), DayStatus::Upcoming);
    }
}
