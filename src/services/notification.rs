use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::analytics::RiskLevel;
use super::{new_id, now, ServiceError, ServiceResult};

pub const STREAK_MILESTONES: [i64; 5] = [7, 14, 30, 50, 100];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    StudyReminder,
    ReviewSuggestion,
    RiskAlert,
    Encouragement,
    StreakAchievement,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StudyReminder => "study_reminder",
            Self::ReviewSuggestion => "review_suggestion",
            Self::RiskAlert => "risk_alert",
            Self::Encouragement => "encouragement",
            Self::StreakAchievement => "streak_achievement",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "study_reminder" => Self::StudyReminder,
            "review_suggestion" => Self::ReviewSuggestion,
            "risk_alert" => Self::RiskAlert,
            "streak_achievement" => Self::StreakAchievement,
            _ => Self::Encouragement,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub plan_id: Option<String>,
    pub plan_name: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

/// Inserts unless the row collides with a unique index. Returns whether a
/// row was written.
async fn insert_notification(
    pool: &SqlitePool,
    user_id: &str,
    notification_type: NotificationType,
    title: &str,
    message: &str,
    plan_id: Option<&str>,
    created_on: NaiveDate,
) -> Result<Option<String>, sqlx::Error> {
    let id = new_id();
    let result = sqlx::query(
        r#"INSERT OR IGNORE INTO "notifications"
           ("id","userId","notificationType","title","message","planId","isRead","createdAt","createdOn")
           VALUES (?,?,?,?,?,?,0,?,?)"#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(notification_type.as_str())
    .bind(title)
    .bind(message)
    .bind(plan_id)
    .bind(now())
    .bind(created_on)
    .execute(pool)
    .await?;
    Ok((result.rows_affected() > 0).then_some(id))
}

/// At most one risk alert per (user, plan-or-overall, day). Low risk never
/// alerts.
pub async fn maybe_create_risk_notification(
    pool: &SqlitePool,
    user_id: &str,
    plan_id: Option<&str>,
    risk_level: RiskLevel,
    risk_factors: &[String],
    today: NaiveDate,
) -> ServiceResult<Option<String>> {
    let (title, message) = match risk_level {
        RiskLevel::Low => return Ok(None),
        RiskLevel::High => (
            "Time to get back on track!",
            "You haven't studied in a while. A quick review session can help reinforce what you've learned. Let's get started!",
        ),
        RiskLevel::Medium => (
            "Keep up the momentum!",
            "Don't let your progress slip. Take a few minutes to review some vocabulary today.",
        ),
    };

    let created = insert_notification(
        pool,
        user_id,
        NotificationType::RiskAlert,
        title,
        message,
        plan_id,
        today,
    )
    .await?;

    match &created {
        Some(id) => tracing::info!(
            notification_id = %id,
            user_id,
            plan_id = plan_id.unwrap_or("-"),
            risk_level = risk_level.as_str(),
            factors = ?risk_factors,
            "risk alert created"
        ),
        None => tracing::debug!(user_id, plan_id = plan_id.unwrap_or("-"), "risk alert already sent today"),
    }
    Ok(created)
}

pub async fn create_streak_notification(
    pool: &SqlitePool,
    user_id: &str,
    streak: i64,
    today: NaiveDate,
) -> ServiceResult<Option<String>> {
    if !STREAK_MILESTONES.contains(&streak) {
        return Ok(None);
    }

    let title = format!("{streak}-Day Streak!");
    let message = format!(
        "Congratulations! You've maintained a {streak}-day study streak. Keep up the amazing work!"
    );
    let created = insert_notification(
        pool,
        user_id,
        NotificationType::StreakAchievement,
        &title,
        &message,
        None,
        today,
    )
    .await?;

    if let Some(id) = &created {
        tracing::info!(notification_id = %id, user_id, streak, "streak milestone reached");
    }
    Ok(created)
}

pub async fn list_notifications(pool: &SqlitePool, user_id: &str) -> ServiceResult<Vec<Notification>> {
    let rows = sqlx::query(
        r#"SELECT n."id" AS "id", n."userId" AS "userId", n."notificationType" AS "notificationType",
                  n."title" AS "title", n."message" AS "message", n."planId" AS "planId",
                  p."name" AS "planName", n."isRead" AS "isRead", n."createdAt" AS "createdAt"
           FROM "notifications" n
           LEFT JOIN "learning_plans" p ON p."id" = n."planId"
           WHERE n."userId" = ?
           ORDER BY n."createdAt" DESC"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let items = rows
        .iter()
        .map(map_notification_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub async fn unread_count(pool: &SqlitePool, user_id: &str) -> ServiceResult<UnreadCount> {
    let count: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "notifications" WHERE "userId" = ? AND "isRead" = 0"#)
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(UnreadCount { count })
}

pub async fn mark_read(pool: &SqlitePool, user_id: &str, notification_id: &str) -> ServiceResult<Notification> {
    let result = sqlx::query(r#"UPDATE "notifications" SET "isRead" = 1 WHERE "id" = ? AND "userId" = ?"#)
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("Notification not found."));
    }

    let row = sqlx::query(
        r#"SELECT n."id" AS "id", n."userId" AS "userId", n."notificationType" AS "notificationType",
                  n."title" AS "title", n."message" AS "message", n."planId" AS "planId",
                  p."name" AS "planName", n."isRead" AS "isRead", n."createdAt" AS "createdAt"
           FROM "notifications" n
           LEFT JOIN "learning_plans" p ON p."id" = n."planId"
           WHERE n."id" = ?"#,
    )
    .bind(notification_id)
    .fetch_one(pool)
    .await?;
    Ok(map_notification_row(&row)?)
}

pub async fn mark_all_read(pool: &SqlitePool, user_id: &str) -> ServiceResult<u64> {
    let result = sqlx::query(r#"UPDATE "notifications" SET "isRead" = 1 WHERE "userId" = ? AND "isRead" = 0"#)
        .bind(user_id)
        .execute(pool)
        .await?;
    tracing::debug!(user_id, affected = result.rows_affected(), "notifications marked read");
    Ok(result.rows_affected())
}

fn map_notification_row(row: &SqliteRow) -> Result<Notification, sqlx::Error> {
    let notification_type: String = row.try_get("notificationType")?;
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        notification_type: NotificationType::from_str(&notification_type),
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        plan_id: row.try_get("planId")?,
        plan_name: row.try_get("planName")?,
        is_read: row.try_get("isRead")?,
        created_at: row.try_get("createdAt")?,
    })
}
