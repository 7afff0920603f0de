use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{is_unique_violation, new_id, now, ServiceError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Learner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Learner => "learner",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "admin" => Self::Admin,
            _ => Self::Learner,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

pub async fn create_user(pool: &SqlitePool, username: &str, role: UserRole) -> ServiceResult<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ServiceError::validation("username", "username must not be empty"));
    }

    let user = User {
        id: new_id(),
        username: username.to_string(),
        role,
        created_at: now(),
    };

    sqlx::query(r#"INSERT INTO "users" ("id","username","role","createdAt") VALUES (?,?,?,?)"#)
        .bind(&user.id)
        .bind(&user.username)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::Conflict(format!("username {username} already taken"))
            } else {
                ServiceError::from(err)
            }
        })?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user created");
    Ok(user)
}

pub async fn get_user(pool: &SqlitePool, user_id: &str) -> ServiceResult<Option<User>> {
    let row = sqlx::query(r#"SELECT "id","username","role","createdAt" FROM "users" WHERE "id" = ?"#)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| map_user_row(&row)).transpose()?)
}

pub async fn delete_user(pool: &SqlitePool, user_id: &str) -> ServiceResult<()> {
    let result = sqlx::query(r#"DELETE FROM "users" WHERE "id" = ?"#)
        .bind(user_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("user not found"));
    }
    Ok(())
}

fn map_user_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        role: UserRole::from_str(&role),
        created_at: row.try_get("createdAt")?,
    })
}
