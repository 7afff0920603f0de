use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::users::User;
use super::{is_unique_violation, new_id, now, ServiceError, ServiceResult};

pub const LEVELS: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

pub fn is_valid_level(level: &str) -> bool {
    LEVELS.contains(&level)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    pub id: String,
    pub word: String,
    pub meaning: String,
    pub meaning_vi: Option<String>,
    pub phonetics: Option<String>,
    pub word_type: Option<String>,
    pub example_sentence: Option<String>,
    pub level: Option<String>,
    pub is_system: bool,
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewVocabulary {
    pub word: String,
    pub meaning: String,
    #[serde(default)]
    pub meaning_vi: Option<String>,
    #[serde(default)]
    pub phonetics: Option<String>,
    #[serde(default)]
    pub word_type: Option<String>,
    #[serde(default)]
    pub example_sentence: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub topic_ids: Vec<String>,
}

pub async fn create_topic(
    pool: &SqlitePool,
    actor: &User,
    name: &str,
    description: Option<&str>,
) -> ServiceResult<Topic> {
    if !actor.is_admin() {
        return Err(ServiceError::Forbidden("only admins can manage topics".to_string()));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::validation("name", "topic name must not be empty"));
    }

    let topic = Topic {
        id: new_id(),
        name: name.to_string(),
        description: description.map(str::to_string),
        created_at: now(),
    };

    sqlx::query(r#"INSERT INTO "topics" ("id","name","description","createdAt") VALUES (?,?,?,?)"#)
        .bind(&topic.id)
        .bind(&topic.name)
        .bind(&topic.description)
        .bind(topic.created_at)
        .execute(pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                ServiceError::Conflict(format!("topic {name} already exists"))
            } else {
                ServiceError::from(err)
            }
        })?;

    Ok(topic)
}

pub async fn list_topics(pool: &SqlitePool) -> ServiceResult<Vec<Topic>> {
    let rows = sqlx::query(r#"SELECT "id","name","description","createdAt" FROM "topics" ORDER BY "name""#)
        .fetch_all(pool)
        .await?;
    let topics = rows
        .iter()
        .map(map_topic_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(topics)
}

/// Returns the subset of `topic_ids` that exist, preserving order and
/// dropping duplicates.
pub async fn existing_topic_ids(pool: &SqlitePool, topic_ids: &[String]) -> ServiceResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut found = Vec::with_capacity(topic_ids.len());
    for topic_id in topic_ids {
        if !seen.insert(topic_id.as_str()) {
            continue;
        }
        let exists: Option<String> = sqlx::query_scalar(r#"SELECT "id" FROM "topics" WHERE "id" = ?"#)
            .bind(topic_id)
            .fetch_optional(pool)
            .await?;
        match exists {
            Some(id) => found.push(id),
            None => tracing::warn!(topic_id = %topic_id, "skipping unknown topic"),
        }
    }
    Ok(found)
}

pub async fn create_vocabulary(pool: &SqlitePool, actor: &User, input: NewVocabulary) -> ServiceResult<Vocabulary> {
    let word = input.word.trim();
    if word.is_empty() {
        return Err(ServiceError::validation("word", "word must not be empty"));
    }
    if input.meaning.trim().is_empty() {
        return Err(ServiceError::validation("meaning", "meaning must not be empty"));
    }
    if let Some(ref level) = input.level {
        if !is_valid_level(level) {
            return Err(ServiceError::validation("level", format!("unknown level {level}")));
        }
    }
    if input.is_system && !actor.is_admin() {
        return Err(ServiceError::Forbidden(
            "only admins can create system vocabulary".to_string(),
        ));
    }

    let topic_ids = existing_topic_ids(pool, &input.topic_ids).await?;

    let vocabulary = Vocabulary {
        id: new_id(),
        word: word.to_string(),
        meaning: input.meaning.trim().to_string(),
        meaning_vi: input.meaning_vi,
        phonetics: input.phonetics,
        word_type: input.word_type,
        example_sentence: input.example_sentence,
        level: input.level,
        is_system: input.is_system,
        owner_id: if input.is_system { None } else { Some(actor.id.clone()) },
        created_at: now(),
    };

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"INSERT INTO "vocabularies"
           ("id","word","meaning","meaningVi","phonetics","wordType","exampleSentence","level","isSystem","ownerId","createdAt")
           VALUES (?,?,?,?,?,?,?,?,?,?,?)"#,
    )
    .bind(&vocabulary.id)
    .bind(&vocabulary.word)
    .bind(&vocabulary.meaning)
    .bind(&vocabulary.meaning_vi)
    .bind(&vocabulary.phonetics)
    .bind(&vocabulary.word_type)
    .bind(&vocabulary.example_sentence)
    .bind(&vocabulary.level)
    .bind(vocabulary.is_system)
    .bind(&vocabulary.owner_id)
    .bind(vocabulary.created_at)
    .execute(&mut *tx)
    .await?;

    for topic_id in &topic_ids {
        sqlx::query(r#"INSERT OR IGNORE INTO "vocabulary_topics" ("vocabularyId","topicId") VALUES (?,?)"#)
            .bind(&vocabulary.id)
            .bind(topic_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    tracing::debug!(vocabulary_id = %vocabulary.id, topics = topic_ids.len(), "vocabulary created");
    Ok(vocabulary)
}

pub async fn get_vocabulary(pool: &SqlitePool, vocabulary_id: &str) -> ServiceResult<Option<Vocabulary>> {
    let row = sqlx::query(
        r#"SELECT "id","word","meaning","meaningVi","phonetics","wordType","exampleSentence","level","isSystem","ownerId","createdAt"
           FROM "vocabularies" WHERE "id" = ?"#,
    )
    .bind(vocabulary_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| map_vocabulary_row(&row)).transpose()?)
}

pub(crate) fn map_vocabulary_row(row: &SqliteRow) -> Result<Vocabulary, sqlx::Error> {
    Ok(Vocabulary {
        id: row.try_get("id")?,
        word: row.try_get("word")?,
        meaning: row.try_get("meaning")?,
        meaning_vi: row.try_get("meaningVi")?,
        phonetics: row.try_get("phonetics")?,
        word_type: row.try_get("wordType")?,
        example_sentence: row.try_get("exampleSentence")?,
        level: row.try_get("level")?,
        is_system: row.try_get("isSystem")?,
        owner_id: row.try_get("ownerId")?,
        created_at: row.try_get("createdAt")?,
    })
}

fn map_topic_row(row: &SqliteRow) -> Result<Topic, sqlx::Error> {
    Ok(Topic {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("createdAt")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_codes_are_cefr() {
        assert!(is_valid_level("A1"));
        assert!(is_valid_level("C2"));
        assert!(!is_valid_level("a1"));
        assert!(!is_valid_level("D1"));
    }
}
