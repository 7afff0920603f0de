use std::time::Instant;

use sqlx::SqlitePool;

use crate::db::Database;

#[derive(Clone)]
pub struct AppState {
    db: Database,
    started_at: Instant,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            started_at: Instant::now(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
