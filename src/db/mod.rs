//! SQLite persistence for stories, chapters and recovery codes.

mod chapters;
mod migrations;
mod recovery;
mod stories;

use crate::models::{Chapter, NewChapter};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// Read-then-write transactions take the write lock up front. A deferred one
// cannot upgrade its read lock while another writer holds the database.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("story {0} not found")]
    StoryNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Where chapters get persisted. Implementations assign `order` and resolve
/// slug collisions themselves.
pub trait ChapterRepository: Send + Sync {
    fn create_chapter(
        &self,
        chapter: &NewChapter,
    ) -> impl Future<Output = Result<Chapter, StoreError>> + Send;
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        migrations::run_migrations(&db.pool).await?;
        Ok(db)
    }

    /// Single-connection in-memory database; every connection to
    /// `sqlite::memory:` would otherwise see its own empty schema.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        migrations::run_migrations(&db.pool).await?;
        Ok(db)
    }
}
