use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::info;

const SCHEMA_VERSION: i32 = 2;

const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    author TEXT,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    id TEXT PRIMARY KEY,
    story_id TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    slug TEXT NOT NULL,
    content TEXT NOT NULL,
    chapter_order INTEGER NOT NULL,
    access_password TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (story_id, slug)
);

CREATE INDEX IF NOT EXISTS idx_chapters_story_order ON chapters(story_id, chapter_order);
"#;

const MIGRATION_V2: &str = r#"
CREATE TABLE IF NOT EXISTS recovery_codes (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    code_hash TEXT NOT NULL,
    used_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recovery_codes_user ON recovery_codes(user_id);
"#;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version = current_version(pool).await?;
    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    info!(current_version, target_version = SCHEMA_VERSION, "Running database migrations");
    for version in (current_version + 1)..=SCHEMA_VERSION {
        let (name, sql) = match version {
            1 => ("stories_and_chapters", MIGRATION_V1),
            2 => ("recovery_codes", MIGRATION_V2),
            _ => unreachable!("no migration for version {version}"),
        };

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(version)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(version, name, "Applied migration");
    }

    Ok(())
}

async fn current_version(pool: &SqlitePool) -> Result<i32, sqlx::Error> {
    let row = sqlx::query("SELECT MAX(version) AS version FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row
        .and_then(|r| r.try_get::<Option<i32>, _>("version").ok().flatten())
        .unwrap_or(0))
}
