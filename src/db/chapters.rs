use super::{BEGIN_WRITE, ChapterRepository, Database, StoreError};
use crate::models::{Chapter, ChapterUpdate, NewChapter};
use crate::utils::slug::{generate_slug, slug_candidate};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

const CHAPTER_COLUMNS: &str = "id, story_id, title, slug, content, chapter_order, access_password, created_at, updated_at";

impl ChapterRepository for Database {
    /// Inserts one chapter. The slug gets a `-2`, `-3`, ... suffix until it is
    /// free within the story, and `order` is the story's current maximum + 1.
    async fn create_chapter(&self, chapter: &NewChapter) -> Result<Chapter, StoreError> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let story_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM stories WHERE id = ?)")
                .bind(&chapter.story_id)
                .fetch_one(&mut *tx)
                .await?;
        if !story_exists {
            return Err(StoreError::StoryNotFound(chapter.story_id.clone()));
        }

        let base = generate_slug(&chapter.title);
        let mut attempt = 1;
        let slug = loop {
            let candidate = slug_candidate(&base, "chapter", attempt);
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM chapters WHERE story_id = ? AND slug = ?)",
            )
            .bind(&chapter.story_id)
            .bind(&candidate)
            .fetch_one(&mut *tx)
            .await?;
            if !taken {
                break candidate;
            }
            attempt += 1;
        };

        let order: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(chapter_order), 0) + 1 FROM chapters WHERE story_id = ?",
        )
        .bind(&chapter.story_id)
        .fetch_one(&mut *tx)
        .await?;

        let now = Utc::now();
        let record = Chapter {
            id: Uuid::new_v4().to_string(),
            story_id: chapter.story_id.clone(),
            title: chapter.title.trim().to_string(),
            slug,
            content: chapter.content.clone(),
            order,
            access_password: chapter.access_password.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO chapters (id, story_id, title, slug, content, chapter_order,
                access_password, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.story_id)
        .bind(&record.title)
        .bind(&record.slug)
        .bind(&record.content)
        .bind(record.order)
        .bind(&record.access_password)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }
}

impl Database {
    pub async fn list_chapters(&self, story_id: &str) -> Result<Vec<Chapter>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE story_id = ? ORDER BY chapter_order"
        ))
        .bind(story_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(chapter_from_row).collect()
    }

    pub async fn get_chapter(&self, id: &str) -> Result<Option<Chapter>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(chapter_from_row).transpose()
    }

    pub async fn get_chapter_by_slug(
        &self,
        story_id: &str,
        slug: &str,
    ) -> Result<Option<Chapter>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE story_id = ? AND slug = ?"
        ))
        .bind(story_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(chapter_from_row).transpose()
    }

    /// Applies the provided fields. The slug and order never change here.
    pub async fn update_chapter(
        &self,
        id: &str,
        update: &ChapterUpdate,
    ) -> Result<Option<Chapter>, sqlx::Error> {
        let Some(mut chapter) = self.get_chapter(id).await? else {
            return Ok(None);
        };

        if let Some(title) = &update.title {
            chapter.title = title.trim().to_string();
        }
        if let Some(content) = &update.content {
            chapter.content = content.clone();
        }
        if let Some(password) = &update.access_password {
            chapter.access_password = password.clone();
        }
        chapter.updated_at = Utc::now();

        sqlx::query(
            r#"
            UPDATE chapters
            SET title = ?, content = ?, access_password = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&chapter.title)
        .bind(&chapter.content)
        .bind(&chapter.access_password)
        .bind(chapter.updated_at)
        .bind(&chapter.id)
        .execute(&self.pool)
        .await?;

        Ok(Some(chapter))
    }

    pub async fn delete_chapter(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chapters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn chapter_from_row(row: &SqliteRow) -> Result<Chapter, sqlx::Error> {
    Ok(Chapter {
        id: row.try_get("id")?,
        story_id: row.try_get("story_id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        content: row.try_get("content")?,
        order: row.try_get("chapter_order")?,
        access_password: row.try_get("access_password")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
