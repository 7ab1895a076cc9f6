use super::{BEGIN_WRITE, Database};
use crate::models::{NewStory, Story};
use crate::utils::slug::{generate_slug, slug_candidate};
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

const STORY_COLUMNS: &str = "id, title, slug, author, description, created_at, updated_at";

impl Database {
    /// Inserts a story under the first free slug derived from its title.
    pub async fn create_story(&self, story: &NewStory) -> Result<Story, sqlx::Error> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await?;

        let base = generate_slug(&story.title);
        let mut attempt = 1;
        let slug = loop {
            let candidate = slug_candidate(&base, "story", attempt);
            let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM stories WHERE slug = ?)")
                .bind(&candidate)
                .fetch_one(&mut *tx)
                .await?;
            if !taken {
                break candidate;
            }
            attempt += 1;
        };

        let now = Utc::now();
        let record = Story {
            id: Uuid::new_v4().to_string(),
            title: story.title.trim().to_string(),
            slug,
            author: story.author.clone(),
            description: story.description.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO stories (id, title, slug, author, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.slug)
        .bind(&record.author)
        .bind(&record.description)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn list_stories(&self) -> Result<Vec<Story>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {STORY_COLUMNS} FROM stories ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(story_from_row).collect()
    }

    pub async fn get_story(&self, id: &str) -> Result<Option<Story>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(story_from_row).transpose()
    }

    pub async fn get_story_by_slug(&self, slug: &str) -> Result<Option<Story>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {STORY_COLUMNS} FROM stories WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(story_from_row).transpose()
    }
}

fn story_from_row(row: &SqliteRow) -> Result<Story, sqlx::Error> {
    Ok(Story {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        author: row.try_get("author")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use crate::db::Database;
    use crate::models::NewStory;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn story(title: &str) -> NewStory {
        NewStory {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn story_slugs_are_unique() {
        let db = Database::in_memory().await.unwrap();

        let first = db.create_story(&story("Đêm Trắng")).await.unwrap();
        let second = db.create_story(&story("Dem trang")).await.unwrap();
        let third = db.create_story(&story("第一")).await.unwrap();

        assert_eq!(first.slug, "dem-trang");
        assert_eq!(second.slug, "dem-trang-2");
        assert_eq!(third.slug, "story");
    }

    #[tokio::test]
    async fn finds_story_by_id_and_slug() {
        let db = Database::in_memory().await.unwrap();
        let created = db.create_story(&story("Hành Trình")).await.unwrap();

        let by_id = db.get_story(&created.id).await.unwrap().unwrap();
        let by_slug = db.get_story_by_slug("hanh-trinh").await.unwrap().unwrap();
        assert_eq!(by_id, created);
        assert_eq!(by_slug, created);
        assert!(db.get_story("missing").await.unwrap().is_none());
        assert_eq!(db.list_stories().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_same_title_stories_get_distinct_slugs() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("novelhub.db").display());
        let db = Database::connect(&url).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { db.create_story(&story("Đêm Trắng")).await })
            })
            .collect();

        let mut slugs = HashSet::new();
        for handle in handles {
            slugs.insert(handle.await.unwrap().unwrap().slug);
        }
        assert_eq!(slugs.len(), 10);
        assert!(slugs.contains("dem-trang"));
        assert!(slugs.contains("dem-trang-10"));
    }
}
