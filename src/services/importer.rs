use crate::db::{ChapterRepository, StoreError};
use crate::models::{Chapter, ImportChapter, NewChapter};
use crate::services::sanitizer::sanitize_html;
use thiserror::Error;

/// A batch that stopped part-way. Chapters in `created` stay persisted.
#[derive(Error, Debug)]
#[error("failed to save chapter \"{title}\": {source}")]
pub struct ImportError {
    pub title: String,
    #[source]
    pub source: StoreError,
    pub created: Vec<Chapter>,
}

/// Persists a confirmed batch one chapter at a time.
///
/// Each create call completes before the next one starts, so the order the
/// repository assigns follows the batch order. There is no transaction over
/// the batch: the first failure stops the run and earlier chapters remain.
pub async fn import_chapters<R: ChapterRepository>(
    repo: &R,
    story_id: &str,
    chapters: Vec<ImportChapter>,
) -> Result<Vec<Chapter>, ImportError> {
    let total = chapters.len();
    let mut created = Vec::with_capacity(total);

    for (idx, chapter) in chapters.into_iter().enumerate() {
        let new_chapter = NewChapter {
            content: sanitize_html(&chapter.content),
            title: chapter.title,
            story_id: story_id.to_string(),
            access_password: chapter.access_password,
        };

        let result = repo.create_chapter(&new_chapter).await;
        match result {
            Ok(saved) => {
                tracing::info!(
                    story_id,
                    chapter = idx + 1,
                    total,
                    order = saved.order,
                    slug = %saved.slug,
                    "Imported chapter"
                );
                created.push(saved);
            }
            Err(source) => {
                tracing::error!(
                    story_id,
                    chapter = idx + 1,
                    total,
                    title = %new_chapter.title,
                    error = %source,
                    "Chapter import failed, keeping {} saved chapters",
                    created.len()
                );
                return Err(ImportError {
                    title: new_chapter.title,
                    source,
                    created,
                });
            }
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::NewStory;
    use rand::Rng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps a random amount before delegating, and can fail on one call.
    struct SlowRepository {
        inner: Database,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    impl SlowRepository {
        fn new(inner: Database, fail_on_call: Option<usize>) -> Self {
            Self {
                inner,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                fail_on_call,
            }
        }
    }

    impl ChapterRepository for SlowRepository {
        async fn create_chapter(&self, chapter: &NewChapter) -> Result<Chapter, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(concurrent, 1, "create calls overlapped");

            let delay = rand::thread_rng().gen_range(0..40);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            let result = if self.fail_on_call == Some(call) {
                Err(StoreError::Database(sqlx::Error::PoolTimedOut))
            } else {
                self.inner.create_chapter(chapter).await
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    async fn story(db: &Database) -> String {
        db.create_story(&NewStory {
            title: "Tuyển Tập".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
    }

    fn batch(n: usize) -> Vec<ImportChapter> {
        (1..=n)
            .map(|i| ImportChapter {
                title: format!("Chương {i}"),
                content: format!("<h1>Chương {i}</h1><p onclick=\"x()\">body {i}</p>"),
                access_password: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn sequential_import_keeps_contiguous_order_under_latency() {
        let db = Database::in_memory().await.unwrap();
        let story_id = story(&db).await;
        let repo = SlowRepository::new(db.clone(), None);

        let created = import_chapters(&repo, &story_id, batch(5)).await.unwrap();
        assert_eq!(created.len(), 5);

        let persisted = db.list_chapters(&story_id).await.unwrap();
        let orders: Vec<i64> = persisted.iter().map(|c| c.order).collect();
        let titles: Vec<&str> = persisted.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5]);
        assert_eq!(titles, vec!["Chương 1", "Chương 2", "Chương 3", "Chương 4", "Chương 5"]);
        assert!(persisted.iter().all(|c| !c.content.contains("onclick")));
    }

    #[tokio::test]
    async fn failure_stops_batch_and_keeps_saved_chapters() {
        let db = Database::in_memory().await.unwrap();
        let story_id = story(&db).await;
        let repo = SlowRepository::new(db.clone(), Some(3));

        let err = import_chapters(&repo, &story_id, batch(5)).await.unwrap_err();
        assert_eq!(err.title, "Chương 3");
        assert_eq!(err.created.len(), 2);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("Chương 3"));

        let persisted = db.list_chapters(&story_id).await.unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[1].order, 2);
    }

    #[tokio::test]
    async fn unknown_story_fails_on_first_chapter() {
        let db = Database::in_memory().await.unwrap();
        let err = import_chapters(&db, "missing", batch(2)).await.unwrap_err();

        assert_eq!(err.title, "Chương 1");
        assert!(err.created.is_empty());
        assert!(matches!(err.source, StoreError::StoryNotFound(_)));
    }
}
