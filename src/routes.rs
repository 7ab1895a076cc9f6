use crate::AppState;
use crate::db::ChapterRepository;
use crate::error::ApiError;
use crate::models::{
    Chapter, ChapterSummary, ChapterUpdate, ImportChapter, NewChapter, NewStory, Story,
    UploadResult,
};
use crate::services::sanitizer::sanitize_html;
use crate::services::{chapterizer, converter, importer, recovery};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

const MAX_RECOVERY_CODES: usize = 50;

pub fn api_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    Router::new()
        .nest("/api/v1", api_routes())
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/import/upload", post(upload_document))
        .route("/stories", get(list_stories).post(create_story))
        // `:story` is the slug for reads and the id for imports.
        .route("/stories/:story", get(get_story))
        .route("/stories/:story/import", post(import_story_chapters))
        .route("/stories/:story/chapters/:chapter_slug", get(read_chapter))
        .route("/chapters", post(create_chapter))
        .route("/chapters/:id", put(update_chapter).delete(delete_chapter))
        .route("/users/:user_id/recovery-codes", post(issue_recovery_codes))
        .route("/auth/recover", post(redeem_recovery_code))
}

// ── Import ──

async fn upload_document(mut multipart: Multipart) -> Result<Json<UploadResult>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let Some(extension) = converter::supported_extension(&filename) else {
            return Err(ApiError::BadRequest(format!(
                "'{filename}' is not a Word document, expected one of {}",
                converter::SUPPORTED_EXTENSIONS.join(", ")
            )));
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        tracing::info!(%filename, bytes = data.len(), "Received document upload");

        let chapters = chapterizer::process_document(data.to_vec(), extension.to_string()).await?;
        return Ok(Json(UploadResult {
            success: true,
            chapter_count: chapters.len(),
            chapters,
        }));
    }

    Err(ApiError::BadRequest("no document file in upload".to_string()))
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    chapters: Vec<ImportChapter>,
}

#[derive(Debug, Serialize)]
struct ImportResponse {
    created: usize,
    chapters: Vec<ChapterSummary>,
}

async fn import_story_chapters(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportResponse>, ApiError> {
    state.db.get_story(&story_id).await?.ok_or(ApiError::NotFound)?;
    if let Some(untitled) = req.chapters.iter().position(|c| c.title.trim().is_empty()) {
        return Err(ApiError::BadRequest(format!(
            "chapter {} has an empty title",
            untitled + 1
        )));
    }

    let created = importer::import_chapters(&state.db, &story_id, req.chapters).await?;
    Ok(Json(ImportResponse {
        created: created.len(),
        chapters: created.iter().map(ChapterSummary::from).collect(),
    }))
}

// ── Stories ──

#[derive(Debug, Serialize)]
struct StoryDetail {
    story: Story,
    chapters: Vec<ChapterSummary>,
}

async fn create_story(
    State(state): State<AppState>,
    Json(req): Json<NewStory>,
) -> Result<(StatusCode, Json<Story>), ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    let story = state.db.create_story(&req).await?;
    Ok((StatusCode::CREATED, Json(story)))
}

async fn list_stories(State(state): State<AppState>) -> Result<Json<Vec<Story>>, ApiError> {
    Ok(Json(state.db.list_stories().await?))
}

async fn get_story(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<StoryDetail>, ApiError> {
    let story = state
        .db
        .get_story_by_slug(&slug)
        .await?
        .ok_or(ApiError::NotFound)?;
    let chapters = state.db.list_chapters(&story.id).await?;

    Ok(Json(StoryDetail {
        story,
        chapters: chapters.iter().map(ChapterSummary::from).collect(),
    }))
}

// ── Chapters ──

#[derive(Debug, Deserialize)]
struct ReadQuery {
    password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChapterView {
    id: String,
    story_id: String,
    title: String,
    slug: String,
    content: String,
    order: i64,
    previous: Option<ChapterSummary>,
    next: Option<ChapterSummary>,
}

async fn create_chapter(
    State(state): State<AppState>,
    Json(req): Json<NewChapter>,
) -> Result<(StatusCode, Json<Chapter>), ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }
    let chapter = NewChapter {
        content: sanitize_html(&req.content),
        ..req
    };
    let created = state.db.create_chapter(&chapter).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_chapter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut req): Json<ChapterUpdate>,
) -> Result<Json<Chapter>, ApiError> {
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("title cannot be empty".to_string()));
    }
    req.content = req.content.as_deref().map(sanitize_html);

    let updated = state
        .db
        .update_chapter(&id, &req)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(updated))
}

async fn delete_chapter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.db.delete_chapter(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

async fn read_chapter(
    State(state): State<AppState>,
    Path((slug, chapter_slug)): Path<(String, String)>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<ChapterView>, ApiError> {
    let story = state
        .db
        .get_story_by_slug(&slug)
        .await?
        .ok_or(ApiError::NotFound)?;
    let chapter = state
        .db
        .get_chapter_by_slug(&story.id, &chapter_slug)
        .await?
        .ok_or(ApiError::NotFound)?;

    if let Some(expected) = &chapter.access_password {
        if query.password.as_ref() != Some(expected) {
            return Err(ApiError::Forbidden);
        }
    }

    let chapters = state.db.list_chapters(&story.id).await?;
    let idx = chapters
        .iter()
        .position(|c| c.id == chapter.id)
        .ok_or(ApiError::NotFound)?;

    Ok(Json(ChapterView {
        id: chapter.id.clone(),
        story_id: chapter.story_id.clone(),
        title: chapter.title.clone(),
        slug: chapter.slug.clone(),
        content: sanitize_html(&chapter.content),
        order: chapter.order,
        previous: idx.checked_sub(1).map(|i| ChapterSummary::from(&chapters[i])),
        next: chapters.get(idx + 1).map(ChapterSummary::from),
    }))
}

// ── Recovery codes ──

#[derive(Debug, Default, Deserialize)]
struct IssueCodesRequest {
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecoverRequest {
    user_id: String,
    code: String,
}

async fn issue_recovery_codes(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<IssueCodesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = req.count.unwrap_or(state.config.recovery_code_count);
    if !(1..=MAX_RECOVERY_CODES).contains(&count) {
        return Err(ApiError::BadRequest(format!(
            "count must be between 1 and {MAX_RECOVERY_CODES}"
        )));
    }

    let codes = recovery::issue_codes(&state.db, &user_id, count).await?;
    Ok(Json(serde_json::json!({ "codes": codes })))
}

async fn redeem_recovery_code(
    State(state): State<AppState>,
    Json(req): Json<RecoverRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let valid = recovery::redeem_code(&state.db, &req.user_id, &req.code).await?;
    Ok(Json(serde_json::json!({ "valid": valid })))
}
