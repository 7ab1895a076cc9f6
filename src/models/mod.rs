use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chapter candidate produced by the segmenter, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedChapter {
    pub title: String,
    pub content: String,
    pub order: usize,
}

/// A chapter heading found while scanning converted HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingMatch {
    pub byte_offset: usize,
    pub title: String,
    /// Number printed in the heading. Display only, never used for ordering.
    pub chapter_number: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub success: bool,
    pub chapter_count: usize,
    pub chapters: Vec<ParsedChapter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStory {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub story_id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub order: i64,
    /// Compared by plain equality on read. Not a credential.
    pub access_password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chapter listing entry; omits the body and the password.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub order: i64,
    pub locked: bool,
}

impl From<&Chapter> for ChapterSummary {
    fn from(chapter: &Chapter) -> Self {
        ChapterSummary {
            id: chapter.id.clone(),
            title: chapter.title.clone(),
            slug: chapter.slug.clone(),
            order: chapter.order,
            locked: chapter.access_password.is_some(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChapter {
    pub title: String,
    pub content: String,
    pub story_id: String,
    #[serde(default)]
    pub access_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` clears the password, `None` leaves it alone.
    #[serde(default, deserialize_with = "double_option")]
    pub access_password: Option<Option<String>>,
}

/// One entry of a confirmed import batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportChapter {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub access_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecoveryCodeRecord {
    pub id: String,
    pub code_hash: String,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_update_distinguishes_missing_and_null_password() {
        let missing: ChapterUpdate = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(missing.access_password, None);

        let cleared: ChapterUpdate = serde_json::from_str(r#"{"accessPassword":null}"#).unwrap();
        assert_eq!(cleared.access_password, Some(None));

        let set: ChapterUpdate = serde_json::from_str(r#"{"accessPassword":"abc"}"#).unwrap();
        assert_eq!(set.access_password, Some(Some("abc".to_string())));
    }

    #[test]
    fn new_chapter_accepts_camel_case() {
        let chapter: NewChapter =
            serde_json::from_str(r#"{"title":"T","content":"<p>x</p>","storyId":"s1"}"#).unwrap();
        assert_eq!(chapter.story_id, "s1");
        assert!(chapter.access_password.is_none());
    }
}
