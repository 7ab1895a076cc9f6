use crate::models::{HeadingMatch, ParsedChapter};
use crate::services::converter::{self, ConversionError};
use crate::services::sanitizer::sanitize_html;
use regex::Regex;
use std::sync::LazyLock;

/// Title given to the single chapter produced when no heading matches.
pub const FALLBACK_TITLE: &str = "Chapter 1";

// h1-h3 on raw markup; the closing level is not required to match the opening one.
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h[1-3]\b[^>]*>(.*?)</h[1-3]\s*>").expect("heading pattern")
});

// "chaper" is matched on purpose, uploaded manuscripts carry that typo.
static CHAPTER_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:chương|chapter|chaper)\s*([0-9]+)").expect("chapter token pattern")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*/?\s*([a-zA-Z][a-zA-Z0-9]*)?[^>]*>").expect("tag pattern"));

// Formatting runs can split a word, so these tags vanish instead of becoming a space.
const INLINE_TAGS: &[&str] = &[
    "a", "b", "em", "font", "i", "mark", "s", "small", "span", "strong", "sub", "sup", "u",
];

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Converts an uploaded document and splits it into sanitized chapters.
pub async fn process_document(
    data: Vec<u8>,
    extension: String,
) -> Result<Vec<ParsedChapter>, ConversionError> {
    let html = tokio::task::spawn_blocking(move || converter::convert_document(&data, &extension))
        .await
        .map_err(|e| ConversionError::Worker(e.to_string()))??;

    let chapters = process_html(&html);
    tracing::info!(
        html_len = html.len(),
        chapters = chapters.len(),
        "Segmented uploaded document"
    );
    Ok(chapters)
}

/// Segments converted HTML and sanitizes each chapter body.
pub fn process_html(html: &str) -> Vec<ParsedChapter> {
    detect_chapters(html)
        .into_iter()
        .map(|chapter| ParsedChapter {
            content: sanitize_html(&chapter.content),
            ..chapter
        })
        .collect()
}

/// Splits HTML into chapters at each chapter heading, in document order.
///
/// Content before the first heading is dropped. Without any heading the whole
/// input becomes one chapter titled [`FALLBACK_TITLE`]. `order` is the
/// position in the heading sequence; the number printed in the heading is
/// ignored for ordering.
pub fn detect_chapters(html: &str) -> Vec<ParsedChapter> {
    let headings = find_chapter_headings(html);

    if headings.is_empty() {
        return vec![ParsedChapter {
            title: FALLBACK_TITLE.to_string(),
            content: html.to_string(),
            order: 1,
        }];
    }

    headings
        .iter()
        .enumerate()
        .map(|(idx, heading)| {
            let end = headings
                .get(idx + 1)
                .map_or(html.len(), |next| next.byte_offset);
            ParsedChapter {
                title: heading.title.clone(),
                content: html[heading.byte_offset..end].to_string(),
                order: idx + 1,
            }
        })
        .collect()
}

/// Finds every h1-h3 heading whose text names a chapter followed by a number.
pub fn find_chapter_headings(html: &str) -> Vec<HeadingMatch> {
    HEADING_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let title = heading_text(caps.get(1).map_or("", |m| m.as_str()));
            let number = CHAPTER_TOKEN_RE.captures(&title)?.get(1)?.as_str();
            let chapter_number = number.parse().unwrap_or(u64::MAX);
            tracing::debug!(offset = whole.start(), chapter_number, %title, "Found chapter heading");

            Some(HeadingMatch {
                byte_offset: whole.start(),
                chapter_number,
                title,
            })
        })
        .collect()
}

fn heading_text(inner: &str) -> String {
    let stripped = TAG_RE.replace_all(inner, |caps: &regex::Captures| {
        let name = caps.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
        if INLINE_TAGS.contains(&name.as_str()) { "" } else { " " }
    });
    let decoded = html_escape::decode_html_entities(&stripped);
    WHITESPACE_RE.replace_all(&decoded, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_two_vietnamese_headings() {
        let html = "<h1>Chương 1: Intro</h1>AAA<h2>Chương 2</h2>BBB";
        let chapters = detect_chapters(html);

        assert_eq!(
            chapters,
            vec![
                ParsedChapter {
                    title: "Chương 1: Intro".to_string(),
                    content: "<h1>Chương 1: Intro</h1>AAA".to_string(),
                    order: 1,
                },
                ParsedChapter {
                    title: "Chương 2".to_string(),
                    content: "<h2>Chương 2</h2>BBB".to_string(),
                    order: 2,
                },
            ]
        );
    }

    #[test]
    fn no_heading_falls_back_to_single_chapter() {
        for html in ["", "<p>just prose</p>", "<h4>Chapter 9</h4>text", "<h1>Prologue</h1>"] {
            let chapters = detect_chapters(html);
            assert_eq!(chapters.len(), 1);
            assert_eq!(chapters[0].order, 1);
            assert_eq!(chapters[0].title, FALLBACK_TITLE);
            assert_eq!(chapters[0].content, html);
        }
    }

    #[test]
    fn order_follows_position_not_heading_number() {
        let html = "<h1>Chapter 3</h1>c<h1>Chapter 1</h1>a<h1>Chapter 1</h1>again";
        let chapters = detect_chapters(html);

        let orders: Vec<usize> = chapters.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(chapters[0].title, "Chapter 3");
        assert_eq!(chapters[2].content, "<h1>Chapter 1</h1>again");

        let numbers: Vec<u64> = find_chapter_headings(html)
            .iter()
            .map(|h| h.chapter_number)
            .collect();
        assert_eq!(numbers, vec![3, 1, 1]);
    }

    #[test]
    fn content_spans_cover_input_from_first_heading() {
        let html = "<p>front matter</p><h2 class=\"t\">CHAPTER 1</h2><p>one</p>\n<h3>chaper 2</h3><p>two</p><H1>chương 10</H1>end";
        let headings = find_chapter_headings(html);
        let chapters = detect_chapters(html);

        assert_eq!(chapters.len(), 3);
        let joined: String = chapters.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(joined, &html[headings[0].byte_offset..]);
        assert!(!joined.contains("front matter"));

        let offsets: Vec<usize> = headings.iter().map(|h| h.byte_offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        assert_eq!(offsets, sorted);
    }

    #[test]
    fn title_strips_inner_markup_and_entities() {
        let html = "<h1 id=\"c1\"><strong>Chapter</strong>\n  7 &amp; <em>more</em> </h1>body";
        let headings = find_chapter_headings(html);

        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].title, "Chapter 7 & more");
        assert_eq!(headings[0].chapter_number, 7);
        assert_eq!(headings[0].byte_offset, 0);
    }

    #[test]
    fn heading_without_number_is_not_a_boundary() {
        let html = "<h1>Chapter One</h1>x<h1>Chapter 2</h1>y";
        let chapters = detect_chapters(html);

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Chapter 2");
        assert_eq!(chapters[0].content, "<h1>Chapter 2</h1>y");
    }

    #[test]
    fn process_html_sanitizes_each_chapter() {
        let html = "<h1>Chapter 1</h1><p onclick=\"x()\">a</p><script>bad()</script><h1>Chapter 2</h1>b";
        let chapters = process_html(html);

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].content, "<h1>Chapter 1</h1><p>a</p>");
        assert_eq!(chapters[1].content, "<h1>Chapter 2</h1>b");
    }

    #[test]
    fn unclosed_heading_keeps_words_apart() {
        let html = "<h1>Intro<h2>Chapter 1</h2>body";
        let headings = find_chapter_headings(html);

        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].title, "Intro Chapter 1");
        assert_eq!(headings[0].byte_offset, 0);
    }

    #[test]
    fn inline_runs_do_not_split_words() {
        let headings = find_chapter_headings("<h2><b>Ch</b>ương<span> 4</span></h2>");
        assert_eq!(headings[0].title, "Chương 4");
        assert_eq!(headings[0].chapter_number, 4);
    }

    #[tokio::test]
    async fn process_document_surfaces_conversion_failure() {
        let result = process_document(b"not a zip".to_vec(), "docx".to_string()).await;
        assert!(result.is_err());
    }
}

#[cfg(test)]
mod props {
    use super::*;
    use proptest::prelude::*;

    /// Body text with no markup, so it can never open a heading.
    fn prose() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9ươđáà .,;:!?\n-]{0,80}"
    }

    fn chapter_heading() -> impl Strategy<Value = (u8, &'static str, u32)> {
        (
            1u8..=3,
            prop::sample::select(vec!["Chương", "Chapter", "chaper", "CHAPTER", "chương"]),
            0u32..100_000,
        )
    }

    proptest! {
        #[test]
        fn markup_free_input_is_one_chapter(html in "[^<]{0,300}") {
            let chapters = detect_chapters(&html);

            prop_assert_eq!(chapters.len(), 1);
            prop_assert_eq!(chapters[0].order, 1);
            prop_assert_eq!(chapters[0].title.as_str(), FALLBACK_TITLE);
            prop_assert_eq!(&chapters[0].content, &html);
        }

        #[test]
        fn chapters_follow_headings_and_cover_the_tail(
            front in prose(),
            sections in prop::collection::vec((chapter_heading(), prose()), 1..10)
        ) {
            let mut html = front.clone();
            let mut titles = Vec::new();
            for ((level, token, number), body) in &sections {
                let title = format!("{token} {number}");
                html.push_str(&format!("<h{level}>{title}</h{level}>{body}"));
                titles.push(title);
            }

            let headings = find_chapter_headings(&html);
            let chapters = detect_chapters(&html);

            prop_assert_eq!(chapters.len(), sections.len());
            prop_assert_eq!(headings[0].byte_offset, front.len());
            prop_assert!(headings.windows(2).all(|w| w[0].byte_offset < w[1].byte_offset));

            let orders: Vec<usize> = chapters.iter().map(|c| c.order).collect();
            prop_assert_eq!(orders, (1..=sections.len()).collect::<Vec<_>>());

            let found: Vec<String> = chapters.iter().map(|c| c.title.clone()).collect();
            prop_assert_eq!(found, titles);

            let joined: String = chapters.iter().map(|c| c.content.as_str()).collect();
            prop_assert_eq!(joined.as_str(), &html[front.len()..]);
        }
    }
}
