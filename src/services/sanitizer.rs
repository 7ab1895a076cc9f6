//! Denylist scrubbing of chapter HTML.
//!
//! Only two shapes are removed: `<script>` blocks and quoted inline event
//! handler attributes (`onclick="..."`, `onload='...'`). Markup is never parsed,
//! so anything a browser would normalize into script (unquoted handlers,
//! `javascript:` URLs, broken tags) passes through. This is not an XSS
//! guarantee. Handlers are only matched inside an opening tag, so prose such
//! as `one="two"` is left alone.

use regex::Regex;
use std::sync::LazyLock;

static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script pattern")
});

// Group 1 is the tag up to the handler; quoted values may contain `>`.
static EVENT_HANDLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(<[a-z](?:[^>"']|"[^"]*"|'[^']*')*?)\s+on\w+\s*=\s*(?:"[^"]*"|'[^']*')"#,
    )
    .expect("handler pattern")
});

pub fn sanitize_html(html: &str) -> String {
    let mut out = SCRIPT_RE.replace_all(html, "").into_owned();
    // One handler per tag goes each pass.
    while EVENT_HANDLER_RE.is_match(&out) {
        out = EVENT_HANDLER_RE.replace_all(&out, "$1").into_owned();
    }
    out
}
