use unicode_normalization::UnicodeNormalization;

/// Derives a URL path segment from a title.
///
/// Lowercases, folds diacritics (including Vietnamese `đ`), and collapses
/// everything outside `[a-z0-9]` into single hyphens. Different titles can
/// produce the same slug; callers resolve collisions with [`slug_candidate`].
pub fn generate_slug(title: &str) -> String {
    let folded: String = title
        .to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .map(|c| if c == 'đ' { 'd' } else { c })
        .collect();

    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for ch in folded.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Slug to try on the given attempt: `base`, then `base-2`, `base-3`, ...
///
/// An empty base (a title with no Latin letters or digits) uses `fallback`.
pub fn slug_candidate(base: &str, fallback: &str, attempt: u32) -> String {
    let base = if base.is_empty() { fallback } else { base };
    if attempt <= 1 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}
