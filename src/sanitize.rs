// src/sanitize.rs
//! Markup-to-plain-text sanitizer used for category tags and allow-list labels.

use once_cell::sync::Lazy;
use regex::Regex;

// Comments and non-visible blocks are dropped together with their content.
static RE_HIDDEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
        .unwrap()
});

// Element tags, doctype/CDATA-ish declarations and processing instructions.
static RE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)</?[A-Za-z][^>]*>|<![^>]*>|<\?[^>]*>").unwrap());

/// Strip markup from `raw` and return its visible text, escaped so it can be
/// redisplayed safely (`& < > " '`).
///
/// Never fails. Input with an unterminated tag is treated as unparseable and
/// escaped unchanged.
pub fn sanitize(raw: &str) -> String {
    match extract_text(raw) {
        Some(text) => escape(&text),
        None => escape(raw),
    }
}

/// Visible text of a markup fragment, entities decoded.
/// `None` when the fragment opens a tag it never closes.
pub fn extract_text(raw: &str) -> Option<String> {
    if !raw.contains('<') {
        return Some(html_escape::decode_html_entities(raw).into_owned());
    }
    if has_unterminated_tag(raw) {
        return None;
    }
    let visible = RE_HIDDEN.replace_all(raw, "");
    let stripped = RE_TAG.replace_all(&visible, "");
    Some(html_escape::decode_html_entities(&stripped).into_owned())
}

fn escape(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// A `<` that starts a tag (letter, `/`, `!` or `?` follows) with no `>` after it.
fn has_unterminated_tag(raw: &str) -> bool {
    let mut chars = raw.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if ch != '<' {
            continue;
        }
        let starts_tag = chars
            .peek()
            .is_some_and(|&(_, next)| next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?'));
        if starts_tag && !raw[idx..].contains('>') {
            return true;
        }
    }
    false
}
