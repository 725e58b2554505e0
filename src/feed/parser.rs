// src/feed/parser.rs
//! Tolerant RSS 2.0 / Atom parser.
//!
//! Entries come back in document order (feeds are newest-first). Malformed
//! markup costs only the entry it appears in: reading resumes at the next
//! `<item>`/`<entry>`. Entries without a usable date or link are skipped,
//! never fatal.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::feed::types::FeedEntry;
use crate::sanitize::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    PubDate,
    Published,
    Updated,
    DcDate,
    Category,
}

#[derive(Debug, Default)]
struct PartialEntry {
    title: String,
    link: String,
    pub_date: String,
    published: String,
    updated: String,
    dc_date: String,
    terms: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Skip {
    NoDate,
    NoLink,
}

impl PartialEntry {
    /// Handle a direct child element of the entry. Returns the field that
    /// collects its text content, if any.
    fn open(&mut self, e: &BytesStart<'_>) -> Option<Field> {
        match e.local_name().as_ref() {
            b"title" => Some(Field::Title),
            b"pubDate" => Some(Field::PubDate),
            b"published" => Some(Field::Published),
            b"updated" => Some(Field::Updated),
            b"date" => Some(Field::DcDate),
            b"link" => {
                // Atom carries the target in `href`; RSS in the text content.
                match attr(e, b"href") {
                    Some(href) => {
                        let rel = attr(e, b"rel");
                        if self.link.is_empty() && rel.as_deref().map_or(true, |r| r == "alternate") {
                            self.link = href;
                        }
                        None
                    }
                    None => Some(Field::Link),
                }
            }
            b"category" => match attr(e, b"term") {
                Some(term) => {
                    self.terms.push(term);
                    None
                }
                None => {
                    self.terms.push(String::new());
                    Some(Field::Category)
                }
            },
            _ => None,
        }
    }

    fn push_text(&mut self, field: Field, text: &str) {
        let buf = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::PubDate => &mut self.pub_date,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::DcDate => &mut self.dc_date,
            Field::Category => match self.terms.last_mut() {
                Some(term) => term,
                None => return,
            },
        };
        buf.push_str(text);
    }

    fn finish(self) -> Result<FeedEntry, Skip> {
        let link = self.link.trim().to_string();
        if link.is_empty() {
            return Err(Skip::NoLink);
        }

        let published_at = [&self.pub_date, &self.published, &self.dc_date, &self.updated]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .and_then(parse_timestamp)
            .ok_or(Skip::NoDate)?;

        Ok(FeedEntry {
            title: self.title.trim().to_string(),
            link,
            published_at,
            category_tags: category_set(&self.terms),
        })
    }
}

/// Sanitize each term; blank results are dropped.
fn category_set(terms: &[String]) -> BTreeSet<String> {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(sanitize)
        .filter(|t| !t.is_empty())
        .collect()
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| match a.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(&a.value))
                .into_owned(),
        })
}

fn is_entry(name: &[u8]) -> bool {
    matches!(name, b"item" | b"entry")
}

/// Parse a feed timestamp (RFC 2822 as used by RSS, or RFC 3339 as used by
/// Atom and `dc:date`) into UTC. `None` when neither form matches.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    let parsed = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok();
    if let Some(dt) = parsed {
        return DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }
    // chrono also accepts the obsolete zone names ("GMT", "EST", ...) that
    // many feeds still emit.
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a raw feed document into entries, in document order.
pub fn parse_entries(raw: &str) -> Vec<FeedEntry> {
    let t0 = std::time::Instant::now();
    let mut out = Vec::new();
    let mut skipped = 0usize;

    // Each pass reads from `base` until EOF or a syntax error; after an error
    // reading resumes at the next entry start tag.
    let mut base = 0usize;
    while let Err(offset) = read_entries(&raw[base..], &mut out, &mut skipped) {
        match next_entry_start(raw, base + offset.max(1)) {
            Some(next) => base = next,
            None => break,
        }
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("relay_parse_ms").record(ms);
    counter!("relay_entries_parsed_total").increment(out.len() as u64);
    counter!("relay_entries_skipped_total").increment(skipped as u64);
    if skipped > 0 {
        tracing::info!(kept = out.len(), skipped, "feed entries skipped");
    }

    out
}

/// Read entries from `doc` into `out`. On a syntax error the entry being
/// read is dropped and the error's byte offset within `doc` is returned.
fn read_entries(doc: &str, out: &mut Vec<FeedEntry>, skipped: &mut usize) -> Result<(), usize> {
    let mut reader = Reader::from_str(doc);
    let config = reader.config_mut();
    config.trim_text(true);
    // Mismatched or stray end tags close whatever is open instead of failing.
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut current: Option<PartialEntry> = None;
    let mut field: Option<Field> = None;
    // open elements inside the current entry
    let mut depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if is_entry(e.local_name().as_ref()) {
                    // Entries never nest: an unclosed one is abandoned here.
                    if current.take().is_some() {
                        *skipped += 1;
                        tracing::debug!("feed entry never closed; skipping it");
                    }
                    current = Some(PartialEntry::default());
                    depth = 0;
                    field = None;
                } else if let Some(entry) = current.as_mut() {
                    if depth == 0 {
                        field = entry.open(&e);
                    }
                    depth += 1;
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    if depth == 0 {
                        entry.open(&e);
                    }
                }
            }
            Ok(Event::End(_)) => {
                if current.is_none() {
                    continue;
                }
                if depth == 0 {
                    if let Some(entry) = current.take() {
                        match entry.finish() {
                            Ok(parsed) => out.push(parsed),
                            Err(reason) => {
                                *skipped += 1;
                                tracing::debug!(?reason, "skipping unprocessable feed entry");
                            }
                        }
                    }
                } else {
                    depth -= 1;
                    if depth == 0 {
                        field = None;
                    }
                }
            }
            // Text anywhere under a field element belongs to it; markup
            // nested inside the field is dropped.
            Ok(Event::Text(t)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let raw_text = String::from_utf8_lossy(&t);
                    entry.push_text(f, &html_escape::decode_html_entities(&raw_text));
                }
            }
            Ok(Event::CData(c)) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    entry.push_text(f, &String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                let position = reader.buffer_position();
                if current.is_some() {
                    *skipped += 1;
                }
                tracing::warn!(
                    error = %e,
                    position,
                    kept = out.len(),
                    "feed document malformed; resuming at the next entry"
                );
                return Err(usize::try_from(position).unwrap_or(doc.len()));
            }
            _ => {}
        }
    }

    if current.is_some() {
        *skipped += 1;
    }
    Ok(())
}

/// Byte offset of the first `<item` or `<entry` start tag at or after `from`.
fn next_entry_start(raw: &str, from: usize) -> Option<usize> {
    let bytes = raw.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        let at = i + bytes[i..].iter().position(|&b| b == b'<')?;
        let rest = &bytes[at + 1..];
        let found = [&b"item"[..], &b"entry"[..]].iter().any(|name| {
            rest.starts_with(name)
                && rest
                    .get(name.len())
                    .is_some_and(|&b| b == b'>' || b == b'/' || b.is_ascii_whitespace())
        });
        if found {
            return Some(at);
        }
        i = at + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rss(items: &str) -> String {
        format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>{items}</channel></rss>"#)
    }

    #[test]
    fn rfc2822_and_rfc3339_are_accepted() {
        let want = Utc.with_ymd_and_hms(2026, 10, 16, 14, 5, 0).unwrap();
        assert_eq!(parse_timestamp("Fri, 16 Oct 2026 14:05:00 +0000"), Some(want));
        assert_eq!(parse_timestamp("Fri, 16 Oct 2026 16:05:00 +0200"), Some(want));
        assert_eq!(parse_timestamp("2026-10-16T14:05:00Z"), Some(want));
        assert_eq!(parse_timestamp(" Fri, 16 Oct 2026 14:05:00 GMT "), Some(want));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn rss_item_fields_and_categories() {
        let doc = rss(
            r#"<item><title>Robots &amp; you</title><link>https://n.test/a</link>
               <pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate>
               <category><![CDATA[AI]]></category><category><![CDATA[Biotech & Health]]></category>
               <category>  </category></item>"#,
        );
        let entries = parse_entries(&doc);
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.title, "Robots & you");
        assert_eq!(e.link, "https://n.test/a");
        let tags: Vec<_> = e.category_tags.iter().cloned().collect();
        assert_eq!(tags, vec!["AI".to_string(), "Biotech &amp; Health".to_string()]);
    }

    #[test]
    fn entry_without_tags_has_empty_set() {
        let doc = rss(
            r#"<item><title>x</title><link>https://n.test/x</link>
               <pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate></item>"#,
        );
        let entries = parse_entries(&doc);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].category_tags.is_empty());
    }

    #[test]
    fn undated_and_unlinked_entries_are_skipped() {
        let doc = rss(
            r#"<item><title>no date</title><link>https://n.test/1</link></item>
               <item><title>bad date</title><link>https://n.test/2</link><pubDate>soon</pubDate></item>
               <item><title>no link</title><pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate></item>
               <item><title>ok</title><link>https://n.test/4</link><pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate></item>"#,
        );
        let entries = parse_entries(&doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "ok");
    }

    #[test]
    fn truncated_document_keeps_closed_entries() {
        let doc = r#"<rss><channel>
            <item><title>a</title><link>https://n.test/a</link><pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate></item>
            <item><title>b</title><link>https://n.test/b</link><pubDate>Fri, 16 Oct"#;
        let entries = parse_entries(doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "a");
    }

    fn item(title: &str) -> String {
        format!(
            "<item><title>{title}</title><link>https://n.test/{title}</link>\
             <pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate></item>"
        )
    }

    fn titles(doc: &str) -> Vec<String> {
        parse_entries(doc).into_iter().map(|e| e.title).collect()
    }

    #[test]
    fn mismatched_end_tag_does_not_hide_later_entries() {
        let doc = rss(&format!(
            "{}<item><title>b</wrong><link>https://n.test/b</link>\
             <pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate></item>{}{}",
            item("a"),
            item("c"),
            item("d")
        ));
        assert_eq!(titles(&doc), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn bare_less_than_drops_only_its_entry() {
        let doc = rss(&format!(
            "{}<item><title>1 < 2</title><link>https://n.test/b</link>\
             <pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate></item>{}",
            item("a"),
            item("c")
        ));
        assert_eq!(titles(&doc), vec!["a", "c"]);
    }

    #[test]
    fn syntax_error_resumes_at_next_entry() {
        let doc = rss(&format!(
            "{}<item><title>b</title><!bogus></item>{}{}",
            item("a"),
            item("c"),
            item("d")
        ));
        assert_eq!(titles(&doc), vec!["a", "c", "d"]);
    }

    #[test]
    fn entry_start_search_matches_whole_names() {
        let raw = "<items/><entryx><item attr='1'><entry>";
        assert_eq!(next_entry_start(raw, 0), Some(16));
        assert_eq!(next_entry_start(raw, 17), Some(31));
        assert_eq!(next_entry_start(raw, 32), None);
        assert_eq!(next_entry_start(raw, 500), None);
    }

    #[test]
    fn text_inside_nested_markup_is_collected() {
        let doc = rss(
            r#"<item><title><b>Bold</b></title><link>https://n.test/n</link>
               <pubDate>Fri, 16 Oct 2026 14:05:00 +0000</pubDate>
               <category><span>AI</span></category></item>"#,
        );
        let entries = parse_entries(&doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Bold");
        assert!(entries[0].category_tags.contains("AI"));
    }

    #[test]
    fn nested_source_element_does_not_override_entry_fields() {
        let doc = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry><title>outer</title><link rel="alternate" href="https://n.test/o"/>
              <published>2026-10-16T14:05:00Z</published>
              <source><title>inner</title><updated>2020-01-01T00:00:00Z</updated></source>
            </entry></feed>"#;
        let entries = parse_entries(doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "outer");
        assert_eq!(
            entries[0].published_at,
            Utc.with_ymd_and_hms(2026, 10, 16, 14, 5, 0).unwrap()
        );
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_entries("").is_empty());
        assert!(parse_entries("not xml at all").is_empty());
        assert!(parse_entries("<html><body>503</body></html>").is_empty());
    }
}
