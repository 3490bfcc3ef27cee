// src/ingest/parser.rs
//! Streaming RSS/RDF/Atom item extraction.
//!
//! The document is walked event by event so that one odd item (missing
//! fields, unknown entities, nested markup) never poisons its neighbours.
//! Only the fields the aggregator needs are captured; defaults are applied
//! later by [`crate::ingest::normalize_item`].

use once_cell::sync::OnceCell;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::ParsedItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    /// `pubDate` / Atom `published`: authoritative.
    Date,
    /// `dc:date` / Atom `updated`: only used when nothing better exists.
    FallbackDate,
    Description,
    /// `content:encoded` / Atom `content`: only used when no description.
    Content,
}

impl Field {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "title" => Some(Field::Title),
            "link" => Some(Field::Link),
            "guid" | "id" => Some(Field::Guid),
            "pubdate" | "published" => Some(Field::Date),
            "dc:date" | "updated" => Some(Field::FallbackDate),
            "description" | "summary" => Some(Field::Description),
            "content:encoded" | "content" => Some(Field::Content),
            _ => None,
        }
    }
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase()
}

fn is_item_tag(tag: &str) -> bool {
    let local = tag.rsplit(':').next().unwrap_or(tag);
    local == "item" || local == "entry"
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

/// Pick up attribute-carried fields: Atom `<link href>`, `<enclosure url>`,
/// `<media:content url>` and `<media:thumbnail url>`.
fn apply_attributes(item: &mut ParsedItem, tag: &str, e: &BytesStart<'_>) {
    match tag {
        "link" => {
            let rel = attr(e, "rel");
            if item.link.is_none() && matches!(rel.as_deref(), None | Some("alternate")) {
                item.link = attr(e, "href");
            }
        }
        "enclosure" => {
            let is_image = attr(e, "type")
                .map(|t| t.to_ascii_lowercase().starts_with("image"))
                .unwrap_or(true);
            if item.image.is_none() && is_image {
                item.image = attr(e, "url");
            }
        }
        "media:content" | "media:thumbnail" => {
            if item.image.is_none() {
                item.image = attr(e, "url");
            }
        }
        _ => {}
    }
}

fn store_field(item: &mut ParsedItem, field: Field, text: String) {
    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }
    match field {
        Field::Title => item.title = Some(text),
        Field::Link => item.link = Some(text),
        Field::Guid => {
            item.guid.get_or_insert(text);
        }
        Field::Date => item.pub_date = Some(text),
        Field::FallbackDate => {
            item.pub_date.get_or_insert(text);
        }
        Field::Description => item.description = Some(text),
        Field::Content => {
            item.description.get_or_insert(text);
        }
    }
}

/// Extract up to `cap` items from a feed document.
///
/// A syntax error after at least one complete item keeps the items read so far;
/// an error before that is returned so the caller can count the source as failed.
pub fn parse_feed(xml: &str, cap: usize) -> Result<Vec<ParsedItem>, quick_xml::Error> {
    let mut items = Vec::new();
    if cap == 0 {
        return Ok(items);
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<ParsedItem> = None;
    // depth below the open item element; 0 = directly inside <item>
    let mut depth = 0usize;
    let mut field: Option<Field> = None;
    let mut buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = tag_name(&e);
                let Some(item) = current.as_mut() else {
                    if is_item_tag(&tag) {
                        current = Some(ParsedItem::default());
                        depth = 0;
                    }
                    continue;
                };
                depth += 1;
                if depth == 1 {
                    apply_attributes(item, &tag, &e);
                    field = Field::from_tag(&tag);
                    buf.clear();
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(item) = current.as_mut() {
                    if depth == 0 {
                        apply_attributes(item, &tag_name(&e), &e);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() {
                    let chunk = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    push_chunk(&mut buf, &chunk);
                }
            }
            Ok(Event::CData(c)) => {
                if field.is_some() {
                    push_chunk(&mut buf, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                if current.is_none() {
                    continue;
                }
                if depth == 0 {
                    if let Some(done) = current.take() {
                        items.push(done);
                    }
                    if items.len() >= cap {
                        break;
                    }
                } else {
                    if depth == 1 {
                        if let (Some(f), Some(item)) = (field.take(), current.as_mut()) {
                            store_field(item, f, std::mem::take(&mut buf));
                        }
                    }
                    depth -= 1;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if items.is_empty() {
                    return Err(e);
                }
                tracing::debug!(
                    target: "ingest",
                    error = %e,
                    kept = items.len(),
                    "feed document truncated by syntax error"
                );
                break;
            }
            _ => {}
        }
    }

    Ok(items)
}

fn push_chunk(buf: &mut String, chunk: &str) {
    if chunk.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(chunk);
}

/// Zone-less layouts some feeds emit; read as UTC.
const NAIVE_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Parse RFC 2822 (`pubDate`) or RFC 3339 (`dc:date`, Atom) into epoch millis.
/// Zone-less `YYYY-MM-DD HH:MM[:SS]` and bare `YYYY-MM-DD` are taken as UTC.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok()
        .and_then(|dt| i64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok());
    if parsed.is_some() {
        return parsed;
    }
    if let Ok(d) = chrono::DateTime::parse_from_rfc2822(s) {
        return Some(d.timestamp_millis());
    }
    naive_utc_ms(s)
}

fn naive_utc_ms(s: &str) -> Option<i64> {
    use chrono::{NaiveDate, NaiveDateTime};

    NAIVE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// First `<img src>` inside an HTML fragment (typically a description).
pub fn first_img_src(html: &str) -> Option<String> {
    static RE_IMG: OnceCell<Regex> = OnceCell::new();
    let re = RE_IMG.get_or_init(|| {
        Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("img regex")
    });
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str()).trim().to_string())
        .filter(|s| !s.is_empty())
}
