// src/ingest/mod.rs
pub mod error;
pub mod fetcher;
pub mod parser;
pub mod types;

use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

use crate::ingest::error::FeedError;
use crate::ingest::types::{FeedFetcher, NewsItem, ParsedItem};
use crate::sources::{FeedSource, SourceRegistry};
use crate::store::NewsStore;

pub const UNTITLED: &str = "Untitled";
pub const MISSING_LINK: &str = "#";
pub const TITLE_MAX_CHARS: usize = 300;
pub const SNIPPET_MAX_CHARS: usize = 240;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_refresh_runs_total", "Refresh cycles actually run.");
        describe_counter!(
            "news_refresh_skipped_total",
            "Refresh requests coalesced by the TTL gate."
        );
        describe_counter!(
            "news_source_errors_total",
            "Per-source fetch/parse failures."
        );
        describe_counter!("news_items_parsed_total", "Items normalized from feeds.");
        describe_counter!(
            "news_items_inserted_total",
            "Items that were new to the store."
        );
        describe_histogram!("news_parse_ms", "Per-source parse time in milliseconds.");
        describe_gauge!("news_store_items", "Items currently held in the store.");
        describe_gauge!("news_stream_clients", "Open push connections.");
        describe_counter!("news_prefs_events_total", "Preference events received.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (covers NBSP)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap in chars, not bytes
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect::<String>().trim_end().to_string();
    }

    out
}

/// Dedup key: hex digest over `"{source}|{title}"`.
pub fn fingerprint(source: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn looks_like_url(s: &str) -> bool {
    let l = s.to_ascii_lowercase();
    l.starts_with("http://") || l.starts_with("https://")
}

/// Fill defaults for every optional field of a parsed item.
pub fn normalize_item(raw: ParsedItem, source: &FeedSource, host: &str, now_ms: i64) -> NewsItem {
    let title = raw
        .title
        .as_deref()
        .map(|t| normalize_text(t, TITLE_MAX_CHARS))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let link = raw
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .or_else(|| {
            raw.guid
                .as_deref()
                .map(str::trim)
                .filter(|g| looks_like_url(g))
        })
        .unwrap_or(MISSING_LINK)
        .to_string();

    let ts = raw
        .pub_date
        .as_deref()
        .and_then(parser::parse_timestamp_ms)
        .unwrap_or(now_ms);

    let img = raw
        .image
        .clone()
        .or_else(|| raw.description.as_deref().and_then(parser::first_img_src));

    let snippet = raw
        .description
        .as_deref()
        .map(|d| normalize_text(d, SNIPPET_MAX_CHARS))
        .filter(|d| !d.is_empty());

    NewsItem {
        id: fingerprint(host, &title),
        title,
        link,
        source: host.to_string(),
        category: source.category.clone(),
        ts,
        snippet,
        img,
    }
}

/// Parse one fetched document into normalized items for `source`.
pub fn items_from_document(
    source: &FeedSource,
    body: &str,
    max_items: usize,
    now_ms: i64,
) -> Result<Vec<NewsItem>, FeedError> {
    let t0 = std::time::Instant::now();
    let raw = parser::parse_feed(body, max_items).map_err(|e| FeedError::Parse {
        url: source.url.clone(),
        reason: e.to_string(),
    })?;
    let host = source.host();
    let items: Vec<NewsItem> = raw
        .into_iter()
        .map(|it| normalize_item(it, source, &host, now_ms))
        .collect();

    histogram!("news_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("news_items_parsed_total").increment(items.len() as u64);
    Ok(items)
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub items_parsed: usize,
    pub items_inserted: usize,
}

/// Fetch every configured source concurrently, parse each independently and
/// merge the results into the store. Per-source failures are logged and
/// counted; the cycle itself never fails.
pub async fn refresh_all(
    registry: &SourceRegistry,
    fetcher: &dyn FeedFetcher,
    store: &NewsStore,
    max_items_per_source: usize,
) -> CycleReport {
    ensure_metrics_described();

    let tasks = registry.all().map(|source| async move {
        let body = fetcher.fetch(source).await?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        items_from_document(source, &body, max_items_per_source, now_ms)
    });
    let results = join_all(tasks).await;

    let mut report = CycleReport::default();
    for (source, res) in registry.all().zip(results) {
        match res {
            Ok(items) => {
                report.sources_ok += 1;
                report.items_parsed += items.len();
                report.items_inserted += store.insert_many(items);
            }
            Err(e) => {
                report.sources_failed += 1;
                tracing::warn!(
                    target: "ingest",
                    url = %source.url,
                    kind = e.kind(),
                    error = %e,
                    "source skipped this cycle"
                );
                counter!("news_source_errors_total", "kind" => e.kind()).increment(1);
            }
        }
    }

    counter!("news_items_inserted_total").increment(report.items_inserted as u64);
    gauge!("news_store_items").set(store.len() as f64);

    tracing::info!(
        target: "ingest",
        ok = report.sources_ok,
        failed = report.sources_failed,
        parsed = report.items_parsed,
        inserted = report.items_inserted,
        "refresh cycle finished"
    );

    report
}
