// tests/common/mod.rs
//
// Shared builders for integration tests: RSS documents and a service wired to
// an in-memory fetcher.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use wellness_news::api::{router, AppState};
use wellness_news::ingest::fetcher::StaticFetcher;
use wellness_news::prefs::MemoryPrefSink;
use wellness_news::scheduler::NewsService;
use wellness_news::sources::{FeedSource, SourceRegistry};
use wellness_news::store::NewsStore;

pub const UPLIFTING_URL: &str = "https://www.goodnewsnetwork.org/feed/";
pub const HEALTH_URL: &str = "https://www.medicalnewstoday.com/rss";
pub const SCIENCE_URL: &str = "https://www.sciencedaily.com/rss/top/health.xml";

/// `<rss>` document with one `<item>` per `(title, pubDate)` pair.
pub fn rss(items: &[(&str, Option<String>)]) -> String {
    let mut body = String::from("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>t</title>");
    for (i, (title, date)) in items.iter().enumerate() {
        body.push_str("<item>");
        body.push_str(&format!("<title>{title}</title>"));
        body.push_str(&format!("<link>https://example.org/{i}</link>"));
        if let Some(d) = date {
            body.push_str(&format!("<pubDate>{d}</pubDate>"));
        }
        body.push_str("</item>");
    }
    body.push_str("</channel></rss>");
    body
}

/// RFC 2822 date `minutes` in the past.
pub fn minutes_ago(minutes: i64) -> String {
    (Utc::now() - ChronoDuration::minutes(minutes)).to_rfc2822()
}

pub fn registry(sources: &[(&str, &str)]) -> SourceRegistry {
    SourceRegistry::from_sources(
        sources
            .iter()
            .map(|(url, cat)| FeedSource::new(*url, *cat))
            .collect(),
    )
}

pub fn service(
    registry: SourceRegistry,
    fetcher: Arc<StaticFetcher>,
    ttl: Duration,
) -> Arc<NewsService> {
    Arc::new(NewsService::new(registry, fetcher, NewsStore::new(), ttl, 20))
}

/// Router over `service` with an in-memory prefs sink; returns the sink too.
pub fn app(service: Arc<NewsService>) -> (axum::Router, Arc<MemoryPrefSink>) {
    let prefs = Arc::new(MemoryPrefSink::new());
    let state = AppState::new(service, prefs.clone());
    (router(state), prefs)
}
