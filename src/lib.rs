// src/lib.rs
// Public library surface for integration tests and the binary.

pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod prefs;
pub mod scheduler;
pub mod sources;
pub mod store;
pub mod stream;

use std::sync::Arc;

use anyhow::Result;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::AppConfig;
pub use crate::ingest::types::{FeedFetcher, NewsItem};
pub use crate::scheduler::NewsService;

use crate::ingest::fetcher::HttpFetcher;
use crate::prefs::{JsonlPrefSink, MemoryPrefSink, PreferenceSink};

/// Wire the production state from config: HTTP fetcher, bounded store and the
/// configured preference sink (JSON lines when `prefs_path` is set).
pub fn build_state(cfg: &AppConfig) -> Result<AppState> {
    let fetcher = HttpFetcher::new(&cfg.user_agent, cfg.fetch_timeout())?;
    let service = Arc::new(NewsService::from_config(cfg, Arc::new(fetcher))?);

    let prefs: Arc<dyn PreferenceSink> = match &cfg.prefs_path {
        Some(p) => Arc::new(JsonlPrefSink::new(p.clone())),
        None => Arc::new(MemoryPrefSink::new()),
    };

    tracing::info!(
        target: "news",
        sources = service.registry().len(),
        categories = service.registry().categories().len(),
        ttl_secs = cfg.ttl_secs,
        durable_prefs = cfg.prefs_path.is_some(),
        "news service configured"
    );

    Ok(AppState::new(service, prefs).with_config(cfg))
}
