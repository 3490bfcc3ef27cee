// src/scheduler.rs
//! Refresh gate, background refresh timer and the service object that owns
//! the store. Handlers receive the service through axum state.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::AppConfig;
use crate::ingest::types::{FeedFetcher, NewsItem};
use crate::ingest::{self, CycleReport};
use crate::sources::SourceRegistry;
use crate::store::NewsStore;

/// Shared TTL gate: at most one refresh cycle may start per TTL window.
#[derive(Debug)]
pub struct RefreshGate {
    ttl: Duration,
    last: Mutex<Option<Instant>>,
}

impl RefreshGate {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            last: Mutex::new(None),
        }
    }

    /// Claim the next cycle. The timestamp is taken before any fetch starts,
    /// so callers arriving during a slow cycle are coalesced too.
    pub fn try_claim(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(prev) = *last {
            if now.saturating_duration_since(prev) < self.ttl {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

pub struct NewsService {
    registry: SourceRegistry,
    fetcher: Arc<dyn FeedFetcher>,
    store: NewsStore,
    gate: RefreshGate,
    max_items_per_source: usize,
    stream_clients: AtomicUsize,
}

impl NewsService {
    pub fn new(
        registry: SourceRegistry,
        fetcher: Arc<dyn FeedFetcher>,
        store: NewsStore,
        ttl: Duration,
        max_items_per_source: usize,
    ) -> Self {
        Self {
            registry,
            fetcher,
            store,
            gate: RefreshGate::new(ttl),
            max_items_per_source,
            stream_clients: AtomicUsize::new(0),
        }
    }

    pub fn from_config(cfg: &AppConfig, fetcher: Arc<dyn FeedFetcher>) -> anyhow::Result<Self> {
        Ok(Self::new(
            cfg.registry()?,
            fetcher,
            NewsStore::with_category_capacity(cfg.category_capacity()),
            cfg.ttl(),
            cfg.max_items_per_source,
        ))
    }

    /// Run a refresh cycle unless one already started within the TTL.
    /// Returns `None` when the call was coalesced.
    pub async fn maybe_refresh(&self) -> Option<CycleReport> {
        if !self.gate.try_claim() {
            counter!("news_refresh_skipped_total").increment(1);
            tracing::trace!(target: "news", "refresh coalesced by ttl gate");
            return None;
        }
        counter!("news_refresh_runs_total").increment(1);
        let report = ingest::refresh_all(
            &self.registry,
            self.fetcher.as_ref(),
            &self.store,
            self.max_items_per_source,
        )
        .await;
        Some(report)
    }

    /// Same as [`maybe_refresh`](Self::maybe_refresh), but the cycle runs on its
    /// own task: if the caller goes away mid-cycle, the fetches still complete
    /// and merge into the store for later readers.
    pub async fn maybe_refresh_detached(self: &Arc<Self>) -> Option<CycleReport> {
        let svc = Arc::clone(self);
        match tokio::spawn(async move { svc.maybe_refresh().await }).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(target: "news", error = %e, "refresh task failed");
                None
            }
        }
    }

    pub fn query(&self, category: &str, limit: usize) -> Vec<NewsItem> {
        self.store.query(category, limit)
    }

    pub fn store(&self) -> &NewsStore {
        &self.store
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn ttl(&self) -> Duration {
        self.gate.ttl()
    }

    /// Number of push connections currently open.
    pub fn active_streams(&self) -> usize {
        self.stream_clients.load(Ordering::SeqCst)
    }

    pub(crate) fn stream_opened(&self) {
        let n = self.stream_clients.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("news_stream_clients").set(n as f64);
    }

    pub(crate) fn stream_closed(&self) {
        let n = self
            .stream_clients
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        gauge!("news_stream_clients").set(n as f64);
    }
}

/// Proactive refresh independent of request traffic. The first tick fires
/// immediately so the store is warm shortly after startup; every tick still
/// goes through the TTL gate.
pub fn spawn_background_refresh(service: Arc<NewsService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(report) = service.maybe_refresh().await {
                tracing::debug!(
                    target: "news",
                    inserted = report.items_inserted,
                    failed = report.sources_failed,
                    "background refresh tick"
                );
            }
        }
    })
}
