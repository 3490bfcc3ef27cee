// src/stream.rs
//! Push delivery: one frame stream per open connection.
//!
//! The stream yields an immediate snapshot, then a heartbeat on one timer and
//! a refreshed full snapshot on another. Both timers live inside the stream
//! state, so dropping the stream (client disconnect) cancels them. A refresh
//! already in flight at that point keeps running and still lands in the store.

use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::config::AppConfig;
use crate::ingest::types::NewsItem;
use crate::scheduler::NewsService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Full current view of the category (never a diff).
    Snapshot(Vec<NewsItem>),
    /// Keepalive for idle proxies.
    Ping,
}

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub snapshot_limit: usize,
    pub heartbeat: Duration,
    pub push_interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            snapshot_limit: 60,
            heartbeat: Duration::from_secs(15),
            push_interval: Duration::from_secs(30),
        }
    }
}

impl StreamSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            snapshot_limit: cfg.stream_snapshot_limit,
            heartbeat: cfg.heartbeat(),
            push_interval: cfg.push_interval(),
        }
    }
}

/// Keeps the open-connection count honest: decremented when the stream goes away.
struct ClientGuard(Arc<NewsService>);

impl ClientGuard {
    fn open(service: Arc<NewsService>) -> Self {
        service.stream_opened();
        tracing::debug!(target: "news", clients = service.active_streams(), "stream client connected");
        Self(service)
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.0.stream_closed();
        tracing::debug!(target: "news", clients = self.0.active_streams(), "stream client gone");
    }
}

struct StreamState {
    guard: ClientGuard,
    category: String,
    limit: usize,
    ping: Interval,
    push: Interval,
    opened: bool,
}

async fn snapshot(service: &Arc<NewsService>, category: &str, limit: usize) -> Frame {
    service.maybe_refresh_detached().await;
    Frame::Snapshot(service.query(category, limit))
}

fn timer(period: Duration) -> Interval {
    let mut t = interval_at(Instant::now() + period, period);
    t.set_missed_tick_behavior(MissedTickBehavior::Delay);
    t
}

/// Frames for one push connection on `category`.
pub fn snapshot_stream(
    service: Arc<NewsService>,
    category: String,
    settings: StreamSettings,
) -> impl Stream<Item = Frame> + Send + 'static {
    let state = StreamState {
        guard: ClientGuard::open(service),
        category,
        limit: settings.snapshot_limit,
        ping: timer(settings.heartbeat),
        push: timer(settings.push_interval),
        opened: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        if !st.opened {
            st.opened = true;
            let frame = snapshot(&st.guard.0, &st.category, st.limit).await;
            return Some((frame, st));
        }

        let push_due = tokio::select! {
            _ = st.ping.tick() => false,
            _ = st.push.tick() => true,
        };
        let frame = if push_due {
            snapshot(&st.guard.0, &st.category, st.limit).await
        } else {
            Frame::Ping
        };
        Some((frame, st))
    })
}
