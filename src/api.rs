use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::config::AppConfig;
use crate::ingest::types::NewsItem;
use crate::prefs::{record_best_effort, PreferenceEvent, PreferenceSink};
use crate::scheduler::NewsService;
use crate::sources::ALL_CATEGORY;
use crate::stream::{snapshot_stream, Frame, StreamSettings};

/// Request defaults for the read endpoints.
#[derive(Debug, Clone)]
pub struct ApiDefaults {
    pub category: String,
    pub limit: usize,
    pub max_limit: usize,
}

impl Default for ApiDefaults {
    fn default() -> Self {
        Self {
            category: "uplifting".to_string(),
            limit: 60,
            max_limit: 200,
        }
    }
}

impl ApiDefaults {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            category: cfg.default_category.clone(),
            limit: cfg.default_limit,
            max_limit: cfg.max_limit,
        }
    }

    /// Matched exactly against item categories; only blank falls back.
    fn category(&self, q: &HashMap<String, String>) -> String {
        q.get("category")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.category.clone())
    }

    /// Unparseable or negative limits fall back to the default; large ones are clamped.
    fn limit(&self, q: &HashMap<String, String>) -> usize {
        q.get("limit")
            .and_then(|l| l.trim().parse::<i64>().ok())
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(self.limit)
            .min(self.max_limit)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NewsService>,
    pub prefs: Arc<dyn PreferenceSink>,
    pub defaults: ApiDefaults,
    pub stream: StreamSettings,
}

impl AppState {
    pub fn new(service: Arc<NewsService>, prefs: Arc<dyn PreferenceSink>) -> Self {
        Self {
            service,
            prefs,
            defaults: ApiDefaults::default(),
            stream: StreamSettings::default(),
        }
    }

    pub fn with_config(mut self, cfg: &AppConfig) -> Self {
        self.defaults = ApiDefaults::from_config(cfg);
        self.stream = StreamSettings::from_config(cfg);
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/news", get(news))
        .route("/news/stream", get(news_stream))
        .route("/news/categories", get(categories))
        .route("/news/prefs", post(prefs))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "items": state.service.store().len(),
        "sources": state.service.registry().len(),
    }))
}

/// Pull: refresh if stale, then answer from the store. Upstream failures
/// only ever shrink the answer, never turn it into an error.
async fn news(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<NewsItem>> {
    let category = state.defaults.category(&q);
    let limit = state.defaults.limit(&q);
    state.service.maybe_refresh_detached().await;
    Json(state.service.query(&category, limit))
}

async fn news_stream(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let category = state.defaults.category(&q);
    tracing::debug!(target: "news", %category, "stream opened");
    let frames = snapshot_stream(state.service.clone(), category, state.stream);
    Sse::new(frames.map(|f| Ok(frame_to_event(f))))
}

fn frame_to_event(frame: Frame) -> Event {
    match frame {
        Frame::Ping => Event::default().event("ping").data("{}"),
        Frame::Snapshot(items) => Event::default()
            .json_data(&items)
            .unwrap_or_else(|e| {
                tracing::warn!(target: "news", error = %e, "snapshot serialization failed");
                Event::default().data("[]")
            }),
    }
}

async fn categories(State(state): State<AppState>) -> Json<Vec<String>> {
    let mut cats = state.service.registry().categories();
    cats.push(ALL_CATEGORY.to_string());
    Json(cats)
}

/// Always acknowledges, whatever the body or the sink does.
async fn prefs(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let event = PreferenceEvent::from_body(body, chrono::Utc::now().timestamp_millis());
    record_best_effort(state.prefs.as_ref(), event).await;
    Json(json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn limit_falls_back_and_clamps() {
        let d = ApiDefaults::default();
        assert_eq!(d.limit(&q(&[])), 60);
        assert_eq!(d.limit(&q(&[("limit", "abc")])), 60);
        assert_eq!(d.limit(&q(&[("limit", "-3")])), 60);
        assert_eq!(d.limit(&q(&[("limit", "0")])), 0);
        assert_eq!(d.limit(&q(&[("limit", " 10 ")])), 10);
        assert_eq!(d.limit(&q(&[("limit", "100000")])), 200);
    }

    #[test]
    fn category_defaults_and_trims_only() {
        let d = ApiDefaults::default();
        assert_eq!(d.category(&q(&[])), "uplifting");
        assert_eq!(d.category(&q(&[("category", "  ")])), "uplifting");
        assert_eq!(d.category(&q(&[("category", " health ")])), "health");
        assert_eq!(d.category(&q(&[("category", "Health")])), "Health");
        assert_eq!(d.category(&q(&[("category", "ALL")])), "ALL");
    }
}
