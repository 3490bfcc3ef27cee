// src/prefs.rs
//! Write-only sink for client interaction signals (view/like/save/play, ...).
//! Nothing in the delivery path reads these back.

use anyhow::{Context, Result};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreferenceEvent {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub action: String,
    pub payload: Value,
    pub ts: i64, // epoch millis
}

impl PreferenceEvent {
    /// Split a loose request body into `userId`, `action` and the rest.
    /// Anything that is not a JSON object counts as an empty one.
    pub fn from_body(body: Value, ts: i64) -> Self {
        let mut obj = match body {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        let user_id = obj
            .remove("userId")
            .and_then(|v| scalar_to_string(&v))
            .filter(|s| !s.is_empty());
        let action = obj
            .remove("action")
            .and_then(|v| scalar_to_string(&v))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            user_id,
            action,
            payload: Value::Object(obj),
            ts,
        }
    }
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[async_trait::async_trait]
pub trait PreferenceSink: Send + Sync {
    /// Persist one event (best-effort).
    async fn record(&self, event: PreferenceEvent) -> Result<()>;
}

/// Process-lifetime sink; events are only kept, never served.
#[derive(Debug, Default)]
pub struct MemoryPrefSink {
    events: Mutex<Vec<PreferenceEvent>>,
}

impl MemoryPrefSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl PreferenceSink for MemoryPrefSink {
    async fn record(&self, event: PreferenceEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event);
        Ok(())
    }
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlPrefSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlPrefSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[async_trait::async_trait]
impl PreferenceSink for JsonlPrefSink {
    async fn record(&self, event: PreferenceEvent) -> Result<()> {
        let mut line = serde_json::to_vec(&event).context("serialize pref event")?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening {}", self.path.display()))?;
        f.write_all(&line).await.context("append pref event")?;
        f.flush().await.context("flush pref event")?;
        Ok(())
    }
}

/// Record without ever failing the caller.
pub async fn record_best_effort(sink: &dyn PreferenceSink, event: PreferenceEvent) {
    counter!("news_prefs_events_total").increment(1);
    let action = event.action.clone();
    if let Err(e) = sink.record(event).await {
        tracing::warn!(target: "news", %action, "pref sink write failed: {e:#}");
    }
}
