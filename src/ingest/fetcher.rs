// src/ingest/fetcher.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::ingest::error::FeedError;
use crate::ingest::types::FeedFetcher;
use crate::sources::FeedSource;

/// Timeout-bounded HTTP GET with a descriptive User-Agent.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client, timeout })
    }

    fn map_err(&self, url: &str, e: reqwest::Error) -> FeedError {
        if e.is_timeout() {
            FeedError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            FeedError::Http {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<String, FeedError> {
        let url = source.url.as_str();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_err(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| self.map_err(url, e))
    }
}

// --- Test helper ---

/// In-memory fetcher keyed by URL. Unknown URLs answer 404; URLs registered
/// with [`StaticFetcher::with_failure`] fail as a network error would.
/// Every call is counted, per URL and in total.
#[derive(Default)]
pub struct StaticFetcher {
    bodies: HashMap<String, Option<String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    per_url: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: impl Into<String>) -> Self {
        self.bodies.insert(url.to_string(), Some(body.into()));
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.bodies.insert(url.to_string(), None);
        self
    }

    /// Every fetch sleeps this long before answering (tokio time, so paused
    /// clocks apply).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, url: &str) -> usize {
        let m = self.per_url.lock().unwrap_or_else(|p| p.into_inner());
        m.get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch(&self, source: &FeedSource) -> Result<String, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut m = self.per_url.lock().unwrap_or_else(|p| p.into_inner());
            *m.entry(source.url.clone()).or_default() += 1;
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        match self.bodies.get(&source.url) {
            Some(Some(body)) => Ok(body.clone()),
            Some(None) => Err(FeedError::Timeout {
                url: source.url.clone(),
                secs: 0,
            }),
            None => Err(FeedError::Status {
                url: source.url.clone(),
                status: 404,
            }),
        }
    }
}
