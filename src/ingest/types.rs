// src/ingest/types.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ingest::error::FeedError;
use crate::sources::FeedSource;

/// One normalized story as stored and served.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub id: String,       // fingerprint of "source|title"
    pub title: String,    // trimmed, never empty ("Untitled" fallback)
    pub link: String,     // "#" when the feed gives none
    pub source: String,   // feed host without "www."
    pub category: String, // category label of the registered source
    pub ts: i64,          // epoch millis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
}

/// Raw fields pulled out of a single `<item>`/`<entry>`; every field is optional
/// and defaults are filled in during normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub pub_date: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Retrieves the raw feed document for one source.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, source: &FeedSource) -> Result<String, FeedError>;
}
