// src/sources.rs
//! Source registry: which feeds exist and which category each one feeds.
//!
//! The registry is built once at startup (built-in list, config table, or a
//! standalone TOML/JSON file) and never mutated afterwards.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Reserved category that selects every stored item on read.
pub const ALL_CATEGORY: &str = "all";

pub const ENV_SOURCES_PATH: &str = "NEWS_SOURCES_PATH";

/// Host label used when a source URL has no parseable host.
const FALLBACK_HOST: &str = "feed";

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "uplifting",
        &[
            "https://www.goodnewsnetwork.org/feed/",
            "https://www.positive.news/feed/",
        ],
    ),
    (
        "science",
        &[
            "https://www.sciencedaily.com/rss/top/health.xml",
            "https://www.nature.com/subjects/health-sciences.rss",
        ],
    ),
    ("environment", &["https://www.eenews.net/latest/rss/"]),
    ("health", &["https://www.medicalnewstoday.com/rss"]),
    ("education", &["https://www.edutopia.org/feeds/latest"]),
    ("community", &["https://www.indiawaterportal.org/rss.xml"]),
    ("business", &["https://www.forbes.com/innovation/feed/"]),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
    pub category: String,
}

impl FeedSource {
    pub fn new(url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            category: category.into(),
        }
    }

    /// Hostname of the feed URL with a leading `www.` removed.
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .map(|h| h.strip_prefix("www.").map(str::to_string).unwrap_or(h))
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| FALLBACK_HOST.to_string())
    }
}

/// Immutable category -> sources mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRegistry {
    by_category: BTreeMap<String, Vec<FeedSource>>,
}

impl SourceRegistry {
    /// The default feed set shipped with the service.
    pub fn builtin() -> Self {
        let map = BUILTIN
            .iter()
            .map(|(cat, urls)| {
                (
                    cat.to_string(),
                    urls.iter().map(|u| u.to_string()).collect::<Vec<_>>(),
                )
            })
            .collect();
        Self::from_map(map)
    }

    /// Build from a `category -> [url, ...]` table. Keys are trimmed and
    /// lowercased, blank URLs dropped, duplicates within a category removed.
    /// The reserved `all` key cannot own sources and is skipped.
    pub fn from_map(map: BTreeMap<String, Vec<String>>) -> Self {
        let mut by_category: BTreeMap<String, Vec<FeedSource>> = BTreeMap::new();
        for (raw_cat, urls) in map {
            let cat = raw_cat.trim().to_ascii_lowercase();
            if cat.is_empty() {
                continue;
            }
            if cat == ALL_CATEGORY {
                tracing::warn!(target: "news", "ignoring sources under reserved category `all`");
                continue;
            }
            let entry = by_category.entry(cat.clone()).or_default();
            for u in urls {
                let u = u.trim();
                if u.is_empty() || entry.iter().any(|s| s.url == u) {
                    continue;
                }
                entry.push(FeedSource::new(u, cat.clone()));
            }
        }
        by_category.retain(|_, v| !v.is_empty());
        Self { by_category }
    }

    pub fn from_sources(sources: Vec<FeedSource>) -> Self {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for s in sources {
            map.entry(s.category).or_default().push(s.url);
        }
        Self::from_map(map)
    }

    /// Configured category keys in sorted order (without `all`).
    pub fn categories(&self) -> Vec<String> {
        self.by_category.keys().cloned().collect()
    }

    pub fn sources_for(&self, category: &str) -> &[FeedSource] {
        self.by_category
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every configured source across all categories.
    pub fn all(&self) -> impl Iterator<Item = &FeedSource> {
        self.by_category.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }

    /// Load a registry file. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sources from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        parse_sources(&content, ext.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonSources {
    Table(BTreeMap<String, Vec<String>>),
    List(Vec<FeedSource>),
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<SourceRegistry> {
    if hint_ext != "json" {
        if let Ok(map) = toml::from_str::<BTreeMap<String, Vec<String>>>(s) {
            return Ok(SourceRegistry::from_map(map));
        }
    }
    match serde_json::from_str::<JsonSources>(s) {
        Ok(JsonSources::Table(map)) => Ok(SourceRegistry::from_map(map)),
        Ok(JsonSources::List(list)) => Ok(SourceRegistry::from_sources(list)),
        Err(_) => Err(anyhow!("unsupported sources format")),
    }
}
