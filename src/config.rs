// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sources::{SourceRegistry, ENV_SOURCES_PATH};

pub const DEFAULT_CONFIG_PATH: &str = "config/news.toml";

pub const ENV_CONFIG_PATH: &str = "NEWS_CONFIG_PATH";
pub const ENV_TTL_SECS: &str = "NEWS_TTL_SECS";
pub const ENV_FETCH_TIMEOUT_SECS: &str = "NEWS_FETCH_TIMEOUT_SECS";
pub const ENV_PREFS_PATH: &str = "NEWS_PREFS_PATH";

fn default_ttl_secs() -> u64 {
    60
}
fn default_background_interval_secs() -> u64 {
    60
}
fn default_fetch_timeout_secs() -> u64 {
    12
}
fn default_user_agent() -> String {
    "WellnessNews/1.0 (+https://example.com)".to_string()
}
fn default_max_items_per_source() -> usize {
    20
}
fn default_max_items_per_category() -> usize {
    500
}
fn default_category() -> String {
    "uplifting".to_string()
}
fn default_limit() -> usize {
    60
}
fn default_max_limit() -> usize {
    200
}
fn default_heartbeat_secs() -> u64 {
    15
}
fn default_push_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Minimum gap between two refresh cycles.
    pub ttl_secs: u64,
    /// Cadence of the proactive background refresh.
    pub background_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub max_items_per_source: usize,
    /// 0 disables the bound.
    pub max_items_per_category: usize,
    pub default_category: String,
    pub default_limit: usize,
    pub max_limit: usize,
    pub stream_snapshot_limit: usize,
    pub heartbeat_secs: u64,
    pub push_interval_secs: u64,
    pub prefs_path: Option<PathBuf>,
    /// Standalone TOML/JSON registry file; wins over `sources`.
    pub sources_path: Option<PathBuf>,
    /// `category -> [url, ...]`; falls back to the built-in registry.
    pub sources: Option<BTreeMap<String, Vec<String>>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            background_interval_secs: default_background_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
            max_items_per_source: default_max_items_per_source(),
            max_items_per_category: default_max_items_per_category(),
            default_category: default_category(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            stream_snapshot_limit: default_limit(),
            heartbeat_secs: default_heartbeat_secs(),
            push_interval_secs: default_push_interval_secs(),
            prefs_path: None,
            sources_path: None,
            sources: None,
        }
    }
}

impl AppConfig {
    /// Resolve config: `$NEWS_CONFIG_PATH`, then `config/news.toml`, then defaults.
    /// Env overrides are applied last.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if p.exists() {
                Self::load_from(&p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env();
        Ok(cfg.sanitized())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    fn apply_env(&mut self) {
        if let Some(v) = parse_u64_env(ENV_TTL_SECS) {
            self.ttl_secs = v;
        }
        if let Some(v) = parse_u64_env(ENV_FETCH_TIMEOUT_SECS) {
            self.fetch_timeout_secs = v;
        }
        if let Some(p) = path_env(ENV_PREFS_PATH) {
            self.prefs_path = Some(p);
        }
        if let Some(p) = path_env(ENV_SOURCES_PATH) {
            self.sources_path = Some(p);
        }
    }

    /// Replace values that would stall timers or produce empty responses.
    fn sanitized(mut self) -> Self {
        if self.background_interval_secs == 0 {
            self.background_interval_secs = default_background_interval_secs();
        }
        if self.fetch_timeout_secs == 0 {
            self.fetch_timeout_secs = default_fetch_timeout_secs();
        }
        if self.heartbeat_secs == 0 {
            self.heartbeat_secs = default_heartbeat_secs();
        }
        if self.push_interval_secs == 0 {
            self.push_interval_secs = default_push_interval_secs();
        }
        if self.max_items_per_source == 0 {
            self.max_items_per_source = default_max_items_per_source();
        }
        if self.max_limit == 0 {
            self.max_limit = default_max_limit();
        }
        if self.default_limit == 0 {
            self.default_limit = default_limit();
        }
        self.default_limit = self.default_limit.min(self.max_limit);
        if self.stream_snapshot_limit == 0 {
            self.stream_snapshot_limit = default_limit();
        }
        let cat = self.default_category.trim().to_ascii_lowercase();
        self.default_category = if cat.is_empty() {
            default_category()
        } else {
            cat
        };
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
        self
    }

    /// Registry file, then the inline `[sources]` table, then the built-in list.
    pub fn registry(&self) -> Result<SourceRegistry> {
        if let Some(path) = &self.sources_path {
            if !path.exists() {
                return Err(anyhow!(
                    "sources file {} does not exist",
                    path.display()
                ));
            }
            return SourceRegistry::load_from(path);
        }
        Ok(match &self.sources {
            Some(map) => SourceRegistry::from_map(map.clone()),
            None => SourceRegistry::builtin(),
        })
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_secs)
    }

    /// Optional `max_items_per_category`, `None` meaning unbounded.
    pub fn category_capacity(&self) -> Option<usize> {
        (self.max_items_per_category > 0).then_some(self.max_items_per_category)
    }
}

fn parse_u64_env(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn path_env(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.ttl_secs, 60);
        assert_eq!(cfg.default_category, "uplifting");
        assert_eq!(cfg.default_limit, 60);
        assert_eq!(cfg.heartbeat_secs, 15);
        assert_eq!(cfg.push_interval_secs, 30);
        assert_eq!(cfg.category_capacity(), Some(500));
        assert_eq!(cfg.registry().unwrap(), SourceRegistry::builtin());
    }

    #[test]
    fn zero_intervals_fall_back_to_defaults() {
        let cfg = AppConfig::from_toml_str(
            "heartbeat_secs = 0\npush_interval_secs = 0\nmax_items_per_category = 0\nttl_secs = 0",
        )
        .unwrap();
        assert_eq!(cfg.heartbeat_secs, 15);
        assert_eq!(cfg.push_interval_secs, 30);
        assert_eq!(cfg.category_capacity(), None);
        // a zero TTL is legal: every call refreshes
        assert_eq!(cfg.ttl_secs, 0);
    }

    #[test]
    fn sources_table_overrides_builtin() {
        let cfg = AppConfig::from_toml_str(
            r#"
default_category = " Health "
[sources]
health = ["https://h.org/rss"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.default_category, "health");
        let reg = cfg.registry().unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.categories(), vec!["health".to_string()]);
    }

    #[serial_test::serial]
    #[test]
    fn load_uses_env_path_then_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("news.toml");
        fs::write(&p, "ttl_secs = 5\nfetch_timeout_secs = 3").unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_TTL_SECS, "9");
        env::remove_var(ENV_FETCH_TIMEOUT_SECS);
        env::remove_var(ENV_PREFS_PATH);
        env::remove_var(ENV_SOURCES_PATH);

        let cfg = AppConfig::load().unwrap();
        assert_eq!(cfg.ttl_secs, 9);
        assert_eq!(cfg.fetch_timeout_secs, 3);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(AppConfig::load().is_err());

        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var(ENV_TTL_SECS);
    }
}
