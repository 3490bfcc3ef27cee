// src/ingest/error.rs
use thiserror::Error;

/// Failures that stay inside a refresh cycle: they are logged and counted,
/// never surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("could not parse feed {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl FeedError {
    /// Short label used as a metrics/log dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::Http { .. } => "http",
            FeedError::Status { .. } => "status",
            FeedError::Timeout { .. } => "timeout",
            FeedError::Parse { .. } => "parse",
        }
    }
}
