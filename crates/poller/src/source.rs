//! Content source abstraction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use pulse_core::content::RawArticle;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for outbound feed fetches, with a bounded total timeout.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Feed(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("response parse error: {0}")]
    Parse(String),
}

/// A polymorphic feed of articles.
///
/// `since` is a lower bound on `published_at`; `None` asks for whatever the
/// source considers latest (used on the first cycle after a restart, where
/// the dedup layer suppresses replays).
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_latest(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawArticle>, SourceError>;

    fn source_name(&self) -> &str;
}
