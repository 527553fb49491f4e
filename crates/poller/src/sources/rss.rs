//! RSS/Atom content source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

use pulse_core::content::RawArticle;

use crate::source::{http_client, ContentSource, SourceError};

/// One named source covering a group of feed URLs (e.g. all ESPN feeds).
pub struct RssSource {
    source_name: String,
    feed_urls: Vec<String>,
    client: reqwest::Client,
}

impl RssSource {
    pub fn new(source_name: impl Into<String>, feed_urls: Vec<String>) -> Self {
        Self {
            source_name: source_name.into(),
            feed_urls,
            client: http_client(),
        }
    }
}

/// Stable per-entry id: first 16 hex chars of sha256 over the entry's link
/// (or id, or title when both are missing).
fn stable_source_id(basis: &str) -> String {
    let digest = Sha256::digest(basis.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Parse one fetched feed document into articles newer than `since`.
fn parse_feed(
    source_name: &str,
    feed_url: &str,
    bytes: &[u8],
    since: Option<DateTime<Utc>>,
) -> Result<Vec<RawArticle>, SourceError> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| SourceError::Feed(format!("{feed_url}: {e}")))?;

    let mut articles = Vec::new();
    for entry in feed.entries {
        let published = entry
            .published
            .or(entry.updated)
            .unwrap_or_else(Utc::now);
        if let Some(since) = since {
            if published <= since {
                continue;
            }
        }

        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();
        let title = entry.title.as_ref().map(|t| t.content.clone()).unwrap_or_default();

        let id_basis = if !link.is_empty() {
            link.clone()
        } else if !entry.id.is_empty() {
            entry.id.clone()
        } else {
            title.clone()
        };

        let content = entry
            .summary
            .as_ref()
            .map(|t| t.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .unwrap_or_default();

        let author = entry
            .authors
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_default();

        articles.push(RawArticle {
            source: source_name.to_string(),
            source_id: stable_source_id(&id_basis),
            source_url: link,
            title,
            content,
            published_at: published,
            metadata: [
                ("feed_url".to_string(), serde_json::json!(feed_url)),
                ("author".to_string(), serde_json::json!(author)),
            ]
            .into_iter()
            .collect(),
        });
    }

    Ok(articles)
}

#[async_trait]
impl ContentSource for RssSource {
    async fn fetch_latest(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawArticle>, SourceError> {
        let mut results = Vec::new();

        // One bad feed must not take the others down.
        for feed_url in &self.feed_urls {
            let bytes = match self.client.get(feed_url).send().await {
                Ok(resp) => match resp.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(feed_url, error = %e, "failed to read feed body");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(feed_url, error = %e, "failed to fetch feed");
                    continue;
                }
            };

            match parse_feed(&self.source_name, feed_url, &bytes, since) {
                Ok(mut articles) => results.append(&mut articles),
                Err(e) => warn!(feed_url, error = %e, "failed to parse feed"),
            }
        }

        Ok(results)
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Sample Sport Feed</title>
    <link>https://sport.example</link>
    <item>
      <title>United complete signing</title>
      <link>https://sport.example/united-signing</link>
      <description>Manchester United have completed the transfer.</description>
      <author>alice@example.com</author>
      <pubDate>Wed, 01 Jul 2026 12:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Old quarter-final recap</title>
      <link>https://sport.example/old-recap</link>
      <description>A recap from long ago.</description>
      <pubDate>Mon, 01 Jun 2026 12:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_extracts_articles() {
        let articles = parse_feed("espn", "https://sport.example/rss", SAMPLE_RSS.as_bytes(), None)
            .unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.source, "espn");
        assert_eq!(first.title, "United complete signing");
        assert_eq!(first.source_url, "https://sport.example/united-signing");
        assert_eq!(first.content, "Manchester United have completed the transfer.");
        assert_eq!(first.source_id.len(), 16);
        assert_eq!(
            first.metadata.get("feed_url").unwrap(),
            &serde_json::json!("https://sport.example/rss")
        );
    }

    #[test]
    fn test_parse_feed_filters_by_since() {
        let since: DateTime<Utc> = "2026-06-15T00:00:00Z".parse().unwrap();
        let articles = parse_feed(
            "espn",
            "https://sport.example/rss",
            SAMPLE_RSS.as_bytes(),
            Some(since),
        )
        .unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "United complete signing");
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        let err = parse_feed("espn", "https://sport.example/rss", b"not xml", None).unwrap_err();
        assert!(matches!(err, SourceError::Feed(_)));
    }

    #[test]
    fn test_stable_source_id_is_deterministic() {
        let a = stable_source_id("https://sport.example/united-signing");
        let b = stable_source_id("https://sport.example/united-signing");
        let c = stable_source_id("https://sport.example/other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
