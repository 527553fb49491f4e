//! Per-article ingestion: dedup, envelope, publish, mark.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, Instrument};
use uuid::Uuid;

use pulse_broker::{BrokerError, MessagePublisher};
use pulse_core::content::RawArticle;
use pulse_core::message::Envelope;
use pulse_core::telemetry::{self, TraceContext};
use pulse_store::{ArticleStore, DedupCache, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What happened to one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Published,
    /// Hot-cache hit; the authoritative store was not consulted.
    DuplicateCached,
    /// Authoritative store already holds this article.
    DuplicateStored,
}

pub struct Ingester {
    articles: Arc<dyn ArticleStore>,
    publisher: Arc<dyn MessagePublisher>,
    dedup: Option<Arc<dyn DedupCache>>,
    content_topic: String,
}

impl Ingester {
    pub fn new(
        articles: Arc<dyn ArticleStore>,
        publisher: Arc<dyn MessagePublisher>,
        dedup: Option<Arc<dyn DedupCache>>,
        content_topic: impl Into<String>,
    ) -> Self {
        Self {
            articles,
            publisher,
            dedup,
            content_topic: content_topic.into(),
        }
    }

    /// Run one article through dedup → envelope → publish → mark.
    ///
    /// `mark_seen` happens after the publish on purpose: a crash in between
    /// yields at most one duplicate downstream, absorbed by the store's
    /// `(source, source_id)` upsert.
    pub async fn ingest(&self, article: RawArticle) -> Result<IngestOutcome, IngestError> {
        let source = article.source.clone();
        let source_id = article.source_id.clone();

        if let Some(dedup) = &self.dedup {
            if dedup.exists(&source, &source_id).await {
                debug!(source, source_id, "duplicate (cache), skipping");
                return Ok(IngestOutcome::DuplicateCached);
            }
        }

        if self.articles.article_exists(&source, &source_id).await? {
            debug!(source, source_id, "duplicate (store), skipping");
            return Ok(IngestOutcome::DuplicateStored);
        }

        let ctx = TraceContext::new_root();
        let envelope = Envelope::Content {
            request_id: Uuid::new_v4().to_string(),
            telemetry_headers: ctx.to_headers(),
            raw_content: article,
        };
        let payload = envelope.encode()?;

        let span = telemetry::producer_span(&self.content_topic, &ctx);
        self.publisher
            .publish(&self.content_topic, &payload)
            .instrument(span)
            .await?;

        if let Some(dedup) = &self.dedup {
            dedup.mark_seen(&source, &source_id).await;
        }

        Ok(IngestOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::testing::{MockArticleStore, MockDedupCache, MockPublisher};
    use pulse_core::telemetry::TRACEPARENT_HEADER;

    fn sample_article() -> RawArticle {
        RawArticle {
            source: "reddit".into(),
            source_id: "abc123".into(),
            source_url: "https://reddit.com/r/soccer/abc123".into(),
            title: "United complete signing".into(),
            content: "Manchester United have completed the transfer.".into(),
            published_at: "2026-07-01T12:00:00Z".parse().unwrap(),
            metadata: HashMap::new(),
        }
    }

    fn build(
        store: Arc<MockArticleStore>,
        publisher: Arc<MockPublisher>,
        dedup: Option<Arc<MockDedupCache>>,
    ) -> Ingester {
        Ingester::new(
            store,
            publisher,
            dedup.map(|d| d as Arc<dyn DedupCache>),
            "content-raw",
        )
    }

    #[tokio::test]
    async fn test_publish_then_mark_seen() {
        let store = Arc::new(MockArticleStore::default());
        let publisher = Arc::new(MockPublisher::default());
        let dedup = Arc::new(MockDedupCache::default());
        let ingester = build(store.clone(), publisher.clone(), Some(dedup.clone()));

        let outcome = ingester.ingest(sample_article()).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Published);

        let published = publisher.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "content-raw");

        // Payload is a well-formed content envelope with trace context.
        let envelope = Envelope::parse(&published[0].1).unwrap();
        assert_eq!(envelope.topic(), "content-raw");
        assert!(!envelope.request_id().is_empty());
        assert!(envelope.telemetry_headers().contains_key(TRACEPARENT_HEADER));

        assert_eq!(
            dedup.marked.lock().unwrap().clone(),
            vec![("reddit".to_string(), "abc123".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_store_check() {
        let store = Arc::new(MockArticleStore::default());
        let publisher = Arc::new(MockPublisher::default());
        let dedup = Arc::new(MockDedupCache::default());
        dedup
            .seen
            .lock()
            .unwrap()
            .push(("reddit".into(), "abc123".into()));
        let ingester = build(store.clone(), publisher.clone(), Some(dedup.clone()));

        let outcome = ingester.ingest(sample_article()).await.unwrap();
        assert_eq!(outcome, IngestOutcome::DuplicateCached);

        // The authoritative store must not even be consulted.
        assert!(store.exists_calls.lock().unwrap().is_empty());
        assert!(publisher.published.lock().unwrap().is_empty());
        assert!(dedup.marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_hit_skips_publish_and_mark() {
        let store = Arc::new(MockArticleStore::default());
        store
            .existing
            .lock()
            .unwrap()
            .push(("reddit".into(), "abc123".into()));
        let publisher = Arc::new(MockPublisher::default());
        let dedup = Arc::new(MockDedupCache::default());
        let ingester = build(store.clone(), publisher.clone(), Some(dedup.clone()));

        let outcome = ingester.ingest(sample_article()).await.unwrap();
        assert_eq!(outcome, IngestOutcome::DuplicateStored);

        assert_eq!(store.exists_calls.lock().unwrap().len(), 1);
        assert!(publisher.published.lock().unwrap().is_empty());
        assert!(dedup.marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_works_without_dedup_cache() {
        let store = Arc::new(MockArticleStore::default());
        let publisher = Arc::new(MockPublisher::default());
        let ingester = build(store.clone(), publisher.clone(), None);

        let outcome = ingester.ingest(sample_article()).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Published);
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }
}
