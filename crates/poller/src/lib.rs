pub mod ingest;
pub mod poller;
pub mod source;
pub mod sources;

pub use ingest::{IngestOutcome, Ingester};
pub use poller::Poller;
pub use source::{ContentSource, SourceError};
pub use sources::build_content_sources;

#[cfg(test)]
pub(crate) mod testing {
    //! Shared in-memory fakes for ingester and poller tests.

    use std::sync::Mutex;

    use async_trait::async_trait;

    use pulse_broker::{BrokerError, MessagePublisher};
    use pulse_core::content::ProcessedArticle;
    use pulse_store::{ArticleQuery, ArticleStore, DedupCache, StoreError};

    #[derive(Default)]
    pub struct MockArticleStore {
        /// `(source, source_id)` pairs the store claims to already hold.
        pub existing: Mutex<Vec<(String, String)>>,
        pub exists_calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ArticleStore for MockArticleStore {
        async fn store_article(&self, _article: &ProcessedArticle) -> Result<(), StoreError> {
            Ok(())
        }

        async fn article_exists(
            &self,
            source: &str,
            source_id: &str,
        ) -> Result<bool, StoreError> {
            self.exists_calls
                .lock()
                .unwrap()
                .push((source.to_string(), source_id.to_string()));
            Ok(self
                .existing
                .lock()
                .unwrap()
                .contains(&(source.to_string(), source_id.to_string())))
        }

        async fn query_articles(
            &self,
            _query: &ArticleQuery,
        ) -> Result<Vec<ProcessedArticle>, StoreError> {
            Ok(vec![])
        }

        async fn search_articles(
            &self,
            _text: &str,
            _limit: i64,
        ) -> Result<Vec<ProcessedArticle>, StoreError> {
            Ok(vec![])
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    pub struct MockDedupCache {
        pub seen: Mutex<Vec<(String, String)>>,
        pub marked: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl DedupCache for MockDedupCache {
        async fn exists(&self, source: &str, source_id: &str) -> bool {
            self.seen
                .lock()
                .unwrap()
                .contains(&(source.to_string(), source_id.to_string()))
        }

        async fn mark_seen(&self, source: &str, source_id: &str) {
            self.marked
                .lock()
                .unwrap()
                .push((source.to_string(), source_id.to_string()));
        }
    }

    #[derive(Default)]
    pub struct MockPublisher {
        pub published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessagePublisher for MockPublisher {
        async fn publish(&self, topic: &str, payload: &str) -> Result<(), BrokerError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }
}
