//! Periodic fan-out fetch across content sources.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::ingest::Ingester;
use crate::source::ContentSource;

pub struct Poller {
    sources: Vec<Arc<dyn ContentSource>>,
    ingester: Arc<Ingester>,
    interval: Duration,
    running: AtomicBool,
    stop_notify: Notify,
    /// In-process cursor only; after a restart sources are asked for
    /// "latest" and the dedup layer suppresses replays.
    last_poll: Mutex<Option<DateTime<Utc>>>,
}

impl Poller {
    pub fn new(
        sources: Vec<Arc<dyn ContentSource>>,
        ingester: Arc<Ingester>,
        interval: Duration,
    ) -> Self {
        Self {
            sources,
            ingester,
            interval,
            running: AtomicBool::new(true),
            stop_notify: Notify::new(),
            last_poll: Mutex::new(None),
        }
    }

    pub async fn run(&self) {
        info!(sources = self.sources.len(), "content poller started");

        while self.running.load(Ordering::SeqCst) {
            self.poll_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.stop_notify.notified() => break,
            }
        }

        info!("content poller stopped");
    }

    /// One cycle: fetch every source in parallel, isolate failures per
    /// source, feed returned articles sequentially through the ingester,
    /// then advance the cursor.
    pub async fn poll_cycle(&self) {
        let since = *self.last_poll.lock().unwrap();

        let fetches: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                tokio::spawn(async move {
                    let name = source.source_name().to_string();
                    let result = source.fetch_latest(since).await;
                    (name, result)
                })
            })
            .collect();

        for fetch in fetches {
            match fetch.await {
                Err(e) => error!(error = %e, "source fetch task failed"),
                Ok((name, Err(e))) => error!(source = %name, error = %e, "error polling source"),
                Ok((name, Ok(items))) => {
                    info!(source = %name, count = items.len(), "fetched items");
                    for item in items {
                        match self.ingester.ingest(item).await {
                            Ok(outcome) => {
                                debug!(source = %name, outcome = ?outcome, "article ingested")
                            }
                            Err(e) => error!(source = %name, error = %e, "error ingesting item"),
                        }
                    }
                }
            }
        }

        *self.last_poll.lock().unwrap() = Some(Utc::now());
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }

    pub fn last_poll(&self) -> Option<DateTime<Utc>> {
        *self.last_poll.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    use crate::source::SourceError;
    use crate::testing::{MockArticleStore, MockDedupCache, MockPublisher};
    use pulse_core::content::RawArticle;
    use pulse_store::DedupCache;

    struct FixedSource {
        name: String,
        articles: Vec<RawArticle>,
        since_seen: Mutex<Vec<Option<DateTime<Utc>>>>,
    }

    #[async_trait]
    impl ContentSource for FixedSource {
        async fn fetch_latest(
            &self,
            since: Option<DateTime<Utc>>,
        ) -> Result<Vec<RawArticle>, SourceError> {
            self.since_seen.lock().unwrap().push(since);
            Ok(self.articles.clone())
        }

        fn source_name(&self) -> &str {
            &self.name
        }
    }

    struct FailingSource;

    #[async_trait]
    impl ContentSource for FailingSource {
        async fn fetch_latest(
            &self,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<RawArticle>, SourceError> {
            Err(SourceError::Feed("feed is down".into()))
        }

        fn source_name(&self) -> &str {
            "broken"
        }
    }

    fn article(source_id: &str) -> RawArticle {
        RawArticle {
            source: "espn".into(),
            source_id: source_id.into(),
            source_url: format!("https://espn.example/{source_id}"),
            title: "t".into(),
            content: "c".into(),
            published_at: "2026-07-01T12:00:00Z".parse().unwrap(),
            metadata: HashMap::new(),
        }
    }

    fn ingester(publisher: Arc<MockPublisher>) -> Arc<Ingester> {
        Arc::new(Ingester::new(
            Arc::new(MockArticleStore::default()),
            publisher,
            Some(Arc::new(MockDedupCache::default()) as Arc<dyn DedupCache>),
            "content-raw",
        ))
    }

    #[tokio::test]
    async fn test_cycle_ingests_all_sources() {
        let publisher = Arc::new(MockPublisher::default());
        let poller = Poller::new(
            vec![
                Arc::new(FixedSource {
                    name: "espn".into(),
                    articles: vec![article("a1"), article("a2")],
                    since_seen: Mutex::new(vec![]),
                }),
                Arc::new(FixedSource {
                    name: "bbc_sport".into(),
                    articles: vec![article("b1")],
                    since_seen: Mutex::new(vec![]),
                }),
            ],
            ingester(publisher.clone()),
            Duration::from_secs(300),
        );

        assert!(poller.last_poll().is_none());
        poller.poll_cycle().await;

        assert_eq!(publisher.published.lock().unwrap().len(), 3);
        assert!(poller.last_poll().is_some());
    }

    #[tokio::test]
    async fn test_one_failing_source_does_not_abort_cycle() {
        let publisher = Arc::new(MockPublisher::default());
        let poller = Poller::new(
            vec![
                Arc::new(FailingSource),
                Arc::new(FixedSource {
                    name: "espn".into(),
                    articles: vec![article("a1")],
                    since_seen: Mutex::new(vec![]),
                }),
            ],
            ingester(publisher.clone()),
            Duration::from_secs(300),
        );

        poller.poll_cycle().await;
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
        assert!(poller.last_poll().is_some());
    }

    #[tokio::test]
    async fn test_cursor_advances_between_cycles() {
        let publisher = Arc::new(MockPublisher::default());
        let source = Arc::new(FixedSource {
            name: "espn".into(),
            articles: vec![],
            since_seen: Mutex::new(vec![]),
        });
        let poller = Poller::new(
            vec![source.clone()],
            ingester(publisher),
            Duration::from_secs(300),
        );

        poller.poll_cycle().await;
        poller.poll_cycle().await;

        let seen = source.since_seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        // First cycle has no lower bound; the second carries the cursor.
        assert!(seen[0].is_none());
        assert!(seen[1].is_some());
    }

    #[tokio::test]
    async fn test_stop_ends_run_loop() {
        let publisher = Arc::new(MockPublisher::default());
        let poller = Arc::new(Poller::new(
            vec![],
            ingester(publisher),
            Duration::from_secs(300),
        ));

        let run = tokio::spawn({
            let poller = Arc::clone(&poller);
            async move { poller.run().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        poller.stop();
        tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .expect("poller should stop promptly")
            .unwrap();
    }
}
