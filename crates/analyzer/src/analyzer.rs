//! Content analyzer: enriches raw articles via LLM and persists them.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn, Instrument};

use pulse_broker::MessageHandler;
use pulse_core::content::{
    normalize_entity_name, ArticleEntity, ProcessedArticle, RawArticle, Sentiment,
};
use pulse_core::message::Envelope;
use pulse_core::telemetry;
use pulse_llm::{InferenceConfig, LlmError, LlmProvider};
use pulse_store::{ArticleStore, StoreError};

const CONTENT_PROMPT_LIMIT: usize = 3000;
const ANALYSIS_TEMPERATURE: f32 = 0.3;

const PROCESSING_PROMPT: &str = r#"Analyze this sports article and return a JSON object with:
- "summary": A 2-3 sentence summary
- "entities": Array of extracted entities (see rules below)
- "categories": Array of topic tags (e.g. "transfer", "injury", "match_result", "contract", "retirement")
- "sentiment": "positive"|"negative"|"neutral"

Entity extraction rules:
1. Each entity: {"name": str, "type": "player"|"team"|"league"|"sport"|"venue", "normalized": str}
2. "normalized" must be lowercase with underscores, no special characters (e.g. "kylian_mbappe", "premier_league")
3. CRITICAL: Extract BOTH explicit AND implicit entities. Use your world knowledge:
   - If a player is mentioned, also add their current team, league, and sport as separate entities
   - If a team is mentioned, also add their league and sport
   - If a league is mentioned, also add the sport
4. Extract ALL mentioned players, teams, leagues, sports, and venues — not just the main subject

Example: An article mentioning only "LeBron James" should produce:
- {"name": "LeBron James", "type": "player", "normalized": "lebron_james"}
- {"name": "Los Angeles Lakers", "type": "team", "normalized": "los_angeles_lakers"}
- {"name": "NBA", "type": "league", "normalized": "nba"}
- {"name": "Basketball", "type": "sport", "normalized": "basketball"}

Article title: {title}
Article content: {content}

Return ONLY valid JSON, no markdown."#;

#[derive(Debug, Error)]
enum AnalyzeError {
    #[error("inference failed: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed enrichment response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Enrichment JSON returned by the model; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct Enrichment {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    sentiment: Sentiment,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    entity_type: String,
    #[serde(default)]
    normalized: Option<String>,
}

/// Truncate to at most `max` characters on a char boundary.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Analyzes raw content: LLM enrichment → article store.
pub struct ContentAnalyzer {
    articles: Arc<dyn ArticleStore>,
    llm: Arc<dyn LlmProvider>,
    model: String,
}

impl ContentAnalyzer {
    pub fn new(
        articles: Arc<dyn ArticleStore>,
        llm: Arc<dyn LlmProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            articles,
            llm,
            model: model.into(),
        }
    }

    async fn process(&self, request_id: &str, raw: RawArticle) -> Result<(), AnalyzeError> {
        let started = Instant::now();

        let prompt = PROCESSING_PROMPT
            .replace("{title}", &raw.title)
            .replace("{content}", truncate_chars(&raw.content, CONTENT_PROMPT_LIMIT));
        let config = InferenceConfig::new(&self.model, ANALYSIS_TEMPERATURE);
        let output = self
            .llm
            .run_inference(&prompt, &config)
            .instrument(telemetry::client_span("llm", "run_inference"))
            .await?;
        let enrichment: Enrichment = serde_json::from_str(&output.response)?;

        let entities = enrichment
            .entities
            .into_iter()
            .map(|e| {
                let normalized = e
                    .normalized
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| normalize_entity_name(&e.name));
                ArticleEntity {
                    name: e.name,
                    entity_type: e.entity_type,
                    normalized,
                }
            })
            .collect();

        let now = Utc::now();
        let article = ProcessedArticle {
            source: raw.source,
            source_id: raw.source_id,
            source_url: raw.source_url,
            title: raw.title,
            raw_content: raw.content,
            summary: enrichment.summary,
            entities,
            categories: enrichment.categories,
            sentiment: enrichment.sentiment,
            published_at: raw.published_at,
            ingested_at: now,
            processed_at: now,
            processing_model: self.model.clone(),
            metadata: raw.metadata,
        };

        self.articles
            .store_article(&article)
            .instrument(telemetry::client_span("mongodb", "store_article"))
            .await?;

        info!(
            request_id,
            source = %article.source,
            source_id = %article.source_id,
            latency_ms = started.elapsed().as_millis() as u64,
            "content processed"
        );
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for ContentAnalyzer {
    async fn handle(&self, message: Envelope) -> bool {
        let (request_id, raw) = match message {
            Envelope::Content {
                request_id,
                raw_content,
                ..
            } => (request_id, raw_content),
            other => {
                warn!(topic = other.topic(), "unexpected message kind for content analyzer");
                return false;
            }
        };

        // Content ingestion is best-effort: any failure is logged and the
        // message is still acked upstream.
        match self.process(&request_id, raw).await {
            Ok(()) => true,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "failed to process content");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use pulse_core::request::QueryRequest;
    use pulse_llm::InferenceResult;
    use pulse_store::ArticleQuery;

    #[derive(Debug)]
    struct MockLlm {
        response: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockLlm {
        fn returning(response: &str) -> Self {
            Self {
                response: Ok(response.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err("model unavailable".to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        async fn run_inference(
            &self,
            prompt: &str,
            config: &InferenceConfig,
        ) -> Result<InferenceResult, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.response {
                Ok(response) => Ok(InferenceResult {
                    response: response.clone(),
                    model: config.model.clone(),
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                    latency_ms: 12.0,
                }),
                Err(message) => Err(LlmError::ParseError(message.clone())),
            }
        }
    }

    #[derive(Default)]
    struct MockStore {
        stored: Mutex<Vec<ProcessedArticle>>,
    }

    #[async_trait]
    impl ArticleStore for MockStore {
        async fn store_article(&self, article: &ProcessedArticle) -> Result<(), StoreError> {
            self.stored.lock().unwrap().push(article.clone());
            Ok(())
        }

        async fn article_exists(&self, _: &str, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn query_articles(
            &self,
            _: &ArticleQuery,
        ) -> Result<Vec<ProcessedArticle>, StoreError> {
            Ok(vec![])
        }

        async fn search_articles(
            &self,
            _: &str,
            _: i64,
        ) -> Result<Vec<ProcessedArticle>, StoreError> {
            Ok(vec![])
        }

        async fn is_healthy(&self) -> bool {
            true
        }
    }

    fn content_message(content: &str) -> Envelope {
        Envelope::Content {
            request_id: "req-1".into(),
            telemetry_headers: HashMap::new(),
            raw_content: RawArticle {
                source: "reddit".into(),
                source_id: "abc123".into(),
                source_url: "https://reddit.com/r/soccer/abc123".into(),
                title: "United complete signing".into(),
                content: content.into(),
                published_at: "2026-07-01T12:00:00Z".parse().unwrap(),
                metadata: HashMap::new(),
            },
        }
    }

    const SAMPLE_ENRICHMENT: &str = r#"{
        "summary": "Manchester United completed a transfer.",
        "entities": [
            {"name": "Manchester United", "type": "team", "normalized": "manchester_united"}
        ],
        "categories": ["transfer"],
        "sentiment": "positive"
    }"#;

    #[tokio::test]
    async fn test_happy_path_stores_enriched_article() {
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::returning(SAMPLE_ENRICHMENT));
        let analyzer = ContentAnalyzer::new(store.clone(), llm, "llama3.2");

        let handled = analyzer
            .handle(content_message("Manchester United have completed the transfer."))
            .await;
        assert!(handled);

        let stored = store.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        let article = &stored[0];
        assert_eq!(article.entities.len(), 1);
        assert_eq!(article.entities[0].normalized, "manchester_united");
        assert_eq!(article.sentiment, Sentiment::Positive);
        assert_eq!(article.categories, vec!["transfer".to_string()]);
        assert_eq!(article.processing_model, "llama3.2");
        assert_eq!(article.raw_content, "Manchester United have completed the transfer.");
        assert!(article.processed_at >= article.published_at);
    }

    #[tokio::test]
    async fn test_missing_keys_use_defaults() {
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::returning("{}"));
        let analyzer = ContentAnalyzer::new(store.clone(), llm, "llama3.2");

        assert!(analyzer.handle(content_message("some content")).await);

        let stored = store.stored.lock().unwrap();
        let article = &stored[0];
        assert_eq!(article.summary, "");
        assert!(article.entities.is_empty());
        assert!(article.categories.is_empty());
        assert_eq!(article.sentiment, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn test_normalized_derived_when_absent() {
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::returning(
            r#"{"entities": [{"name": "Premier League", "type": "league"}]}"#,
        ));
        let analyzer = ContentAnalyzer::new(store.clone(), llm, "llama3.2");

        assert!(analyzer.handle(content_message("c")).await);
        let stored = store.stored.lock().unwrap();
        assert_eq!(stored[0].entities[0].normalized, "premier_league");
    }

    #[tokio::test]
    async fn test_malformed_response_fails_handler() {
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::returning("I am not JSON, sorry"));
        let analyzer = ContentAnalyzer::new(store.clone(), llm, "llama3.2");

        assert!(!analyzer.handle(content_message("c")).await);
        assert!(store.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_fails_handler() {
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::failing());
        let analyzer = ContentAnalyzer::new(store.clone(), llm, "llama3.2");

        assert!(!analyzer.handle(content_message("c")).await);
        assert!(store.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_truncates_long_content() {
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::returning("{}"));
        let analyzer = ContentAnalyzer::new(store.clone(), llm.clone(), "llama3.2");

        let long_content = "x".repeat(5000);
        assert!(analyzer.handle(content_message(&long_content)).await);

        let prompts = llm.prompts.lock().unwrap();
        let xs = prompts[0].chars().filter(|c| *c == 'x').count();
        assert_eq!(xs, CONTENT_PROMPT_LIMIT);
        assert!(prompts[0].contains("United complete signing"));

        // The stored article keeps the full raw content.
        assert_eq!(store.stored.lock().unwrap()[0].raw_content.chars().count(), 5000);
    }

    #[tokio::test]
    async fn test_query_message_rejected() {
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::returning("{}"));
        let analyzer = ContentAnalyzer::new(store.clone(), llm, "llama3.2");

        let message = Envelope::Query {
            request_id: "req-9".into(),
            telemetry_headers: HashMap::new(),
            query_request: QueryRequest {
                query: "who won".into(),
                filters: None,
            },
        };
        assert!(!analyzer.handle(message).await);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // Multi-byte characters are never split.
        assert_eq!(truncate_chars("ééééé", 3), "ééé");
    }
}
