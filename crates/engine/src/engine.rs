//! Query engine: intent parsing → article retrieval → answer synthesis.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};

use pulse_broker::MessageHandler;
use pulse_core::content::ProcessedArticle;
use pulse_core::message::Envelope;
use pulse_core::request::{QueryRequest, QueryResult, RequestStage, SourceReference};
use pulse_core::telemetry;
use pulse_llm::{InferenceConfig, LlmError, LlmProvider};
use pulse_store::{ArticleQuery, ArticleStore, StateStore, StoreError};

const INTENT_TEMPERATURE: f32 = 0.2;
const SYNTHESIS_TEMPERATURE: f32 = 0.5;
const RETRIEVAL_LIMIT: i64 = 20;
const SYNTHESIS_ARTICLE_LIMIT: usize = 10;
const SOURCE_REFERENCE_LIMIT: usize = 5;
const SUMMARY_FALLBACK_CHARS: usize = 500;

const NO_RESULTS_ANSWER: &str =
    "I couldn't find any relevant articles to answer your question.";

const INTENT_PROMPT: &str = r#"Parse this sports query and return a JSON object with:
- "entities": Array of normalized entity strings to search (e.g. ["manchester_united", "cristiano_ronaldo"])
- "categories": Array of category strings (e.g. ["transfer", "injury", "match_result"])
- "entity_type": If the query asks for a specific type of entity, set this to "player"|"team"|"league"|"sport"|"venue", otherwise null
- "date_context": "recent" | "today" | "this_week" | "this_month" | null
- "search_terms": A text search query string for full-text search

Examples:
- "Show me all NBA teams" -> {"entities": ["nba"], "entity_type": "team", ...}
- "What players are in the Premier League?" -> {"entities": ["premier_league"], "entity_type": "player", ...}
- "Latest Manchester United news" -> {"entities": ["manchester_united"], "entity_type": null, ...}

Query: {query}

Return ONLY valid JSON, no markdown."#;

const SYNTHESIS_PROMPT: &str = r#"Based on the following sports articles, answer the user's question.
Be concise, factual, and cite your sources by mentioning the article titles.

User question: {query}

Articles:
{articles}

Provide a clear, well-structured answer."#;

#[derive(Debug, Error)]
enum EngineError {
    #[error("inference failed: {0}")]
    Llm(#[from] LlmError),

    #[error("malformed intent response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Intent JSON returned by the model; every key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Intent {
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    entity_type: Option<String>,
    #[serde(default)]
    date_context: Option<String>,
    #[serde(default)]
    search_terms: Option<String>,
}

impl Intent {
    fn has_structured_filters(&self) -> bool {
        !self.entities.is_empty()
            || !self.categories.is_empty()
            || self.entity_type.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Format a date filter the same way stored timestamps serialize, so string
/// range comparisons in the store line up.
fn rfc3339_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Orchestrates query processing end to end and writes the terminal state.
pub struct QueryEngine {
    state: Arc<dyn StateStore>,
    articles: Arc<dyn ArticleStore>,
    llm: Arc<dyn LlmProvider>,
    model: String,
}

impl QueryEngine {
    pub fn new(
        state: Arc<dyn StateStore>,
        articles: Arc<dyn ArticleStore>,
        llm: Arc<dyn LlmProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            state,
            articles,
            llm,
            model: model.into(),
        }
    }

    async fn orchestrate(&self, request_id: &str, request: QueryRequest) -> bool {
        let started = Instant::now();
        match self.run_query(request_id, &request, started).await {
            Ok(()) => {
                info!(
                    request_id,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "query completed"
                );
                true
            }
            Err(e) => {
                self.record_failure(request_id, &e).await;
                false
            }
        }
    }

    async fn run_query(
        &self,
        request_id: &str,
        request: &QueryRequest,
        started: Instant,
    ) -> Result<(), EngineError> {
        let updated = self
            .state
            .update(request_id, json!({"stage": RequestStage::QueryProcessing}))
            .await?;
        if updated.is_none() {
            warn!(request_id, "no state record for request, continuing anyway");
        }

        let intent = self.parse_intent(&request.query).await?;
        let articles = self.retrieve_articles(&intent, request).await?;
        let answer = self.synthesize_answer(&request.query, &articles).await?;

        let sources: Vec<SourceReference> = articles
            .iter()
            .take(SOURCE_REFERENCE_LIMIT)
            .map(|a| SourceReference {
                title: a.title.clone(),
                source: a.source.clone(),
                source_url: a.source_url.clone(),
                published_at: a.published_at,
            })
            .collect();

        let result = QueryResult {
            answer,
            sources,
            metadata: [("intent".to_string(), serde_json::to_value(&intent)?)]
                .into_iter()
                .collect(),
            model: self.model.clone(),
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        // Terminal result and stage land in one atomic update.
        self.state
            .update(
                request_id,
                json!({"query_result": result, "stage": RequestStage::Completed}),
            )
            .await?;
        Ok(())
    }

    async fn parse_intent(&self, query: &str) -> Result<Intent, EngineError> {
        let prompt = INTENT_PROMPT.replace("{query}", query);
        let config = InferenceConfig::new(&self.model, INTENT_TEMPERATURE);
        let output = self
            .llm
            .run_inference(&prompt, &config)
            .instrument(telemetry::client_span("llm", "parse_intent"))
            .await?;
        Ok(serde_json::from_str(&output.response)?)
    }

    /// Structured query first; full-text search when it is empty or the
    /// intent has nothing structured to go on.
    async fn retrieve_articles(
        &self,
        intent: &Intent,
        request: &QueryRequest,
    ) -> Result<Vec<ProcessedArticle>, EngineError> {
        let mut articles = Vec::new();

        if intent.has_structured_filters() {
            let filters = request.filters.as_ref();
            let query = ArticleQuery {
                entities: (!intent.entities.is_empty()).then(|| intent.entities.clone()),
                categories: (!intent.categories.is_empty()).then(|| intent.categories.clone()),
                sources: filters.and_then(|f| f.sources.clone()),
                date_from: filters.and_then(|f| f.date_from.map(rfc3339_utc)),
                date_to: filters.and_then(|f| f.date_to.map(rfc3339_utc)),
                entity_type: intent.entity_type.clone().filter(|t| !t.is_empty()),
                limit: Some(RETRIEVAL_LIMIT),
            };
            articles = self.articles.query_articles(&query).await?;
        }

        if articles.is_empty() {
            let terms = intent
                .search_terms
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(&request.query);
            articles = self.articles.search_articles(terms, RETRIEVAL_LIMIT).await?;
        }

        Ok(articles)
    }

    async fn synthesize_answer(
        &self,
        query: &str,
        articles: &[ProcessedArticle],
    ) -> Result<String, EngineError> {
        if articles.is_empty() {
            return Ok(NO_RESULTS_ANSWER.to_string());
        }

        let articles_text = articles
            .iter()
            .take(SYNTHESIS_ARTICLE_LIMIT)
            .map(|a| {
                let summary = if a.summary.is_empty() {
                    a.raw_content.chars().take(SUMMARY_FALLBACK_CHARS).collect()
                } else {
                    a.summary.clone()
                };
                format!("Title: {}\nSource: {}\nSummary: {}", a.title, a.source, summary)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = SYNTHESIS_PROMPT
            .replace("{query}", query)
            .replace("{articles}", &articles_text);
        let config = InferenceConfig::new(&self.model, SYNTHESIS_TEMPERATURE);
        let output = self
            .llm
            .run_inference(&prompt, &config)
            .instrument(telemetry::client_span("llm", "synthesize_answer"))
            .await?;
        Ok(output.response)
    }

    /// Best effort: failing to record a failure is only logged.
    async fn record_failure(&self, request_id: &str, error: &EngineError) {
        error!(request_id, error = %error, "query failed");
        let patch = json!({
            "stage": RequestStage::Failed,
            "error_message": error.to_string(),
        });
        if let Err(e) = self.state.update(request_id, patch).await {
            error!(request_id, error = %e, "failed to record query failure");
        }
    }
}

#[async_trait]
impl MessageHandler for QueryEngine {
    async fn handle(&self, message: Envelope) -> bool {
        let (request_id, request) = match message {
            Envelope::Query {
                request_id,
                query_request,
                ..
            } => (request_id, query_request),
            other => {
                warn!(topic = other.topic(), "unexpected message kind for query engine");
                return false;
            }
        };
        self.orchestrate(&request_id, request).await
    }
}
