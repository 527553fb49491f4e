use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional retrieval constraints attached to a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_to: Option<DateTime<Utc>>,
}

/// A natural-language question submitted through the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<QueryFilters>,
}

/// Lifecycle label of a request as it traverses the pipeline.
///
/// Transitions are strictly forward: Gateway → QueryProcessing → Completed,
/// with Failed as an alternative terminal from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStage {
    Gateway,
    QueryProcessing,
    Completed,
    Failed,
}

impl RequestStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStage::Completed | RequestStage::Failed)
    }

    /// Whether moving from `self` to `next` is a legal stage transition.
    /// Gateway may not skip straight to Completed.
    pub fn can_transition_to(self, next: RequestStage) -> bool {
        use RequestStage::*;
        match (self, next) {
            (Gateway, QueryProcessing) => true,
            (Gateway, Failed) => true,
            (QueryProcessing, Completed) => true,
            (QueryProcessing, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RequestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStage::Gateway => write!(f, "Gateway"),
            RequestStage::QueryProcessing => write!(f, "QueryProcessing"),
            RequestStage::Completed => write!(f, "Completed"),
            RequestStage::Failed => write!(f, "Failed"),
        }
    }
}

/// A retrieved article cited in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub title: String,
    pub source: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
}

/// The synthesized answer for a completed request. Emitted exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceReference>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub latency_ms: f64,
}

/// State record of a request, keyed by `request_id` in the state store.
///
/// `query_result` is present iff `stage == Completed`; `error_message` is
/// present iff `stage == Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRequest {
    pub request_id: String,
    pub query_request: QueryRequest,
    pub stage: RequestStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_result: Option<QueryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessedRequest {
    /// Fresh record at the Gateway stage.
    pub fn new(request_id: String, query_request: QueryRequest) -> Self {
        let now = Utc::now();
        Self {
            request_id,
            query_request,
            stage: RequestStage::Gateway,
            query_result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Gateway acceptance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Accepted,
}

/// Response body for a submitted query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestResponse {
    pub request_id: String,
    pub status: RequestStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions_forward_only() {
        use RequestStage::*;
        assert!(Gateway.can_transition_to(QueryProcessing));
        assert!(Gateway.can_transition_to(Failed));
        assert!(QueryProcessing.can_transition_to(Completed));
        assert!(QueryProcessing.can_transition_to(Failed));

        // No skipping, no backwards, no leaving terminals.
        assert!(!Gateway.can_transition_to(Completed));
        assert!(!QueryProcessing.can_transition_to(Gateway));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(QueryProcessing));
        assert!(!Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_stage_serializes_as_variant_name() {
        assert_eq!(
            serde_json::to_string(&RequestStage::QueryProcessing).unwrap(),
            "\"QueryProcessing\""
        );
        let stage: RequestStage = serde_json::from_str("\"Failed\"").unwrap();
        assert_eq!(stage, RequestStage::Failed);
    }

    #[test]
    fn test_query_request_without_filters() {
        let req: QueryRequest = serde_json::from_str(r#"{"query":"latest united news"}"#).unwrap();
        assert_eq!(req.query, "latest united news");
        assert!(req.filters.is_none());
        // Absent filters stay absent on the wire.
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("filters").is_none());
    }

    #[test]
    fn test_query_request_with_filters_roundtrip() {
        let json = r#"{
            "query": "injuries this week",
            "filters": {
                "sources": ["reddit"],
                "date_from": "2026-06-01T00:00:00Z",
                "date_to": "2026-06-08T00:00:00Z"
            }
        }"#;
        let req: QueryRequest = serde_json::from_str(json).unwrap();
        let filters = req.filters.as_ref().unwrap();
        assert_eq!(filters.sources.as_deref(), Some(&["reddit".to_string()][..]));
        assert!(filters.categories.is_none());
        let back: QueryRequest =
            serde_json::from_str(&serde_json::to_string(&req).unwrap()).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn test_new_processed_request_invariants() {
        let req = ProcessedRequest::new(
            "req-1".into(),
            QueryRequest {
                query: "who won".into(),
                filters: None,
            },
        );
        assert_eq!(req.stage, RequestStage::Gateway);
        assert!(req.query_result.is_none());
        assert!(req.error_message.is_none());
        assert!(req.updated_at >= req.created_at);
    }

    #[test]
    fn test_processed_request_roundtrip() {
        let mut req = ProcessedRequest::new(
            "req-2".into(),
            QueryRequest {
                query: "latest united news".into(),
                filters: None,
            },
        );
        req.stage = RequestStage::Completed;
        req.query_result = Some(QueryResult {
            answer: "United won.".into(),
            sources: vec![],
            metadata: HashMap::new(),
            model: "llama3.2".into(),
            latency_ms: 321.5,
        });
        let json = serde_json::to_string(&req).unwrap();
        let back: ProcessedRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn test_request_response_shape() {
        let resp = RequestResponse {
            request_id: "abc".into(),
            status: RequestStatus::Accepted,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "Accepted");
        assert_eq!(json["request_id"], "abc");
    }
}
