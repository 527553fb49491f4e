//! Broker message envelopes.
//!
//! Every payload on the wire is a JSON object tagged by `topic_name`; unknown
//! topic names fail to parse and are treated as malformed messages by the
//! consumer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::content::RawArticle;
use crate::request::QueryRequest;

/// Logical topic carrying raw fetched articles.
pub const CONTENT_RAW_TOPIC: &str = "content-raw";
/// Logical topic carrying user queries.
pub const QUERY_TOPIC: &str = "query";

/// A typed broker payload, tagged by `topic_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic_name")]
pub enum Envelope {
    #[serde(rename = "content-raw")]
    Content {
        request_id: String,
        #[serde(default)]
        telemetry_headers: HashMap<String, String>,
        raw_content: RawArticle,
    },
    #[serde(rename = "query")]
    Query {
        request_id: String,
        #[serde(default)]
        telemetry_headers: HashMap<String, String>,
        query_request: QueryRequest,
    },
}

impl Envelope {
    pub fn request_id(&self) -> &str {
        match self {
            Envelope::Content { request_id, .. } => request_id,
            Envelope::Query { request_id, .. } => request_id,
        }
    }

    pub fn telemetry_headers(&self) -> &HashMap<String, String> {
        match self {
            Envelope::Content {
                telemetry_headers, ..
            } => telemetry_headers,
            Envelope::Query {
                telemetry_headers, ..
            } => telemetry_headers,
        }
    }

    /// Logical topic this envelope belongs on.
    pub fn topic(&self) -> &'static str {
        match self {
            Envelope::Content { .. } => CONTENT_RAW_TOPIC,
            Envelope::Query { .. } => QUERY_TOPIC,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

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

    #[test]
    fn test_content_envelope_roundtrip() {
        let msg = Envelope::Content {
            request_id: "req-1".into(),
            telemetry_headers: HashMap::from([(
                "traceparent".to_string(),
                "00-0123456789abcdef0123456789abcdef-0123456789abcdef-01".to_string(),
            )]),
            raw_content: sample_article(),
        };
        let encoded = msg.encode().unwrap();
        let parsed = Envelope::parse(&encoded).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.topic(), "content-raw");
        assert_eq!(parsed.request_id(), "req-1");
    }

    #[test]
    fn test_query_envelope_roundtrip() {
        let msg = Envelope::Query {
            request_id: "req-2".into(),
            telemetry_headers: HashMap::new(),
            query_request: QueryRequest {
                query: "latest united news".into(),
                filters: None,
            },
        };
        let encoded = msg.encode().unwrap();
        let parsed = Envelope::parse(&encoded).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.topic(), "query");
    }

    #[test]
    fn test_envelope_tag_on_wire() {
        let msg = Envelope::Query {
            request_id: "req-3".into(),
            telemetry_headers: HashMap::new(),
            query_request: QueryRequest {
                query: "who won".into(),
                filters: None,
            },
        };
        let json: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["topic_name"], "query");
        assert_eq!(json["query_request"]["query"], "who won");
    }

    #[test]
    fn test_unknown_topic_is_malformed() {
        let body = r#"{"topic_name":"mystery","request_id":"r","payload":{}}"#;
        assert!(Envelope::parse(body).is_err());
    }

    #[test]
    fn test_missing_telemetry_headers_default_empty() {
        let body = r#"{
            "topic_name": "query",
            "request_id": "req-4",
            "query_request": {"query": "scores"}
        }"#;
        let parsed = Envelope::parse(body).unwrap();
        assert!(parsed.telemetry_headers().is_empty());
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(Envelope::parse("not json at all").is_err());
        assert!(Envelope::parse("[1,2,3]").is_err());
    }
}
