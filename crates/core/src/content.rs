use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article as fetched from a content source, before enrichment.
///
/// Carried through the broker exactly once; never persisted in raw form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    /// Short opaque source identifier ("reddit", "espn", ...).
    pub source: String,
    /// Unique within `source`.
    pub source_id: String,
    pub source_url: String,
    pub title: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A sports entity extracted from an article.
///
/// `entity_type` is carried as a string on the wire; known values are
/// "player", "team", "league", "sport" and "venue". `normalized` is lowercase
/// with underscores and is the join key for entity-based retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub normalized: String,
}

/// Article sentiment as judged by the enrichment model.
///
/// Unknown labels deserialize as `Neutral` so one odd model output cannot
/// fail a whole article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    #[serde(other)]
    Neutral,
}

/// The enriched artifact persisted in the article store.
///
/// `(source, source_id)` is the upsert key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedArticle {
    pub source: String,
    pub source_id: String,
    pub source_url: String,
    pub title: String,
    pub raw_content: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub entities: Vec<ArticleEntity>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub processing_model: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Derive the normalized form of an entity name: lowercase, spaces to
/// underscores.
pub fn normalize_entity_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}
