//! MongoDB-backed article store.
//!
//! Articles are upserted on `(source, source_id)`. Timestamps are persisted
//! as RFC 3339 strings, which compare and sort correctly for UTC instants,
//! so range filters work as plain string comparisons.

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::info;

use pulse_core::config::MongoConfig;
use pulse_core::content::ProcessedArticle;

use crate::error::StoreError;

const COLLECTION: &str = "articles";
const DEFAULT_LIMIT: i64 = 20;

/// Conjunctive article filter: OR within each list, AND between fields,
/// inclusive `published_at` range.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub entities: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub entity_type: Option<String>,
    pub limit: Option<i64>,
}

impl ArticleQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

/// Document store for enriched articles.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Idempotent upsert on `(source, source_id)`.
    async fn store_article(&self, article: &ProcessedArticle) -> Result<(), StoreError>;

    /// Bounded-cost existence probe.
    async fn article_exists(&self, source: &str, source_id: &str) -> Result<bool, StoreError>;

    /// Structured retrieval, `published_at` descending.
    async fn query_articles(&self, query: &ArticleQuery)
        -> Result<Vec<ProcessedArticle>, StoreError>;

    /// Full-text ranked search over title and summary, best match first.
    async fn search_articles(
        &self,
        text: &str,
        limit: i64,
    ) -> Result<Vec<ProcessedArticle>, StoreError>;

    async fn is_healthy(&self) -> bool;
}

/// Build the MongoDB filter document for a structured query.
fn build_query_filter(query: &ArticleQuery) -> Document {
    let mut filter = Document::new();

    if let Some(entities) = query.entities.as_ref().filter(|v| !v.is_empty()) {
        filter.insert("entities.normalized", doc! {"$in": entities});
    }
    if let Some(categories) = query.categories.as_ref().filter(|v| !v.is_empty()) {
        filter.insert("categories", doc! {"$in": categories});
    }
    if let Some(sources) = query.sources.as_ref().filter(|v| !v.is_empty()) {
        filter.insert("source", doc! {"$in": sources});
    }
    if let Some(entity_type) = query.entity_type.as_ref().filter(|s| !s.is_empty()) {
        filter.insert("entities.type", entity_type.as_str());
    }

    let mut date_filter = Document::new();
    if let Some(from) = &query.date_from {
        date_filter.insert("$gte", from.as_str());
    }
    if let Some(to) = &query.date_to {
        date_filter.insert("$lte", to.as_str());
    }
    if !date_filter.is_empty() {
        filter.insert("published_at", date_filter);
    }

    filter
}

/// MongoDB realization of [`ArticleStore`].
pub struct MongoArticleStore {
    client: Client,
    collection: Collection<Document>,
}

impl MongoArticleStore {
    /// Connect and ensure the required indices exist.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&config.connection_string()).await?;
        let collection = client.database(&config.database).collection(COLLECTION);
        let store = Self { client, collection };
        store.ensure_indexes().await?;
        info!(database = %config.database, "article store initialized");
        Ok(store)
    }

    /// Index creation is idempotent; safe to run at every startup.
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let models = vec![
            IndexModel::builder()
                .keys(doc! {"entities.normalized": 1, "published_at": -1})
                .options(IndexOptions::builder().name("entity_date".to_string()).build())
                .build(),
            IndexModel::builder()
                .keys(doc! {"categories": 1, "published_at": -1})
                .options(IndexOptions::builder().name("category_date".to_string()).build())
                .build(),
            IndexModel::builder()
                .keys(doc! {"source": 1, "source_id": 1})
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name("source_unique".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! {"published_at": -1})
                .options(IndexOptions::builder().name("date_desc".to_string()).build())
                .build(),
            IndexModel::builder()
                .keys(doc! {"entities.type": 1, "published_at": -1})
                .options(
                    IndexOptions::builder()
                        .name("entity_type_date".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! {"summary": "text", "title": "text"})
                .options(IndexOptions::builder().name("text_search".to_string()).build())
                .build(),
        ];

        for model in models {
            self.collection.create_index(model).await?;
        }
        Ok(())
    }

    fn decode(doc: Document) -> Result<ProcessedArticle, StoreError> {
        Ok(bson::from_document(doc)?)
    }
}

#[async_trait]
impl ArticleStore for MongoArticleStore {
    async fn store_article(&self, article: &ProcessedArticle) -> Result<(), StoreError> {
        let doc = bson::to_document(article)?;
        self.collection
            .update_one(
                doc! {"source": &article.source, "source_id": &article.source_id},
                doc! {"$set": doc},
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn article_exists(&self, source: &str, source_id: &str) -> Result<bool, StoreError> {
        let count = self
            .collection
            .count_documents(doc! {"source": source, "source_id": source_id})
            .limit(1)
            .await?;
        Ok(count > 0)
    }

    async fn query_articles(
        &self,
        query: &ArticleQuery,
    ) -> Result<Vec<ProcessedArticle>, StoreError> {
        let filter = build_query_filter(query);
        let mut cursor = self
            .collection
            .find(filter)
            .sort(doc! {"published_at": -1})
            .limit(query.limit())
            .await?;

        let mut articles = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            articles.push(Self::decode(doc)?);
        }
        Ok(articles)
    }

    async fn search_articles(
        &self,
        text: &str,
        limit: i64,
    ) -> Result<Vec<ProcessedArticle>, StoreError> {
        let mut cursor = self
            .collection
            .find(doc! {"$text": {"$search": text}})
            .projection(doc! {"score": {"$meta": "textScore"}})
            .sort(doc! {"score": {"$meta": "textScore"}})
            .limit(limit)
            .await?;

        let mut articles = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            articles.push(Self::decode(doc)?);
        }
        Ok(articles)
    }

    async fn is_healthy(&self) -> bool {
        self.client
            .database("admin")
            .run_command(doc! {"ping": 1})
            .await
            .is_ok()
    }
}
