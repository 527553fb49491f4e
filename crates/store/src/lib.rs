pub mod articles;
pub mod dedup;
pub mod error;
pub mod state;

pub use articles::{ArticleQuery, ArticleStore, MongoArticleStore};
pub use dedup::{DedupCache, RedisDedupCache};
pub use error::StoreError;
pub use state::{RedisStateStore, StateStore};
