//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("bson encode error: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    #[error("bson decode error: {0}")]
    BsonDecode(#[from] bson::de::Error),

    #[error("update conflict on key {0} after {1} attempts")]
    UpdateConflict(String, u32),
}
