pub mod provider;
pub mod providers;

pub use provider::{InferenceConfig, InferenceResult, LlmError, LlmProvider};
pub use providers::create_provider;
