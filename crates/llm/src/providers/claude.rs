use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::provider::{InferenceConfig, InferenceResult, LlmError, LlmProvider};

#[derive(Debug)]
pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn run_inference(
        &self,
        prompt: &str,
        config: &InferenceConfig,
    ) -> Result<InferenceResult, LlmError> {
        let url = "https://api.anthropic.com/v1/messages";

        let mut body = json!({
            "model": config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        });

        // Claude API uses a separate system parameter.
        if let Some(system) = &config.system_prompt {
            body["system"] = json!(system);
        }

        debug!("Claude request to {}", url);
        let started = Instant::now();

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, body });
        }

        let resp: serde_json::Value = response.json().await?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let content = resp["content"][0]["text"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("missing content[0].text".into()))?
            .to_string();

        let usage = &resp["usage"];
        let prompt_tokens = usage["input_tokens"].as_u64().unwrap_or(0) as u32;
        let completion_tokens = usage["output_tokens"].as_u64().unwrap_or(0) as u32;

        Ok(InferenceResult {
            response: content,
            model: resp["model"]
                .as_str()
                .unwrap_or(&config.model)
                .to_string(),
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            latency_ms,
        })
    }
}
