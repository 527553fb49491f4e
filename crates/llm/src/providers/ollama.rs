use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::provider::{InferenceConfig, InferenceResult, LlmError, LlmProvider};

#[derive(Debug)]
pub struct OllamaProvider {
    client: reqwest::Client,
    url: String,
}

impl OllamaProvider {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn run_inference(
        &self,
        prompt: &str,
        config: &InferenceConfig,
    ) -> Result<InferenceResult, LlmError> {
        let url = format!("{}/api/chat", self.url);

        let mut messages: Vec<serde_json::Value> = Vec::new();
        if let Some(system) = &config.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let body = json!({
            "model": config.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": config.temperature,
            },
        });

        debug!("Ollama request to {}", url);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
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

        let content = resp["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("missing message.content".into()))?
            .to_string();

        let prompt_tokens = resp["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
        let completion_tokens = resp["eval_count"].as_u64().unwrap_or(0) as u32;

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
