//! OpenAI-compatible chat completion client
//!
//! Works against any server exposing the `/chat/completions` endpoint:
//! llama.cpp, LM Studio, Ollama, vLLM, or the hosted APIs. Only the
//! non-streaming response shape is consumed.

use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use super::{Generation, GenerationBackend, GenerationError, GenerationRequest};

pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Read the API key from an environment variable
    pub fn with_api_key_from_env(self, env: &str) -> Result<Self, GenerationError> {
        let key = std::env::var(env).map_err(|_| GenerationError::MissingApiKey {
            env: env.to_string(),
        })?;
        Ok(self.with_api_key(key))
    }

    fn endpoint_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_payload(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let start = Instant::now();
        let url = self.endpoint_url();

        tracing::debug!(url = %url, model = %self.model, "Sending generation request");

        let mut http_request = self.client.post(&url).json(&self.build_payload(request));
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(GenerationError::RequestFailed(format!(
                "HTTP {}: {}",
                status, snippet
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                GenerationError::MalformedResponse(
                    "missing choices[0].message.content".to_string(),
                )
            })?
            .trim()
            .to_string();

        let model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(&self.model)
            .to_string();

        Ok(Generation {
            text,
            model,
            elapsed: start.elapsed(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
