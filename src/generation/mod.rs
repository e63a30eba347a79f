//! Answer generation backends
//!
//! A generation backend turns an assembled prompt into an answer. The
//! engine treats every error here as non-fatal and falls back to
//! extractive answering, so variants describe what went wrong rather
//! than abort the query.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod openai;

pub use openai::OpenAiCompatBackend;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Malformed generation response: {0}")]
    MalformedResponse(String),

    #[error("API key environment variable not set: {env}")]
    MissingApiKey { env: String },

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Prompt plus sampling parameters for one completion
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: 0.2,
            max_tokens: 512,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Completed generation
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub elapsed: Duration,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError>;

    fn model_name(&self) -> &str;
}
