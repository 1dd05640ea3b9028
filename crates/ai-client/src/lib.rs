use crate::error::AiError;
use crate::responses::{ChatMessage, ChatRequest, ChatResponse};
use async_trait::async_trait;
use configuration::AiSettings;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

pub mod error;
pub mod json;
pub mod responses;

// --- Public API ---
pub use json::extract_json;

/// The abstract interface of the language model used for evaluation and
/// optimization. A single blocking call: callers own parsing and fallback,
/// and no retry happens here.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn call_with_messages(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AiError>;
}

/// A client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionsClient {
    pub fn new(settings: &AiSettings, api_key: &str) -> Result<Self, AiError> {
        if api_key.trim().is_empty() {
            return Err(AiError::NotConfigured("API key is empty".to_string()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    /// Builds a client from the `[ai]` section, reading the key from the configured
    /// environment variable. Returns `None` when AI is disabled or no key is set, in
    /// which case callers use their deterministic fallbacks.
    pub fn from_settings(settings: &AiSettings) -> Result<Option<Self>, AiError> {
        if !settings.enabled {
            return Ok(None);
        }
        match settings.api_key() {
            Some(key) => Self::new(settings, &key).map(Some),
            None => {
                warn!(
                    env = %settings.api_key_env,
                    "No AI API key found, evaluation and optimization will use fallbacks"
                );
                Ok(None)
            }
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl AiClient for ChatCompletionsClient {
    async fn call_with_messages(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AiError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, prompt_chars = user_prompt.len(), "Sending chat completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "AI endpoint returned an error");
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Parse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AiError::EmptyResponse)?;

        debug!(chars = content.len(), "Chat completion received");
        Ok(content)
    }
}
