//! OpenAI-compatible chat completions client.
//!
//! Works against any server exposing `POST {base_url}/chat/completions`
//! (OpenAI, vLLM, llama.cpp server, Ollama's `/v1` endpoint).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatModel, ChatRequest, ModelError};

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ────────────────────────────────────────────────────────────────────────────
// API types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAiCompatModel
// ────────────────────────────────────────────────────────────────────────────

/// Chat model served over the OpenAI chat completions API.
pub struct OpenAiCompatModel {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    /// Create a client for `model` at the default OpenAI base URL.
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, model)
    }

    /// Create a client for `model` at a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Read the bearer token from an environment variable.
    pub fn with_api_key_from_env(self, var: &str) -> Result<Self, ModelError> {
        let key = std::env::var(var).map_err(|_| ModelError::CredentialsNotFound(var.to_string()))?;
        Ok(self.with_api_key(key))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::ProviderApi(format!("{status}: {body}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;
        let completion: CompletionResponse = serde_json::from_str(&text)?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ModelError::EmptyCompletion)
    }
}

impl std::fmt::Debug for OpenAiCompatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
