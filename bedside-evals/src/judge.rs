//! LLM judge harness.
//!
//! Wraps a [`ChatModel`] with a per-call timeout, a bounded retry loop, and
//! JSON extraction from free-form completions.

use std::sync::Arc;
use std::time::Duration;

use bedside_core::config::JudgeConfig;
use bedside_core::models::{ChatMessage, ChatModel, ChatRequest, ModelError, OpenAiCompatModel};
use serde::de::DeserializeOwned;

use crate::error::JudgeError;

/// Judge model with timeout and retry discipline.
#[derive(Clone)]
pub struct JudgeHarness {
    model: Arc<dyn ChatModel>,
    timeout: Duration,
    max_retries: u32,
}

impl JudgeHarness {
    pub fn new(model: Arc<dyn ChatModel>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            model,
            timeout,
            max_retries,
        }
    }

    /// Build the configured judge, or `None` when judging is disabled.
    pub fn from_config(config: &JudgeConfig) -> Result<Option<Self>, ModelError> {
        if !config.enabled {
            return Ok(None);
        }
        let mut model = OpenAiCompatModel::with_base_url(&config.base_url, &config.model);
        if let Some(var) = &config.api_key_env {
            model = model.with_api_key_from_env(var)?;
        }
        Ok(Some(Self::new(
            Arc::new(model),
            config.timeout(),
            config.max_retries,
        )))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Ask the judge and parse the first JSON object in its answer as `T`.
    pub async fn ask<T: DeserializeOwned>(&self, system: &str, user: &str) -> Result<T, JudgeError> {
        let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .with_temperature(0.0);

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.ask_once(request.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        model = self.model.model_name(),
                        error = %e,
                        "judge call failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(JudgeError::Timeout(self.timeout)))
    }

    async fn ask_once<T: DeserializeOwned>(&self, request: ChatRequest) -> Result<T, JudgeError> {
        let text = tokio::time::timeout(self.timeout, self.model.complete(request))
            .await
            .map_err(|_| JudgeError::Timeout(self.timeout))??;

        let json = extract_json_object(&text)
            .ok_or_else(|| JudgeError::ParseFailed(format!("no JSON object in: {text}")))?;
        serde_json::from_str(json).map_err(|e| JudgeError::ParseFailed(format!("{e}: {json}")))
    }
}

impl std::fmt::Debug for JudgeHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeHarness")
            .field("model", &self.model.model_name())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Slice out the outermost `{ ... }` of a completion, skipping code fences
/// and surrounding prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bedside_core::models::{ChatModel, ChatRequest, ModelError};

    /// Chat model replaying canned answers; the last answer repeats.
    pub struct CannedModel {
        answers: Mutex<VecDeque<Result<String, ()>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl CannedModel {
        pub fn new(answers: Vec<Result<String, ()>>) -> Self {
            Self {
                answers: Mutex::new(answers.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn always(answer: &str) -> Self {
            Self::new(vec![Ok(answer.to_string())])
        }

        pub fn failing() -> Self {
            Self::new(vec![Err(())])
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: ChatRequest) -> Result<String, ModelError> {
            self.requests.lock().unwrap().push(request);
            let mut answers = self.answers.lock().unwrap();
            let answer = if answers.len() > 1 {
                answers.pop_front()
            } else {
                answers.front().cloned()
            };
            match answer {
                Some(Ok(text)) => Ok(text),
                _ => Err(ModelError::ProviderApi("503: unavailable".to_string())),
            }
        }
    }
}
