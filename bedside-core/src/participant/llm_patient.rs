use std::sync::Arc;

use async_trait::async_trait;

use super::traits::{Participant, PatientPayload};
use crate::dialogue::Speaker;
use crate::error::ParticipantError;
use crate::models::{ChatMessage, ChatModel, ChatRequest, ModelError};

/// Simulated patient driven by a chat model.
///
/// The profile's system prompt sets up the roleplay; doctor turns become
/// user messages and earlier patient turns become assistant messages.
pub struct LlmPatient {
    model: Arc<dyn ChatModel>,
    temperature: Option<f32>,
}

impl LlmPatient {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn build_request(&self, payload: &PatientPayload) -> ChatRequest {
        let mut messages = Vec::with_capacity(payload.history.len() + 1);
        messages.push(ChatMessage::system(&payload.profile.system_prompt));
        for turn in &payload.history {
            messages.push(match turn.speaker {
                Speaker::Doctor => ChatMessage::user(&turn.message),
                Speaker::Patient => ChatMessage::assistant(&turn.message),
            });
        }

        let request = ChatRequest::new(messages);
        match self.temperature {
            Some(t) => request.with_temperature(t),
            None => request,
        }
    }
}

#[async_trait]
impl Participant<PatientPayload> for LlmPatient {
    fn name(&self) -> &str {
        "patient"
    }

    async fn respond(&self, payload: &PatientPayload) -> Result<String, ParticipantError> {
        let request = self.build_request(payload);
        self.model.complete(request).await.map_err(|e| match e {
            ModelError::EmptyCompletion | ModelError::Serialization(_) => {
                ParticipantError::MalformedResponse(e.to_string())
            }
            other => ParticipantError::Transport(other.to_string()),
        })
    }
}

impl std::fmt::Debug for LlmPatient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmPatient")
            .field("model", &self.model.model_name())
            .field("temperature", &self.temperature)
            .finish()
    }
}
