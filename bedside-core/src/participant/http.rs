//! JSON-over-HTTP participant binding.
//!
//! Request body:
//!
//! ```json
//! { "role": "doctor", "context": { ... }, "history": [ { "speaker": "patient", "message": "..." } ] }
//! ```
//!
//! Expected response: `{ "message": "..." }`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::traits::{Participant, WirePayload};
use crate::dialogue::{DialogueTurn, Speaker};
use crate::error::ParticipantError;

#[derive(Debug, Serialize)]
struct WireTurn<'a> {
    round: u32,
    speaker: Speaker,
    message: &'a str,
}

impl<'a> From<&'a DialogueTurn> for WireTurn<'a> {
    fn from(turn: &'a DialogueTurn) -> Self {
        Self {
            round: turn.round,
            speaker: turn.speaker,
            message: &turn.message,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    role: &'static str,
    context: serde_json::Value,
    history: Vec<WireTurn<'a>>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    message: String,
}

/// A participant reachable at an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpParticipant {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpParticipant {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::with_client(name, endpoint, reqwest::Client::new())
    }

    /// Share a connection pool across participants.
    pub fn with_client(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl<P: WirePayload> Participant<P> for HttpParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(&self, payload: &P) -> Result<String, ParticipantError> {
        let context = payload
            .context()
            .map_err(|e| ParticipantError::Transport(format!("failed to encode payload: {e}")))?;
        let request = WireRequest {
            role: payload.role(),
            context,
            history: payload.history().iter().map(WireTurn::from).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ParticipantError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParticipantError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ParticipantError::Transport(e.to_string()))?;
        let parsed: WireResponse = serde_json::from_str(&body)
            .map_err(|e| ParticipantError::MalformedResponse(e.to_string()))?;

        if parsed.message.trim().is_empty() {
            return Err(ParticipantError::MalformedResponse("empty message".to_string()));
        }
        Ok(parsed.message)
    }
}
