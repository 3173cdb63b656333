use async_trait::async_trait;
use serde::Serialize;

use crate::dialogue::DialogueTurn;
use crate::error::ParticipantError;
use crate::persona::{ClinicalBrief, PatientProfile};

/// What the doctor participant sees each round.
///
/// Never carries a [`PatientProfile`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorPayload {
    pub brief: ClinicalBrief,
    pub history: Vec<DialogueTurn>,
}

/// What the patient participant sees each round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientPayload {
    pub profile: PatientProfile,
    pub history: Vec<DialogueTurn>,
}

/// A payload that can be sent over the JSON participant binding.
pub trait WirePayload: Send + Sync {
    /// Role the receiving participant plays.
    fn role(&self) -> &'static str;
    /// Role-specific context object.
    fn context(&self) -> Result<serde_json::Value, serde_json::Error>;
    fn history(&self) -> &[DialogueTurn];
}

impl WirePayload for DoctorPayload {
    fn role(&self) -> &'static str {
        "doctor"
    }

    fn context(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.brief)
    }

    fn history(&self) -> &[DialogueTurn] {
        &self.history
    }
}

impl WirePayload for PatientPayload {
    fn role(&self) -> &'static str {
        "patient"
    }

    fn context(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(&self.profile)
    }

    fn history(&self) -> &[DialogueTurn] {
        &self.history
    }
}

/// A conversational agent that answers one payload with one utterance.
#[async_trait]
pub trait Participant<P: Sync>: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Produce the next utterance.
    async fn respond(&self, payload: &P) -> Result<String, ParticipantError>;
}
