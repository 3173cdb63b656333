//! Core types for bedside doctor-agent assessments.
//!
//! This crate holds the dialogue data model, persona collaborators, the
//! participant abstraction with its round-call client, the chat model client
//! used for judging and patient simulation, and configuration.

pub mod config;
pub mod dialogue;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod participant;
pub mod persona;
pub mod session;
pub mod types;

pub use config::{BedsideConfig, ConfigLoader, LogFormat, LoggingConfig};
pub use dialogue::{DialogueTurn, Speaker, render_transcript, visible_utterance};
pub use error::{
    ConfigError, ParticipantError, ParticipantUnavailable, PersonaError, SessionError,
};
pub use evaluation::{
    CriterionEvaluation, CriterionStatus, Metric, NEUTRAL_SCORE, RoundEvaluation, ScoreSource,
    StopDecision, StopReason,
};
pub use models::{ChatMessage, ChatModel, ChatRequest, ModelError, OpenAiCompatModel};
pub use participant::{
    DoctorPayload, HttpParticipant, LlmPatient, Participant, PatientPayload, RetryPolicy,
    RoundCallClient,
};
pub use persona::{
    ClinicalBrief, PatientProfile, Persona, PersonaConstructor, PersonaId,
    TemplatePersonaConstructor, expand_persona_ids,
};
pub use session::{DialogueSession, SessionOutcome, SessionPhase};
pub use types::{SessionId, TaskId};
