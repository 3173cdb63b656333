//! Error types for bedside-core

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::session::SessionPhase;
use crate::types::SessionId;

/// Errors from a single participant exchange
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParticipantError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Participant returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ParticipantError {
    /// Whether the participant answered but with unusable content.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedResponse(_))
    }

    /// Whether another attempt may succeed. Client errors (4xx other than
    /// 429) will not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::MalformedResponse(_) => false,
        }
    }
}

/// A participant could not be reached within the retry budget.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Participant {participant} unavailable after {attempts} attempt(s): {last_error}")]
pub struct ParticipantUnavailable {
    pub participant: String,
    pub attempts: u32,
    #[source]
    pub last_error: ParticipantError,
}

/// Errors from persona construction
#[derive(Error, Debug)]
pub enum PersonaError {
    #[error("Unknown persona: {0}")]
    UnknownPersona(String),

    #[error("Missing template: {}", .0.display())]
    MissingTemplate(PathBuf),

    #[error("Invalid template {}: {message}", path.display())]
    InvalidTemplate { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors related to dialogue session bookkeeping
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session {0} is already sealed")]
    AlreadySealed(SessionId),

    #[error("Session {0} is not sealed")]
    NotSealed(SessionId),

    #[error("Invalid phase transition from {from:?} to {to:?}")]
    InvalidPhaseTransition { from: SessionPhase, to: SessionPhase },

    #[error("Round out of order: expected {expected}, got {actual}")]
    RoundOutOfOrder { expected: u32, actual: u32 },
}
