//! Error types for bedside-arena

use bedside_core::error::{ConfigError, ParticipantUnavailable, SessionError};
use bedside_core::models::ModelError;
use bedside_core::types::TaskId;
use bedside_evals::error::CriteriaError;
use thiserror::Error;

use crate::task::TaskStatus;

/// Result type for arena operations
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Reasons an assessment request is rejected before any session starts
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Doctor endpoint is empty")]
    EmptyEndpoint,

    #[error("Doctor endpoint must be an http(s) URL: {0}")]
    InvalidEndpoint(String),

    #[error("No personas selected")]
    NoPersonas,

    #[error("max_rounds must be between 1 and {limit}, got {value}")]
    MaxRoundsOutOfRange { value: u32, limit: u32 },
}

/// Errors from the assessment task store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task {task_id} does not accept session results while {status}")]
    NotAccepting { task_id: TaskId, status: TaskStatus },
}

/// Failures that end a session's round loop early
#[derive(Error, Debug)]
pub(crate) enum RoundFailure {
    #[error(transparent)]
    Unavailable(#[from] ParticipantUnavailable),

    #[error("Session state error: {0}")]
    Session(#[from] SessionError),
}

/// Top-level arena errors
#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Judge setup failed: {0}")]
    Judge(#[from] ModelError),

    #[error("Criteria error: {0}")]
    Criteria(#[from] CriteriaError),
}
