//! Error types for bedside-evals

use std::path::PathBuf;
use std::time::Duration;

use bedside_core::evaluation::Metric;
use bedside_core::models::ModelError;
use bedside_core::types::SessionId;
use thiserror::Error;

/// Errors from a judge model exchange
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Judge timed out after {0:?}")]
    Timeout(Duration),

    #[error("Judge model error: {0}")]
    Model(#[from] ModelError),

    #[error("Failed to parse judge response: {0}")]
    ParseFailed(String),

    #[error("Judge returned out-of-range {metric} score {value}")]
    OutOfRange { metric: Metric, value: f64 },
}

/// Errors from loading a criteria set
#[derive(Error, Debug)]
pub enum CriteriaError {
    #[error("Failed to read criteria {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse criteria: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No criteria for {0}")]
    Empty(Metric),

    #[error("Duplicate criterion id {0}")]
    DuplicateId(u32),
}

/// Errors from report generation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("Session {0} is not sealed; cannot report on an incomplete session")]
    IncompleteSession(SessionId),
}
