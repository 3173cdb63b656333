//! Error types for chat model calls.

use thiserror::Error;

/// Errors that can occur while talking to a chat model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The HTTP request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// Provider returned a non-success status.
    #[error("provider API error: {0}")]
    ProviderApi(String),

    /// Response had no usable content.
    #[error("empty completion")]
    EmptyCompletion,

    /// API key environment variable is not set.
    #[error("credentials not found in ${0}")]
    CredentialsNotFound(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats_correctly() {
        let err = ModelError::ProviderApi("429 Too Many Requests".to_string());
        assert_eq!(err.to_string(), "provider API error: 429 Too Many Requests");
    }

    #[test]
    fn credentials_error_names_variable() {
        let err = ModelError::CredentialsNotFound("OPENAI_API_KEY".to_string());
        assert_eq!(err.to_string(), "credentials not found in $OPENAI_API_KEY");
    }

    #[test]
    fn error_from_serde_json() {
        let json_err: serde_json::Error = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: ModelError = json_err.into();
        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
