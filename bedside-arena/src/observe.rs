//! Tracing subscriber setup.

use bedside_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Error type for tracing initialization.
#[derive(Debug, thiserror::Error)]
pub enum ObserveError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("failed to set global subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Filter from `RUST_LOG` when set, otherwise from the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))
}

/// Install the global subscriber: pretty or JSON lines on stdout.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber has
/// already been set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ObserveError> {
    let registry = tracing_subscriber::registry().with(env_filter(config)?);
    match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
    }
    Ok(())
}
