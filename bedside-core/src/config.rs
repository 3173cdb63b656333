//! Configuration types and the layered loader.
//!
//! Layers, later wins: built-in defaults, the user config
//! (`<config_dir>/bedside/config.toml`), then the project config
//! (`.bedside/config.toml`, or the file named by `BEDSIDE_CONFIG`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::participant::RetryPolicy;

/// Environment variable naming an explicit project config file.
pub const CONFIG_ENV_VAR: &str = "BEDSIDE_CONFIG";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedsideConfig {
    pub dialogue: DialogueConfig,
    pub client: ClientConfig,
    pub judge: JudgeConfig,
    pub scoring: ScoringConfig,
    pub stop: StopConfig,
    pub personas: PersonaConfig,
    pub logging: LoggingConfig,
}

/// Round loop and batch limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Rounds per session when a request does not say.
    pub default_max_rounds: u32,
    /// Hard ceiling a request may ask for.
    pub max_rounds_limit: u32,
    /// Sessions run at once within a batch.
    pub max_concurrent_sessions: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            default_max_rounds: 10,
            max_rounds_limit: 50,
            max_concurrent_sessions: 4,
        }
    }
}

/// Participant call budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Random extra delay as a fraction of the backoff (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            jitter: 0.25,
        }
    }
}

impl ClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_secs(self.timeout_seconds),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter: self.jitter,
        }
    }
}

/// LLM judge used for semantic scoring, stop classification and report synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub enabled: bool,
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. Unset means no auth header.
    pub api_key_env: Option<String>,
    pub timeout_seconds: u64,
    /// Retries after the first failed judge call.
    pub max_retries: u32,
    /// Also ask the judge to classify accept/leave signals.
    pub semantic_stop: bool,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            timeout_seconds: 60,
            max_retries: 1,
            semantic_stop: false,
        }
    }
}

impl JudgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Weights of the three metrics in the aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub empathy_weight: f64,
    pub persuasion_weight: f64,
    pub safety_weight: f64,
    /// TOML criteria file replacing the built-in criteria.
    pub criteria_file: Option<PathBuf>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            empathy_weight: 1.0,
            persuasion_weight: 1.0,
            safety_weight: 1.0,
            criteria_file: None,
        }
    }
}

/// Extra stop-detection phrases, added to the built-in ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    /// Regexes (case-insensitive) signalling the patient accepts treatment.
    pub accept_patterns: Vec<String>,
    /// Regexes (case-insensitive) signalling the patient is leaving.
    pub leave_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub templates_dir: PathBuf,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("personas"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl BedsideConfig {
    /// Parse a single TOML document, with defaults for anything missing.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: BedsideConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.dialogue;
        if d.max_rounds_limit == 0 {
            return Err(ConfigError::Invalid("dialogue.max_rounds_limit must be at least 1".into()));
        }
        if d.default_max_rounds == 0 || d.default_max_rounds > d.max_rounds_limit {
            return Err(ConfigError::Invalid(format!(
                "dialogue.default_max_rounds must be between 1 and {}",
                d.max_rounds_limit
            )));
        }
        if d.max_concurrent_sessions == 0 {
            return Err(ConfigError::Invalid(
                "dialogue.max_concurrent_sessions must be at least 1".into(),
            ));
        }
        if self.client.max_attempts == 0 {
            return Err(ConfigError::Invalid("client.max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.client.jitter) {
            return Err(ConfigError::Invalid("client.jitter must be within 0.0..=1.0".into()));
        }
        let s = &self.scoring;
        let weights = [s.empathy_weight, s.persuasion_weight, s.safety_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::Invalid(
                "scoring weights must be non-negative with a positive sum".into(),
            ));
        }
        Ok(())
    }
}

/// Loads [`BedsideConfig`] from the standard layers.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project).
    pub fn load() -> Result<BedsideConfig, ConfigError> {
        let mut layers = Vec::new();
        if let Some(user) = Self::user_config_path() {
            layers.push(user);
        }
        layers.push(Self::project_config_path());
        Self::load_from_paths(&layers)
    }

    /// Merge the given files in order; missing files are skipped.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<BedsideConfig, ConfigError> {
        let mut merged = toml::Table::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            debug!(path = %path.display(), "loading config layer");
            let layer = Self::read_table(path)?;
            merge_tables(&mut merged, layer);
        }

        let config: BedsideConfig = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// User config path (platform-specific).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bedside").join("config.toml"))
    }

    /// Project config path, overridable with `BEDSIDE_CONFIG`.
    pub fn project_config_path() -> PathBuf {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(".bedside/config.toml"),
        }
    }

    fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(contents.parse::<toml::Table>()?)
    }
}

/// Overlay `overlay` onto `base`, merging nested tables key by key.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
