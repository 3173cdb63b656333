//! Assessment requests and their validation.

use bedside_core::config::DialogueConfig;
use bedside_core::persona::expand_persona_ids;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::RequestError;

/// What a caller asks for: one doctor endpoint against a set of personas.
///
/// `persona_ids` accepts concrete ids (`INTJ_M_PNEUMO`, `ENFP_LUNG`) and the
/// selection keywords `all`, `all_no_gender`, `random`, `random_no_gender`.
/// A bare string is treated as a one-element list. Explicit ids are not
/// checked here: an unknown id fails its own session and the rest still run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub doctor_endpoint: String,
    #[serde(default = "default_selection", deserialize_with = "one_or_many")]
    pub persona_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
}

fn default_selection() -> Vec<String> {
    vec!["all".to_string()]
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => vec![id],
        OneOrMany::Many(ids) => ids,
    })
}

/// A request that passed validation, with personas expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub doctor_endpoint: String,
    /// One entry per session, in request order.
    pub personas: Vec<String>,
    pub max_rounds: u32,
}

impl AssessmentRequest {
    pub fn new<I, S>(doctor_endpoint: impl Into<String>, persona_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            doctor_endpoint: doctor_endpoint.into(),
            persona_ids: persona_ids.into_iter().map(Into::into).collect(),
            max_rounds: None,
        }
    }

    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Check the request against dialogue limits and expand the persona
    /// selection.
    pub fn validate(&self, dialogue: &DialogueConfig) -> Result<ValidatedRequest, RequestError> {
        let endpoint = self.doctor_endpoint.trim();
        if endpoint.is_empty() {
            return Err(RequestError::EmptyEndpoint);
        }
        let has_host = ["http://", "https://"]
            .iter()
            .find_map(|scheme| endpoint.strip_prefix(scheme))
            .is_some_and(|rest| !rest.is_empty());
        if !has_host {
            return Err(RequestError::InvalidEndpoint(endpoint.to_string()));
        }

        let max_rounds = self.max_rounds.unwrap_or(dialogue.default_max_rounds);
        if max_rounds == 0 || max_rounds > dialogue.max_rounds_limit {
            return Err(RequestError::MaxRoundsOutOfRange {
                value: max_rounds,
                limit: dialogue.max_rounds_limit,
            });
        }

        let personas = expand_persona_ids(&self.persona_ids);
        if personas.is_empty() {
            return Err(RequestError::NoPersonas);
        }

        Ok(ValidatedRequest {
            doctor_endpoint: endpoint.to_string(),
            personas,
            max_rounds,
        })
    }
}
