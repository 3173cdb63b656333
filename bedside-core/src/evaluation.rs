//! Per-round evaluation records.

use serde::{Deserialize, Serialize};

/// Lowest score a metric can take.
pub const MIN_SCORE: f64 = 0.0;
/// Highest score a metric can take.
pub const MAX_SCORE: f64 = 10.0;
/// Score substituted when a metric cannot be computed.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Why a dialogue stopped (or `None` while it continues).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    PatientLeft,
    PatientAccepted,
    MaxRoundsReached,
    #[default]
    None,
}

impl StopReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatientLeft => "patient_left",
            Self::PatientAccepted => "patient_accepted",
            Self::MaxRoundsReached => "max_rounds_reached",
            Self::None => "none",
        }
    }
}

/// The three scored dimensions of a doctor turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Empathy,
    Persuasion,
    Safety,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Empathy, Metric::Persuasion, Metric::Safety];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empathy => "empathy",
            Self::Persuasion => "persuasion",
            Self::Safety => "safety",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which scoring pass produced a round's scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// LLM judge over the criteria set.
    Semantic,
    /// Deterministic keyword heuristics.
    RuleBased,
}

/// Judgment of a single criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    Met,
    NotMet,
    NotRelevant,
}

/// Evaluation of one criterion in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub criterion_id: u32,
    pub metric: Metric,
    pub status: CriterionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Outcome of the stop-condition check for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopDecision {
    pub should_stop: bool,
    pub reason: StopReason,
}

impl StopDecision {
    /// Keep the dialogue going.
    #[must_use]
    pub fn proceed() -> Self {
        Self {
            should_stop: false,
            reason: StopReason::None,
        }
    }

    /// Stop for `reason`. A `None` reason cannot stop a dialogue.
    #[must_use]
    pub fn stop(reason: StopReason) -> Self {
        if reason == StopReason::None {
            return Self::proceed();
        }
        Self {
            should_stop: true,
            reason,
        }
    }
}

impl Default for StopDecision {
    fn default() -> Self {
        Self::proceed()
    }
}

/// Scores and stop decision for one completed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEvaluation {
    pub round_number: u32,
    pub empathy: f64,
    pub persuasion: f64,
    pub safety: f64,
    pub patient_state_change: String,
    pub should_stop: bool,
    pub stop_reason: StopReason,
    pub source: ScoreSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<CriterionEvaluation>,
    /// Degradations recorded while evaluating this round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RoundEvaluation {
    /// Score for a single metric.
    #[must_use]
    pub fn score(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Empathy => self.empathy,
            Metric::Persuasion => self.persuasion,
            Metric::Safety => self.safety,
        }
    }

    /// Merge a stop decision into this evaluation.
    pub fn apply_decision(&mut self, decision: StopDecision) {
        self.should_stop = decision.should_stop;
        self.stop_reason = decision.reason;
    }

    #[must_use]
    pub fn decision(&self) -> StopDecision {
        StopDecision {
            should_stop: self.should_stop,
            reason: self.stop_reason,
        }
    }
}

/// Whether `score` is a usable 0-10 metric value.
#[must_use]
pub fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score)
}
