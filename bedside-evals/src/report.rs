//! Performance reports for sealed sessions.

use bedside_core::config::ScoringConfig;
use bedside_core::dialogue::render_transcript;
use bedside_core::evaluation::{Metric, RoundEvaluation, ScoreSource};
use bedside_core::session::{DialogueSession, SessionOutcome};
use bedside_core::types::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::criteria::round2;
use crate::error::ReportError;
use crate::judge::JudgeHarness;

/// Metric weights for the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub empathy: f64,
    pub persuasion: f64,
    pub safety: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            empathy: 1.0,
            persuasion: 1.0,
            safety: 1.0,
        }
    }
}

impl From<&ScoringConfig> for ScoreWeights {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            empathy: config.empathy_weight,
            persuasion: config.persuasion_weight,
            safety: config.safety_weight,
        }
    }
}

impl ScoreWeights {
    pub fn weight(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Empathy => self.empathy,
            Metric::Persuasion => self.persuasion,
            Metric::Safety => self.safety,
        }
    }

    fn total(&self) -> f64 {
        self.empathy + self.persuasion + self.safety
    }
}

/// One row of the per-round score list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundScore {
    pub round: u32,
    pub empathy: f64,
    pub persuasion: f64,
    pub safety: f64,
    pub source: ScoreSource,
    pub patient_state_change: String,
}

impl From<&RoundEvaluation> for RoundScore {
    fn from(eval: &RoundEvaluation) -> Self {
        Self {
            round: eval.round_number,
            empathy: eval.empathy,
            persuasion: eval.persuasion,
            safety: eval.safety,
            source: eval.source,
            patient_state_change: eval.patient_state_change.clone(),
        }
    }
}

/// Best and worst round for one metric. Ties go to the earliest round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricExtremes {
    pub metric: Metric,
    pub best_round: u32,
    pub best_score: f64,
    pub worst_round: u32,
    pub worst_score: f64,
}

/// Final assessment of one dialogue session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub session_id: SessionId,
    pub persona_id: String,
    pub outcome: SessionOutcome,
    pub total_rounds: u32,
    pub round_scores: Vec<RoundScore>,
    pub mean_empathy: f64,
    pub mean_persuasion: f64,
    pub mean_safety: f64,
    /// Weighted mean of the three metric means, on a 0-100 scale.
    pub aggregate_score: f64,
    pub extremes: Vec<MetricExtremes>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub key_moments: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub alternative_approaches: Vec<String>,
    pub summary: String,
    /// Qualitative synthesis was unavailable; only numeric fields are filled.
    pub degraded: bool,
    pub generated_at: DateTime<Utc>,
}

impl PerformanceReport {
    pub fn mean(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Empathy => self.mean_empathy,
            Metric::Persuasion => self.mean_persuasion,
            Metric::Safety => self.mean_safety,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Synthesis {
    strengths: Vec<String>,
    weaknesses: Vec<String>,
    key_moments: Vec<String>,
    improvement_suggestions: Vec<String>,
    alternative_approaches: Vec<String>,
    summary: String,
}

const SYNTHESIS_SYSTEM_PROMPT: &str = "You review a completed simulated consultation in which a \
doctor tried to persuade a patient to accept a recommended treatment. Using the transcript and \
the per-round scores, list the doctor's strengths and weaknesses, the key moments that shifted \
the patient's stance, concrete improvement suggestions, and alternative approaches that might \
have worked better. Finish with a short overall summary.

Answer with JSON only:
{\"strengths\": [], \"weaknesses\": [], \"key_moments\": [], \"improvement_suggestions\": [], \
\"alternative_approaches\": [], \"summary\": \"...\"}";

/// Builds a [`PerformanceReport`] from a sealed session.
#[derive(Debug, Clone, Default)]
pub struct ReportGenerator {
    weights: ScoreWeights,
    synthesizer: Option<JudgeHarness>,
}

impl ReportGenerator {
    pub fn new(weights: ScoreWeights, synthesizer: Option<JudgeHarness>) -> Self {
        Self {
            weights,
            synthesizer,
        }
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    #[instrument(name = "session.report", skip_all, fields(session_id = %session.id))]
    pub async fn generate(&self, session: &DialogueSession) -> Result<PerformanceReport, ReportError> {
        let outcome = session
            .outcome()
            .ok_or(ReportError::IncompleteSession(session.id))?;

        let evaluations = session.evaluations();
        let round_scores: Vec<RoundScore> = evaluations.iter().map(RoundScore::from).collect();
        let [mean_empathy, mean_persuasion, mean_safety] =
            Metric::ALL.map(|metric| mean_score(evaluations, metric));
        let aggregate_score = self.aggregate(&[mean_empathy, mean_persuasion, mean_safety]);
        let extremes = Metric::ALL
            .iter()
            .filter_map(|&metric| metric_extremes(evaluations, metric))
            .collect();

        let mut report = PerformanceReport {
            session_id: session.id,
            persona_id: session.persona_id.clone(),
            outcome,
            total_rounds: session.total_rounds(),
            round_scores,
            mean_empathy,
            mean_persuasion,
            mean_safety,
            aggregate_score,
            extremes,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            key_moments: Vec::new(),
            improvement_suggestions: Vec::new(),
            alternative_approaches: Vec::new(),
            summary: String::new(),
            degraded: false,
            generated_at: Utc::now(),
        };
        report.summary = numeric_summary(&report);

        match &self.synthesizer {
            _ if evaluations.is_empty() => {}
            Some(judge) => match synthesize(judge, session, &report).await {
                Ok(synthesis) => apply_synthesis(&mut report, synthesis),
                Err(e) => {
                    warn!(error = %e, "report synthesis failed, returning numeric report");
                    report.degraded = true;
                }
            },
            None => report.degraded = true,
        }

        info!(
            outcome = outcome.as_str(),
            total_rounds = report.total_rounds,
            aggregate_score = report.aggregate_score,
            degraded = report.degraded,
            "report generated"
        );
        Ok(report)
    }

    fn aggregate(&self, means: &[f64; 3]) -> f64 {
        let total = self.weights.total();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = Metric::ALL
            .iter()
            .zip(means)
            .map(|(&metric, mean)| self.weights.weight(metric) * mean)
            .sum();
        round2(weighted / total * 10.0)
    }
}

fn mean_score(evaluations: &[RoundEvaluation], metric: Metric) -> f64 {
    if evaluations.is_empty() {
        return 0.0;
    }
    let sum: f64 = evaluations.iter().map(|e| e.score(metric)).sum();
    round2(sum / evaluations.len() as f64)
}

fn metric_extremes(evaluations: &[RoundEvaluation], metric: Metric) -> Option<MetricExtremes> {
    let first = evaluations.first()?;
    let (mut best, mut worst) = (first, first);
    for eval in &evaluations[1..] {
        if eval.score(metric) > best.score(metric) {
            best = eval;
        }
        if eval.score(metric) < worst.score(metric) {
            worst = eval;
        }
    }
    Some(MetricExtremes {
        metric,
        best_round: best.round_number,
        best_score: best.score(metric),
        worst_round: worst.round_number,
        worst_score: worst.score(metric),
    })
}

fn numeric_summary(report: &PerformanceReport) -> String {
    format!(
        "Session ended with {} after {} round(s). Mean empathy {:.2}, persuasion {:.2}, safety {:.2}; aggregate {:.2}/100.",
        report.outcome,
        report.total_rounds,
        report.mean_empathy,
        report.mean_persuasion,
        report.mean_safety,
        report.aggregate_score,
    )
}

async fn synthesize(
    judge: &JudgeHarness,
    session: &DialogueSession,
    report: &PerformanceReport,
) -> Result<Synthesis, crate::error::JudgeError> {
    let scores = report
        .round_scores
        .iter()
        .map(|s| {
            format!(
                "Round {}: empathy {:.2}, persuasion {:.2}, safety {:.2} ({})",
                s.round, s.empathy, s.persuasion, s.safety, s.patient_state_change
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!(
        "Outcome: {}\nRounds: {}\n\n=== Scores ===\n{scores}\n\n=== Transcript ===\n{}",
        report.outcome,
        report.total_rounds,
        render_transcript(session.turns()),
    );
    judge.ask(SYNTHESIS_SYSTEM_PROMPT, &user).await
}

fn apply_synthesis(report: &mut PerformanceReport, synthesis: Synthesis) {
    report.strengths = synthesis.strengths;
    report.weaknesses = synthesis.weaknesses;
    report.key_moments = synthesis.key_moments;
    report.improvement_suggestions = synthesis.improvement_suggestions;
    report.alternative_approaches = synthesis.alternative_approaches;
    if !synthesis.summary.trim().is_empty() {
        report.summary = synthesis.summary;
    }
}
