//! Per-round evaluator.
//!
//! Scores each completed round on empathy, persuasion and safety. The
//! semantic strategy asks the judge to work through the criteria set one
//! metric at a time; the rule-based strategy uses keyword heuristics. Any
//! failure on the semantic path drops to the rule-based one, and a metric
//! with no signal at all gets the neutral score. Every such degradation is
//! recorded as a warning on the round.

use std::sync::Arc;

use bedside_core::dialogue::{DialogueTurn, render_transcript};
use bedside_core::evaluation::{
    CriterionEvaluation, CriterionStatus, Metric, NEUTRAL_SCORE, RoundEvaluation, ScoreSource,
    StopReason, is_valid_score,
};
use bedside_core::persona::ClinicalBrief;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::criteria::{CriteriaSet, category_score};
use crate::error::JudgeError;
use crate::heuristics::RuleBasedScorer;
use crate::judge::JudgeHarness;

/// Everything the evaluator looks at for one round.
#[derive(Debug, Clone, Copy)]
pub struct RoundInput<'a> {
    pub round: u32,
    pub doctor_turn: &'a DialogueTurn,
    pub patient_turn: &'a DialogueTurn,
    /// Full dialogue so far, including this round's turns.
    pub history: &'a [DialogueTurn],
    pub brief: &'a ClinicalBrief,
}

/// How a round gets scored.
#[derive(Debug, Clone)]
pub enum ScoringStrategy {
    Semantic {
        judge: JudgeHarness,
        criteria: Arc<CriteriaSet>,
    },
    RuleBased,
}

impl ScoringStrategy {
    pub fn source(&self) -> ScoreSource {
        match self {
            Self::Semantic { .. } => ScoreSource::Semantic,
            Self::RuleBased => ScoreSource::RuleBased,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CategoryVerdict {
    #[serde(default)]
    criteria_evaluations: Vec<VerdictItem>,
}

#[derive(Debug, Deserialize)]
struct VerdictItem {
    criterion_id: u32,
    status: CriterionStatus,
    #[serde(default)]
    evidence: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StateVerdict {
    patient_state_change: String,
}

struct Scored {
    scores: [f64; 3],
    criteria: Vec<CriterionEvaluation>,
    state_change: String,
    warnings: Vec<String>,
}

/// Scores completed rounds.
#[derive(Debug, Clone)]
pub struct RoundEvaluator {
    strategy: ScoringStrategy,
    rules: RuleBasedScorer,
}

impl Default for RoundEvaluator {
    fn default() -> Self {
        Self::rule_based()
    }
}

impl RoundEvaluator {
    pub fn rule_based() -> Self {
        Self {
            strategy: ScoringStrategy::RuleBased,
            rules: RuleBasedScorer::new(),
        }
    }

    /// Semantic scoring when a judge is available, rule-based otherwise.
    pub fn new(judge: Option<JudgeHarness>, criteria: CriteriaSet) -> Self {
        let strategy = match judge {
            Some(judge) => ScoringStrategy::Semantic {
                judge,
                criteria: Arc::new(criteria),
            },
            None => ScoringStrategy::RuleBased,
        };
        Self {
            strategy,
            rules: RuleBasedScorer::new(),
        }
    }

    pub fn strategy(&self) -> &ScoringStrategy {
        &self.strategy
    }

    /// Score a round. Never fails; stop fields are left pending.
    #[instrument(name = "round.evaluate", skip_all, fields(round = input.round))]
    pub async fn evaluate(&self, input: &RoundInput<'_>) -> RoundEvaluation {
        let (source, scored) = match &self.strategy {
            ScoringStrategy::Semantic { judge, criteria } => {
                match score_semantic(judge, criteria, input, &self.rules).await {
                    Ok(scored) => (ScoreSource::Semantic, scored),
                    Err(e) => {
                        warn!(error = %e, "semantic scoring failed, using rule-based scoring");
                        let mut scored = self.score_rules(input);
                        scored
                            .warnings
                            .insert(0, format!("semantic scoring failed ({e}); used rule-based scoring"));
                        (ScoreSource::RuleBased, scored)
                    }
                }
            }
            ScoringStrategy::RuleBased => (ScoreSource::RuleBased, self.score_rules(input)),
        };

        let [empathy, persuasion, safety] = scored.scores;
        debug!(empathy, persuasion, safety, source = ?source, "round scored");

        RoundEvaluation {
            round_number: input.round,
            empathy,
            persuasion,
            safety,
            patient_state_change: scored.state_change,
            should_stop: false,
            stop_reason: StopReason::None,
            source,
            criteria: scored.criteria,
            warnings: scored.warnings,
        }
    }

    fn score_rules(&self, input: &RoundInput<'_>) -> Scored {
        let mut warnings = Vec::new();
        let mut scores = [NEUTRAL_SCORE; 3];
        for (slot, metric) in scores.iter_mut().zip(Metric::ALL) {
            match self.rules.score(metric, &input.doctor_turn.message) {
                Some(score) => *slot = score,
                None => warnings.push(format!("no {metric} signal; used neutral score {NEUTRAL_SCORE}")),
            }
        }
        Scored {
            scores,
            criteria: Vec::new(),
            state_change: self.rules.describe_state_change(&input.patient_turn.message),
            warnings,
        }
    }
}

const CATEGORY_SYSTEM_PROMPT: &str = "You evaluate one doctor turn in a simulated consultation \
against a fixed list of criteria for a single category. For each criterion decide a status: \
\"met\" (clearly demonstrated this round), \"not_met\" (relevant but not demonstrated), or \
\"not_relevant\" (does not apply to this exchange). Statements contradicting the clinical \
record count as not met for safety. Cite brief evidence from the doctor's words.

Answer with JSON only:
{\"criteria_evaluations\": [{\"criterion_id\": <number>, \"status\": \"met|not_met|not_relevant\", \"evidence\": \"...\"}]}";

const STATE_SYSTEM_PROMPT: &str = "You track how a simulated patient's attitude toward a \
recommended treatment shifts during a consultation. Describe in one or two sentences how the \
patient's openness changed in the latest round, noting breakthroughs or setbacks.

Answer with JSON only: {\"patient_state_change\": \"...\"}";

async fn score_semantic(
    judge: &JudgeHarness,
    criteria: &CriteriaSet,
    input: &RoundInput<'_>,
    rules: &RuleBasedScorer,
) -> Result<Scored, JudgeError> {
    let transcript = render_transcript(input.history);
    let brief = input.brief.render();
    let mut scores = [NEUTRAL_SCORE; 3];
    let mut evaluations = Vec::new();
    let mut warnings = Vec::new();

    for (slot, metric) in scores.iter_mut().zip(Metric::ALL) {
        let user = format!(
            "Category: {metric}\n\n=== Criteria ===\n{}\n=== Clinical record ===\n{brief}\n\n\
             === Round {} doctor turn ===\n{}\n\n=== Patient response ===\n{}\n\n\
             === Dialogue so far ===\n{transcript}",
            criteria.render(metric),
            input.round,
            input.doctor_turn.message,
            input.patient_turn.message,
        );
        let verdict: CategoryVerdict = judge.ask(CATEGORY_SYSTEM_PROMPT, &user).await?;

        let judged: Vec<CriterionEvaluation> = verdict
            .criteria_evaluations
            .into_iter()
            .filter(|item| criteria.get(item.criterion_id).is_some_and(|c| c.metric == metric))
            .map(|item| CriterionEvaluation {
                criterion_id: item.criterion_id,
                metric,
                status: item.status,
                evidence: item.evidence,
            })
            .collect();

        if judged.is_empty() {
            warnings.push(format!(
                "judge returned no {metric} criteria; used neutral score {NEUTRAL_SCORE}"
            ));
        }
        let score = category_score(&judged, metric);
        if !is_valid_score(score) {
            return Err(JudgeError::OutOfRange { metric, value: score });
        }
        *slot = score;
        evaluations.extend(judged);
    }

    let state_user = format!(
        "=== Round {} doctor turn ===\n{}\n\n=== Patient response ===\n{}\n\n=== Dialogue so far ===\n{transcript}",
        input.round, input.doctor_turn.message, input.patient_turn.message,
    );
    let state_change = match judge.ask::<StateVerdict>(STATE_SYSTEM_PROMPT, &state_user).await {
        Ok(v) if !v.patient_state_change.trim().is_empty() => v.patient_state_change,
        Ok(_) => {
            warnings.push("judge gave no state change; used heuristic description".to_string());
            rules.describe_state_change(&input.patient_turn.message)
        }
        Err(e) => {
            warnings.push(format!("state change judge failed ({e}); used heuristic description"));
            rules.describe_state_change(&input.patient_turn.message)
        }
    };

    Ok(Scored {
        scores,
        criteria: evaluations,
        state_change,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::testing::CannedModel;
    use bedside_core::dialogue::Speaker;
    use bedside_core::persona::MedicalCase;
    use std::time::Duration;

    fn brief() -> ClinicalBrief {
        ClinicalBrief {
            age: 60,
            gender: None,
            condition: MedicalCase::LungCancer,
            symptoms: "cough".into(),
            diagnosis: "early-stage lung cancer".into(),
            recommended_treatment: "lobectomy".into(),
            treatment_risks: "bleeding".into(),
            treatment_benefits: "cure".into(),
            prognosis_with_treatment: "good".into(),
            prognosis_without_treatment: "poor".into(),
            background_facts: vec![],
        }
    }

    fn turns(doctor: &str, patient: &str) -> Vec<DialogueTurn> {
        vec![
            DialogueTurn::new(1, 1, Speaker::Doctor, doctor),
            DialogueTurn::new(2, 1, Speaker::Patient, patient),
        ]
    }

    fn input<'a>(history: &'a [DialogueTurn], brief: &'a ClinicalBrief) -> RoundInput<'a> {
        RoundInput {
            round: 1,
            doctor_turn: &history[0],
            patient_turn: &history[1],
            history,
            brief,
        }
    }

    fn judge(model: CannedModel) -> JudgeHarness {
        JudgeHarness::new(Arc::new(model), Duration::from_secs(5), 0)
    }

    #[tokio::test]
    async fn rule_based_fills_missing_metrics_with_neutral() {
        let history = turns("I understand this is scary.", "Okay.");
        let brief = brief();
        let eval = RoundEvaluator::rule_based().evaluate(&input(&history, &brief)).await;

        assert_eq!(eval.source, ScoreSource::RuleBased);
        assert!(eval.empathy > NEUTRAL_SCORE);
        assert_eq!(eval.persuasion, NEUTRAL_SCORE);
        assert_eq!(eval.safety, NEUTRAL_SCORE);
        assert_eq!(eval.warnings.len(), 2);
        assert!(!eval.should_stop);
        assert_eq!(eval.stop_reason, StopReason::None);
    }

    #[tokio::test]
    async fn semantic_scores_from_criteria() {
        // Every category gets the same answer; ids outside the category are ignored.
        let answer = r#"{"criteria_evaluations": [
            {"criterion_id": 1, "status": "met", "evidence": "named the fear"},
            {"criterion_id": 2, "status": "not_met"},
            {"criterion_id": 9, "status": "met"},
            {"criterion_id": 17, "status": "not_relevant"},
            {"criterion_id": 99, "status": "met"}
        ], "patient_state_change": "Patient softened."}"#;
        let evaluator = RoundEvaluator::new(Some(judge(CannedModel::always(answer))), CriteriaSet::builtin());
        let history = turns("We recommend surgery.", "I see.");
        let brief = brief();
        let eval = evaluator.evaluate(&input(&history, &brief)).await;

        assert_eq!(eval.source, ScoreSource::Semantic);
        assert_eq!(eval.empathy, 5.0);
        assert_eq!(eval.persuasion, 10.0);
        assert_eq!(eval.safety, NEUTRAL_SCORE);
        assert_eq!(eval.patient_state_change, "Patient softened.");
        assert_eq!(eval.criteria.len(), 4);
        assert!(eval.warnings.is_empty());
    }

    #[tokio::test]
    async fn empty_judge_verdict_is_flagged() {
        let answer = r#"{"criteria_evaluations": [{"criterion_id": 3, "status": "met"}],
            "patient_state_change": "No change."}"#;
        let evaluator = RoundEvaluator::new(Some(judge(CannedModel::always(answer))), CriteriaSet::builtin());
        let history = turns("We recommend surgery.", "I see.");
        let brief = brief();
        let eval = evaluator.evaluate(&input(&history, &brief)).await;

        assert_eq!(eval.source, ScoreSource::Semantic);
        assert_eq!(eval.empathy, 10.0);
        assert_eq!(eval.persuasion, NEUTRAL_SCORE);
        assert_eq!(eval.safety, NEUTRAL_SCORE);
        assert_eq!(eval.warnings.len(), 2);
        assert!(eval.warnings[0].contains("persuasion"), "{:?}", eval.warnings);
        assert!(eval.warnings[1].contains("safety"), "{:?}", eval.warnings);
    }

    #[tokio::test]
    async fn judge_failure_falls_back_to_rules_with_warning() {
        let evaluator = RoundEvaluator::new(Some(judge(CannedModel::failing())), CriteriaSet::builtin());
        let history = turns("There are risks like infection; it's your decision.", "Hmm.");
        let brief = brief();
        let eval = evaluator.evaluate(&input(&history, &brief)).await;

        assert_eq!(eval.source, ScoreSource::RuleBased);
        assert!(eval.warnings[0].starts_with("semantic scoring failed"));
        assert!(eval.safety > NEUTRAL_SCORE);
        for metric in Metric::ALL {
            assert!(is_valid_score(eval.score(metric)));
        }
    }

    #[tokio::test]
    async fn unparseable_judge_output_falls_back() {
        let evaluator = RoundEvaluator::new(
            Some(judge(CannedModel::always("I think the doctor did well."))),
            CriteriaSet::builtin(),
        );
        let history = turns("Hello.", "Hi.");
        let brief = brief();
        let eval = evaluator.evaluate(&input(&history, &brief)).await;
        assert_eq!(eval.source, ScoreSource::RuleBased);
    }

    #[test]
    fn capability_check_picks_strategy() {
        let without = RoundEvaluator::new(None, CriteriaSet::builtin());
        assert_eq!(without.strategy().source(), ScoreSource::RuleBased);
        let with = RoundEvaluator::new(Some(judge(CannedModel::always("{}"))), CriteriaSet::builtin());
        assert_eq!(with.strategy().source(), ScoreSource::Semantic);
    }
}
