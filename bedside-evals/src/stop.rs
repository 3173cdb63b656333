//! Stop-condition detection.
//!
//! First match wins: acceptance, then leaving, then the round ceiling.
//! Anything ambiguous keeps the dialogue going; the ceiling is the backstop.

use bedside_core::config::StopConfig;
use bedside_core::dialogue::{DialogueTurn, render_transcript};
use bedside_core::evaluation::{StopDecision, StopReason};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::heuristics::compile_patterns;
use crate::judge::JudgeHarness;

/// Things a patient can commit to. An acceptance phrase has to land on one.
const TREATMENT: &str = r"(it|(the|this|that) (surgery|operation|procedure|treatment|chest tube|drain))";

const ACCEPT_VERB_PHRASES: &[&str] = &[
    r"\bi('ll| will) (do|have|go ahead with|get|take|schedule|start) {t}\b",
    r"\bi('m| am) ready (for|to (do|have|start)) {t}\b",
    r"\bi (agree|consent) to( (do|have))? {t}\b",
    r"\bi accept {t}\b",
    r"\blet's (do|schedule|book) {t}\b",
    r"\bgo ahead and (schedule|book) {t}\b",
];

/// Bare assent that stands as a whole sentence.
const ACCEPT_BARE: &[&str] = &[
    r"\bi (agree|accept|consent)\s*([.!]|$)",
    r"\blet's (do this|go ahead)\b",
    r"\bsign me up\b",
];

/// Doubt, open questions, or refusal make an acceptance phrase non-committal.
const ACCEPT_BLOCKERS: &[&str] = &[
    r"\b(maybe|perhaps|might)\b",
    r"\bnot sure\b",
    r"\b(if|unless)\b",
    r"\bthink about it\b",
    r"\bneed (some |more )?time\b",
    r"\blet me think\b",
    r"\bnot yet\b",
    r"\bhaven't decided\b",
    r"\?",
    r"\b(refuse|decline|reject)",
    r"\bno\b",
    r"\b(won't|will not|not going to|never)\b",
    r"\b(don't|do not) want\b",
    r"\brather not\b",
    r"\bskip\b",
    r"\bgo(ing)? home\b",
];

const LEAVE_PATTERNS: &[&str] = &[
    r"\b(i'm|i am) (leaving|going home|done here|out of here)\b",
    r"\b(goodbye|good-bye)\b",
    r"\b(end|stop) (this|the) (conversation|consultation|discussion)\b",
    r"\bi (don't|do not) want to (talk|hear) about (this|it) any ?more\b",
    r"\bleave me alone\b",
    r"\bi('ve| have) (heard|had) enough\b",
    r"\b(walks|storms|gets up and walks) out\b",
];

/// Only conditional phrasing softens a leave signal.
const LEAVE_BLOCKERS: &[&str] = &[r"\b(if|unless)\b", r"\b(maybe|might)\b"];

/// Stop decision plus anything that went wrong deciding it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StopCheck {
    pub decision: StopDecision,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PatientStance {
    Accepted,
    Left,
    Continue,
}

#[derive(Debug, Deserialize)]
struct StanceVerdict {
    decision: PatientStance,
}

const STANCE_SYSTEM_PROMPT: &str = "You read the latest patient reply in a simulated \
consultation about a recommended treatment. Decide whether the patient has explicitly and \
unambiguously committed to the treatment (\"accepted\"), explicitly ended the conversation or \
disengaged (\"left\"), or neither (\"continue\"). Hesitation, questions, and conditional \
statements are \"continue\".

Answer with JSON only: {\"decision\": \"accepted|left|continue\"}";

/// Decides after every round whether the dialogue should end.
#[derive(Debug, Clone)]
pub struct StopConditionDetector {
    accept: Vec<Regex>,
    accept_blockers: Vec<Regex>,
    leave: Vec<Regex>,
    leave_blockers: Vec<Regex>,
    classifier: Option<JudgeHarness>,
}

impl Default for StopConditionDetector {
    fn default() -> Self {
        Self::new(&StopConfig::default(), None)
    }
}

impl StopConditionDetector {
    /// Built-in phrases plus any configured extras. The classifier, when
    /// present, is consulted only for replies the phrases leave undecided.
    pub fn new(config: &StopConfig, classifier: Option<JudgeHarness>) -> Self {
        let with_object: Vec<String> = ACCEPT_VERB_PHRASES
            .iter()
            .map(|p| p.replace("{t}", TREATMENT))
            .collect();
        let mut accept = compile_patterns(&with_object);
        accept.extend(compile_patterns(ACCEPT_BARE));
        accept.extend(compile_patterns(&config.accept_patterns));
        let mut leave = compile_patterns(LEAVE_PATTERNS);
        leave.extend(compile_patterns(&config.leave_patterns));

        Self {
            accept,
            accept_blockers: compile_patterns(ACCEPT_BLOCKERS),
            leave,
            leave_blockers: compile_patterns(LEAVE_BLOCKERS),
            classifier,
        }
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    #[instrument(name = "round.decide", skip(self, patient_message, history))]
    pub async fn decide(
        &self,
        patient_message: &str,
        round: u32,
        ceiling: u32,
        history: &[DialogueTurn],
    ) -> StopCheck {
        let mut warnings = Vec::new();

        let stance = match self.match_rules(patient_message) {
            Some(stance) => stance,
            None => match &self.classifier {
                Some(judge) => match classify(judge, patient_message, history).await {
                    Ok(stance) => stance,
                    Err(e) => {
                        warn!(error = %e, "stop classifier failed, continuing");
                        warnings.push(format!("stop classifier failed ({e}); treated as continue"));
                        PatientStance::Continue
                    }
                },
                None => PatientStance::Continue,
            },
        };

        let reason = match stance {
            PatientStance::Accepted => StopReason::PatientAccepted,
            PatientStance::Left => StopReason::PatientLeft,
            PatientStance::Continue if round >= ceiling => StopReason::MaxRoundsReached,
            PatientStance::Continue => StopReason::None,
        };
        debug!(reason = reason.as_str(), "stop decision");

        StopCheck {
            decision: StopDecision::stop(reason),
            warnings,
        }
    }

    fn match_rules(&self, text: &str) -> Option<PatientStance> {
        let text = text.replace(['\u{2018}', '\u{2019}'], "'");
        let any = |set: &[Regex]| set.iter().any(|r| r.is_match(&text));
        if any(&self.accept) && !any(&self.accept_blockers) {
            return Some(PatientStance::Accepted);
        }
        if any(&self.leave) && !any(&self.leave_blockers) {
            return Some(PatientStance::Left);
        }
        None
    }
}

async fn classify(
    judge: &JudgeHarness,
    patient_message: &str,
    history: &[DialogueTurn],
) -> Result<PatientStance, crate::error::JudgeError> {
    let user = format!(
        "=== Latest patient reply ===\n{patient_message}\n\n=== Dialogue so far ===\n{}",
        render_transcript(history)
    );
    let verdict: StanceVerdict = judge.ask(STANCE_SYSTEM_PROMPT, &user).await?;
    Ok(verdict.decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::testing::CannedModel;
    use std::sync::Arc;
    use std::time::Duration;

    async fn decide(detector: &StopConditionDetector, text: &str, round: u32) -> StopDecision {
        detector.decide(text, round, 10, &[]).await.decision
    }

    fn with_classifier(model: CannedModel) -> StopConditionDetector {
        let judge = JudgeHarness::new(Arc::new(model), Duration::from_secs(5), 0);
        StopConditionDetector::new(&StopConfig::default(), Some(judge))
    }

    #[tokio::test]
    async fn explicit_acceptance_stops() {
        let detector = StopConditionDetector::default();
        let d = decide(&detector, "Alright doctor, I'll do the surgery.", 2).await;
        assert_eq!(d, StopDecision::stop(StopReason::PatientAccepted));
        let d = decide(&detector, "Okay. Let's schedule it.", 2).await;
        assert!(d.should_stop);
    }

    #[tokio::test]
    async fn hedged_acceptance_continues() {
        let detector = StopConditionDetector::default();
        for text in [
            "Maybe I'll do the surgery.",
            "I'll do it if you can promise it won't hurt.",
            "I'll do it... but let me think first.",
            "So I'll do the surgery next week?",
        ] {
            assert_eq!(decide(&detector, text, 2).await, StopDecision::proceed(), "{text}");
        }
    }

    #[tokio::test]
    async fn refusal_is_not_acceptance() {
        let detector = StopConditionDetector::default();
        for text in [
            "I agree it sounds serious, but I refuse the surgery.",
            "I agree it sounds serious.",
            "I'm ready to go home now. No operation for me.",
            "I'll take the risk and skip the operation.",
            "I won't do it. I'll have the surgery some other year, never now.",
        ] {
            let d = decide(&detector, text, 2).await;
            assert_ne!(d.reason, StopReason::PatientAccepted, "{text}");
        }
    }

    #[tokio::test]
    async fn curly_apostrophes_still_match() {
        let detector = StopConditionDetector::default();
        let d = decide(&detector, "I\u{2019}ll do the surgery.", 2).await;
        assert_eq!(d.reason, StopReason::PatientAccepted);
        let d = decide(&detector, "Let\u{2019}s book it.", 2).await;
        assert_eq!(d.reason, StopReason::PatientAccepted);
    }

    #[tokio::test]
    async fn acceptance_names_what_is_accepted() {
        let detector = StopConditionDetector::default();
        for text in ["I agree to have the operation.", "I consent to the procedure.", "I'm ready for the chest tube."] {
            assert_eq!(decide(&detector, text, 2).await.reason, StopReason::PatientAccepted, "{text}");
        }
    }

    #[tokio::test]
    async fn explicit_leave_stops() {
        let detector = StopConditionDetector::default();
        let d = decide(&detector, "I've heard enough. Goodbye.", 3).await;
        assert_eq!(d, StopDecision::stop(StopReason::PatientLeft));
        let d = decide(&detector, "Say: No. Do: gets up and walks out", 3).await;
        assert_eq!(d.reason, StopReason::PatientLeft);
    }

    #[tokio::test]
    async fn conditional_leave_continues() {
        let detector = StopConditionDetector::default();
        let d = decide(&detector, "If you keep pushing, I'm leaving.", 3).await;
        assert_eq!(d, StopDecision::proceed());
    }

    #[tokio::test]
    async fn acceptance_wins_over_leaving() {
        let detector = StopConditionDetector::default();
        let d = decide(&detector, "I agree. Goodbye for now, see you at the operation.", 3).await;
        assert_eq!(d.reason, StopReason::PatientAccepted);
    }

    #[tokio::test]
    async fn ceiling_forces_stop() {
        let detector = StopConditionDetector::default();
        let check = detector.decide("I'm still unsure.", 10, 10, &[]).await;
        assert_eq!(check.decision, StopDecision::stop(StopReason::MaxRoundsReached));
        let check = detector.decide("I'm still unsure.", 9, 10, &[]).await;
        assert_eq!(check.decision, StopDecision::proceed());
    }

    #[tokio::test]
    async fn accepting_at_ceiling_reports_acceptance() {
        let detector = StopConditionDetector::default();
        let check = detector.decide("I accept the treatment.", 10, 10, &[]).await;
        assert_eq!(check.decision.reason, StopReason::PatientAccepted);
    }

    #[tokio::test]
    async fn configured_patterns_extend_builtins() {
        let config = StopConfig {
            accept_patterns: vec![r"\bbook me in\b".into()],
            leave_patterns: vec![r"\bi'm off\b".into(), "(".into()],
        };
        let detector = StopConditionDetector::new(&config, None);
        assert_eq!(decide(&detector, "Fine, book me in.", 1).await.reason, StopReason::PatientAccepted);
        assert_eq!(decide(&detector, "Right, I'm off.", 1).await.reason, StopReason::PatientLeft);
    }

    #[tokio::test]
    async fn classifier_handles_undecided_replies() {
        let detector = with_classifier(CannedModel::always(r#"{"decision": "accepted"}"#));
        let d = decide(&detector, "You've convinced me, when can we start", 4).await;
        assert_eq!(d.reason, StopReason::PatientAccepted);
    }

    #[tokio::test]
    async fn classifier_not_consulted_when_rules_match() {
        let model = Arc::new(CannedModel::always(r#"{"decision": "left"}"#));
        let judge = JudgeHarness::new(model.clone(), Duration::from_secs(5), 0);
        let detector = StopConditionDetector::new(&StopConfig::default(), Some(judge));
        let d = decide(&detector, "I accept.", 1).await;
        assert_eq!(d.reason, StopReason::PatientAccepted);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn classifier_failure_continues_with_warning() {
        let detector = with_classifier(CannedModel::failing());
        let check = detector.decide("Hmm.", 2, 10, &[]).await;
        assert_eq!(check.decision, StopDecision::proceed());
        assert_eq!(check.warnings.len(), 1);
    }
}
