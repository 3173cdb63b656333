//! Deterministic keyword scoring used when no judge is available.

use bedside_core::evaluation::{MAX_SCORE, MIN_SCORE, Metric};
use regex::Regex;
use tracing::warn;

use crate::criteria::round2;

const EMPATHY_POSITIVE: &[&str] = &[
    r"\bi (understand|hear you|can see|know this is)\b",
    r"\b(that|this) (must|sounds|can be) (be )?(hard|difficult|scary|frightening|overwhelming|a lot)\b",
    r"\b(it's|it is) (completely |totally )?(normal|natural|understandable|okay) to\b",
    r"\b(i'm|i am) sorry\b",
    r"\b(your|you're|you are) (worried|scared|afraid|concerned|anxious)\b",
    r"\btake (your|all the) time\b",
    r"\bhow (do|are) you feel",
    r"\bwhat (worries|concerns|scares) you\b",
];

const EMPATHY_NEGATIVE: &[&str] = &[
    r"\bcalm down\b",
    r"\b(just|simply) (do|trust|sign|accept)\b",
    r"\bdon't (worry|think) about (it|that)\b",
    r"\b(overreacting|being (silly|dramatic|irrational))\b",
    r"\bthere's nothing to (be afraid|worry)\b",
];

const PERSUASION_POSITIVE: &[&str] = &[
    r"\b(i|we) (strongly )?recommend\b",
    r"\bbenefits?\b",
    r"\b(studies|evidence|research|data)\b",
    r"\b\d+(\.\d+)? ?(%|percent\b)",
    r"\bwithout (the )?(treatment|surgery|operation)\b",
    r"\b(chance|likelihood|odds) of\b",
    r"\b(next step|we can schedule|we could start)\b",
    r"\b(compared to|versus|rather than)\b",
];

const PERSUASION_NEGATIVE: &[&str] = &[
    r"\byou (have|need|must) to (do|have|accept) (it|this|the)\b",
    r"\byou have no (choice|option)\b",
    r"\b(you'll|you will) die\b",
    r"\bif you don't,? (you|i)\b",
];

const SAFETY_POSITIVE: &[&str] = &[
    r"\b(risks?|complications?|side effects?)\b",
    r"\b(infection|bleeding|pain|recovery time)\b",
    r"\b(your|the) (decision|choice)\b",
    r"\b(alternatives?|other options?)\b",
    r"\b(consent|second opinion)\b",
    r"\bany questions\b",
];

const SAFETY_NEGATIVE: &[&str] = &[
    r"\bguarantee[ds]?\b",
    r"\b100 ?(%|percent\b)",
    r"\b(no|zero) risks?\b",
    r"\brisk[- ]free\b",
    r"\bnothing (can|will) go wrong\b",
    r"\b(completely|totally|perfectly) safe\b",
    r"\bnever fails\b",
];

const RECEPTIVE: &[&str] = &[
    r"\b(okay|ok|alright)\b",
    r"\b(makes sense|i see|that helps|good to know)\b",
    r"\bthank(s| you)\b",
    r"\b(i'll|i will|let me) (think|consider)\b",
    r"\b(maybe|perhaps)\b",
];

const RESISTANT: &[&str] = &[
    r"\b(no|nope|never)\b",
    r"\b(won't|will not|refuse|don't want)\b",
    r"\b(scared|afraid|terrified)\b",
    r"\b(don't|do not) (trust|believe)\b",
    r"\b(leave|leaving|goodbye)\b",
];

/// Compile case-insensitive patterns, skipping any that fail to compile.
pub(crate) fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| {
            let source = p.as_ref();
            match Regex::new(&format!("(?i){source}")) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(pattern = source, error = %e, "skipping invalid pattern");
                    None
                }
            }
        })
        .collect()
}

fn count_matches(patterns: &[Regex], text: &str) -> usize {
    patterns.iter().filter(|r| r.is_match(text)).count()
}

/// Positive and negative phrase sets for one metric.
#[derive(Debug, Clone)]
struct SignalSet {
    positive: Vec<Regex>,
    negative: Vec<Regex>,
}

impl SignalSet {
    fn new(positive: &[&str], negative: &[&str]) -> Self {
        Self {
            positive: compile_patterns(positive),
            negative: compile_patterns(negative),
        }
    }

    fn counts(&self, text: &str) -> (usize, usize) {
        (
            count_matches(&self.positive, text),
            count_matches(&self.negative, text),
        )
    }
}

/// Keyword scorer for doctor turns and patient reactions.
#[derive(Debug, Clone)]
pub struct RuleBasedScorer {
    empathy: SignalSet,
    persuasion: SignalSet,
    safety: SignalSet,
    reaction: SignalSet,
}

impl Default for RuleBasedScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleBasedScorer {
    pub fn new() -> Self {
        Self {
            empathy: SignalSet::new(EMPATHY_POSITIVE, EMPATHY_NEGATIVE),
            persuasion: SignalSet::new(PERSUASION_POSITIVE, PERSUASION_NEGATIVE),
            safety: SignalSet::new(SAFETY_POSITIVE, SAFETY_NEGATIVE),
            reaction: SignalSet::new(RECEPTIVE, RESISTANT),
        }
    }

    /// Score one metric for a doctor turn, or `None` when the turn carries
    /// no signal for it.
    ///
    /// Each positive signal adds 1.5 to a neutral 5, each negative signal
    /// subtracts 2.5, clamped to 0-10.
    pub fn score(&self, metric: Metric, doctor_message: &str) -> Option<f64> {
        let set = match metric {
            Metric::Empathy => &self.empathy,
            Metric::Persuasion => &self.persuasion,
            Metric::Safety => &self.safety,
        };
        let (pos, neg) = set.counts(doctor_message);
        if pos == 0 && neg == 0 {
            return None;
        }
        let raw = 5.0 + 1.5 * pos as f64 - 2.5 * neg as f64;
        Some(round2(raw.clamp(MIN_SCORE, MAX_SCORE)))
    }

    /// One-line description of how the patient's stance moved this round.
    pub fn describe_state_change(&self, patient_message: &str) -> String {
        let (receptive, resistant) = self.reaction.counts(patient_message);
        let detail = format!("{receptive} receptive / {resistant} resistant cue(s)");
        match receptive.cmp(&resistant) {
            std::cmp::Ordering::Greater => format!("Patient appears more receptive ({detail})"),
            std::cmp::Ordering::Less => format!("Patient appears more resistant ({detail})"),
            std::cmp::Ordering::Equal if receptive == 0 => "No clear change in patient stance".to_string(),
            std::cmp::Ordering::Equal => format!("Patient stance is mixed ({detail})"),
        }
    }
}
