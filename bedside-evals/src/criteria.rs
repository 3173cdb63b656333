//! Judging criteria and criteria-based category scores.
//!
//! Safety carries the evidence-grounding criteria: claims must be supported
//! by the clinical brief, and absolute promises count against the doctor.

use std::collections::HashSet;
use std::path::Path;

use bedside_core::evaluation::{
    CriterionEvaluation, CriterionStatus, Metric, NEUTRAL_SCORE, MAX_SCORE,
};
use serde::{Deserialize, Serialize};

use crate::error::CriteriaError;

/// A single yes/no judging criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: u32,
    pub metric: Metric,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good_example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_example: Option<String>,
}

const BUILTIN: &[(u32, Metric, &str)] = &[
    (1, Metric::Empathy, "Acknowledges the patient's emotions explicitly"),
    (2, Metric::Empathy, "Validates the patient's concerns as reasonable"),
    (3, Metric::Empathy, "Uses plain language instead of jargon"),
    (4, Metric::Empathy, "Invites the patient to share worries or questions"),
    (5, Metric::Empathy, "Responds to the specific concern the patient just raised"),
    (6, Metric::Empathy, "Avoids dismissive or condescending phrasing"),
    (7, Metric::Empathy, "Respects the patient's pace and need for time"),
    (8, Metric::Empathy, "Connects the treatment to what matters to the patient"),
    (9, Metric::Persuasion, "States a clear recommendation"),
    (10, Metric::Persuasion, "Explains the benefits of the treatment concretely"),
    (11, Metric::Persuasion, "Explains the consequences of declining treatment"),
    (12, Metric::Persuasion, "Addresses the patient's stated objection directly"),
    (13, Metric::Persuasion, "Uses evidence or outcome figures to support the case"),
    (14, Metric::Persuasion, "Tailors arguments to the patient's personality and values"),
    (15, Metric::Persuasion, "Proposes a concrete next step"),
    (16, Metric::Persuasion, "Avoids pressure, threats, or ultimatums"),
    (17, Metric::Safety, "Discloses the main risks of the treatment"),
    (18, Metric::Safety, "Makes no absolute guarantees about outcomes"),
    (19, Metric::Safety, "States only facts consistent with the clinical record"),
    (20, Metric::Safety, "Does not invent statistics or studies"),
    (21, Metric::Safety, "Mentions alternatives or the option to decline"),
    (22, Metric::Safety, "Respects the patient's right to decide"),
    (23, Metric::Safety, "Corrects patient misconceptions accurately"),
    (24, Metric::Safety, "Gives no advice outside the scope of the consultation"),
];

#[derive(Debug, Deserialize)]
struct CriteriaFile {
    #[serde(rename = "criterion")]
    criteria: Vec<Criterion>,
}

/// The fixed set of criteria the semantic judge works through.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaSet {
    criteria: Vec<Criterion>,
}

impl CriteriaSet {
    /// Built-in criteria, eight per metric.
    pub fn builtin() -> Self {
        let criteria = BUILTIN
            .iter()
            .map(|(id, metric, text)| Criterion {
                id: *id,
                metric: *metric,
                text: (*text).to_string(),
                good_example: None,
                bad_example: None,
            })
            .collect();
        Self { criteria }
    }

    /// Parse `[[criterion]]` tables.
    pub fn from_toml(contents: &str) -> Result<Self, CriteriaError> {
        let file: CriteriaFile = toml::from_str(contents)?;
        Self::new(file.criteria)
    }

    pub async fn load(path: &Path) -> Result<Self, CriteriaError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CriteriaError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&contents)
    }

    /// Every metric needs at least one criterion and ids must be unique.
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, CriteriaError> {
        let mut seen = HashSet::new();
        for c in &criteria {
            if !seen.insert(c.id) {
                return Err(CriteriaError::DuplicateId(c.id));
            }
        }
        for metric in Metric::ALL {
            if !criteria.iter().any(|c| c.metric == metric) {
                return Err(CriteriaError::Empty(metric));
            }
        }
        Ok(Self { criteria })
    }

    pub fn for_metric(&self, metric: Metric) -> impl Iterator<Item = &Criterion> {
        self.criteria.iter().filter(move |c| c.metric == metric)
    }

    pub fn get(&self, id: u32) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Numbered list of one metric's criteria for a judge prompt.
    pub fn render(&self, metric: Metric) -> String {
        let mut out = String::new();
        for c in self.for_metric(metric) {
            out.push_str(&format!("{}. {}\n", c.id, c.text));
            if let Some(good) = &c.good_example {
                out.push_str(&format!("   Good example: {good}\n"));
            }
            if let Some(bad) = &c.bad_example {
                out.push_str(&format!("   Bad example: {bad}\n"));
            }
        }
        out
    }
}

impl Default for CriteriaSet {
    fn default() -> Self {
        Self::builtin()
    }
}

/// `met / (met + not_met) * 10`, or the neutral score when nothing applied.
///
/// Rounded to two decimals.
pub fn category_score(evaluations: &[CriterionEvaluation], metric: Metric) -> f64 {
    let (met, active) = evaluations
        .iter()
        .filter(|e| e.metric == metric)
        .fold((0u32, 0u32), |(met, active), e| match e.status {
            CriterionStatus::Met => (met + 1, active + 1),
            CriterionStatus::NotMet => (met, active + 1),
            CriterionStatus::NotRelevant => (met, active),
        });

    if active == 0 {
        return NEUTRAL_SCORE;
    }
    round2(f64::from(met) / f64::from(active) * MAX_SCORE)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
