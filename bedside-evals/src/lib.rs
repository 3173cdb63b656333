//! Scoring and reporting for bedside assessments.
//!
//! - [`evaluator`]: per-round scores, semantic with rule-based fallback
//! - [`stop`]: decides after each round whether the dialogue ends
//! - [`report`]: aggregates a sealed session into a [`PerformanceReport`]
//!
//! The semantic paths share one [`JudgeHarness`], which bounds every judge
//! call with a timeout and a retry count.

pub mod criteria;
pub mod error;
pub mod evaluator;
pub mod heuristics;
pub mod judge;
pub mod report;
pub mod stop;

pub use criteria::{CriteriaSet, Criterion, category_score};
pub use error::{CriteriaError, JudgeError, ReportError};
pub use evaluator::{RoundEvaluator, RoundInput, ScoringStrategy};
pub use heuristics::RuleBasedScorer;
pub use judge::JudgeHarness;
pub use report::{MetricExtremes, PerformanceReport, ReportGenerator, RoundScore, ScoreWeights};
pub use stop::{StopCheck, StopConditionDetector};
