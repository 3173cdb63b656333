//! Assessment tasks, per-session results, and batch output.

use std::collections::BTreeMap;

use bedside_core::session::{DialogueSession, SessionOutcome};
use bedside_core::types::TaskId;
use bedside_evals::PerformanceReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an assessment task.
///
/// `Created -> Working -> (Completed | Failed | Canceled)`. Terminal states
/// never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Created,
    Working,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Whether `self -> next` moves forward in the lifecycle.
    #[must_use]
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Created, Working) | (Created | Working, Completed | Failed | Canceled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one persona's session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub session: DialogueSession,
    /// Absent when no round completed.
    pub report: Option<PerformanceReport>,
    /// Why the session ended early, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionResult {
    pub fn persona_id(&self) -> &str {
        &self.session.persona_id
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.session.outcome()
    }
}

/// Statistics over a task's session results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total_sessions: usize,
    pub reported_sessions: usize,
    /// Session count per outcome name.
    pub outcomes: BTreeMap<String, usize>,
    /// Mean aggregate score over reported sessions.
    pub mean_aggregate_score: Option<f64>,
    pub best_persona: Option<String>,
    pub worst_persona: Option<String>,
}

impl TaskSummary {
    pub fn from_results(results: &[SessionResult]) -> Self {
        let mut outcomes = BTreeMap::new();
        for result in results {
            let key = result.outcome().map_or("unsealed", |o| o.as_str());
            *outcomes.entry(key.to_string()).or_insert(0) += 1;
        }

        let reports: Vec<&PerformanceReport> =
            results.iter().filter_map(|r| r.report.as_ref()).collect();
        let mean_aggregate_score = (!reports.is_empty()).then(|| {
            let sum: f64 = reports.iter().map(|r| r.aggregate_score).sum();
            (sum / reports.len() as f64 * 100.0).round() / 100.0
        });
        let by_score = |a: &&&PerformanceReport, b: &&&PerformanceReport| {
            a.aggregate_score.total_cmp(&b.aggregate_score)
        };
        // max_by keeps the last of equal elements; reversed so ties go to the
        // earlier persona.
        let best_persona = reports
            .iter()
            .rev()
            .max_by(by_score)
            .map(|r| r.persona_id.clone());
        let worst_persona = reports
            .iter()
            .min_by(by_score)
            .map(|r| r.persona_id.clone());

        Self {
            total_sessions: results.len(),
            reported_sessions: reports.len(),
            outcomes,
            mean_aggregate_score,
            best_persona,
            worst_persona,
        }
    }
}

/// Top-level unit of work: one doctor endpoint against many personas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentTask {
    pub id: TaskId,
    pub status: TaskStatus,
    pub doctor_endpoint: String,
    /// Requested persona ids, one session each.
    pub personas: Vec<String>,
    pub max_rounds: u32,
    pub results: Vec<SessionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<TaskSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AssessmentTask {
    pub fn new(doctor_endpoint: impl Into<String>, personas: Vec<String>, max_rounds: u32) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            status: TaskStatus::Created,
            doctor_endpoint: doctor_endpoint.into(),
            personas,
            max_rounds,
            results: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    /// Fraction of personas with a recorded result, 0.0-1.0.
    pub fn progress(&self) -> f64 {
        if self.personas.is_empty() {
            return 1.0;
        }
        self.results.len() as f64 / self.personas.len() as f64
    }

    pub fn has_report(&self) -> bool {
        self.results.iter().any(|r| r.report.is_some())
    }
}

/// Batch output returned to the caller of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub assessment_id: TaskId,
    pub status: TaskStatus,
    pub doctor_endpoint: String,
    pub timestamp: DateTime<Utc>,
    pub sessions: Vec<DialogueSession>,
    pub reports: Vec<PerformanceReport>,
    pub errors: BTreeMap<String, String>,
    pub mean_aggregate_score: f64,
    pub summary: String,
}

impl From<&AssessmentTask> for AssessmentResult {
    /// Results come out in the task's persona order regardless of which
    /// session finished first.
    fn from(task: &AssessmentTask) -> Self {
        let mut results: Vec<&SessionResult> = task.results.iter().collect();
        results.sort_by_key(|r| {
            task.personas
                .iter()
                .position(|p| p == r.persona_id())
                .unwrap_or(usize::MAX)
        });

        let summary = task
            .summary
            .clone()
            .unwrap_or_else(|| TaskSummary::from_results(&task.results));

        Self {
            assessment_id: task.id,
            status: task.status,
            doctor_endpoint: task.doctor_endpoint.clone(),
            timestamp: task.finished_at.unwrap_or(task.updated_at),
            sessions: results.iter().map(|r| r.session.clone()).collect(),
            reports: results.iter().filter_map(|r| r.report.clone()).collect(),
            errors: results
                .iter()
                .filter_map(|r| Some((r.persona_id().to_string(), r.error.clone()?)))
                .collect(),
            mean_aggregate_score: summary.mean_aggregate_score.unwrap_or(0.0),
            summary: describe(task.status, &summary),
        }
    }
}

fn describe(status: TaskStatus, summary: &TaskSummary) -> String {
    let outcomes = summary
        .outcomes
        .iter()
        .map(|(outcome, count)| format!("{count} {outcome}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut text = format!(
        "Assessment {status}: {} session(s), {} reported",
        summary.total_sessions, summary.reported_sessions
    );
    if !outcomes.is_empty() {
        text.push_str(&format!(" ({outcomes})"));
    }
    match summary.mean_aggregate_score {
        Some(mean) => text.push_str(&format!(". Mean aggregate score {mean:.2}/100.")),
        None => text.push('.'),
    }
    text
}
