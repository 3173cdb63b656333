//! Dialogue session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dialogue::{DialogueTurn, Speaker};
use crate::error::SessionError;
use crate::evaluation::{RoundEvaluation, StopReason};
use crate::types::SessionId;

/// Where a session is in the round loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Initializing,
    RoundInProgress,
    Evaluating,
    Deciding,
    Reporting,
    Complete,
}

impl SessionPhase {
    /// Whether `self -> next` is a legal step of the round loop.
    ///
    /// Any non-terminal phase may jump to `Reporting` so that a participant
    /// failure or cancellation can seal the session mid-round.
    #[must_use]
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Initializing, RoundInProgress)
                | (RoundInProgress, Evaluating)
                | (Evaluating, Deciding)
                | (Deciding, RoundInProgress)
                | (Initializing | RoundInProgress | Evaluating | Deciding, Reporting)
                | (Reporting, Complete)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == SessionPhase::Complete
    }
}

/// Terminal outcome of a dialogue session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    PatientAccepted,
    PatientLeft,
    MaxRoundsReached,
    ParticipantUnavailable,
    Canceled,
    /// The session could not be set up or its round loop was aborted internally.
    SetupFailed,
}

impl SessionOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatientAccepted => "patient_accepted",
            Self::PatientLeft => "patient_left",
            Self::MaxRoundsReached => "max_rounds_reached",
            Self::ParticipantUnavailable => "participant_unavailable",
            Self::Canceled => "canceled",
            Self::SetupFailed => "setup_failed",
        }
    }

    /// Outcome matching a stop reason, if the reason is terminal.
    #[must_use]
    pub fn from_stop_reason(reason: StopReason) -> Option<Self> {
        match reason {
            StopReason::PatientAccepted => Some(Self::PatientAccepted),
            StopReason::PatientLeft => Some(Self::PatientLeft),
            StopReason::MaxRoundsReached => Some(Self::MaxRoundsReached),
            StopReason::None => None,
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One doctor/patient dialogue and its per-round evaluations.
///
/// Turns and evaluations are append-only. Once sealed, the session carries
/// exactly one outcome and rejects further mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueSession {
    pub id: SessionId,
    /// Requested persona id, canonical when it names a known persona.
    pub persona_id: String,
    pub doctor_endpoint: String,
    turns: Vec<DialogueTurn>,
    evaluations: Vec<RoundEvaluation>,
    outcome: Option<SessionOutcome>,
    phase: SessionPhase,
    pub started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl DialogueSession {
    pub fn new(persona_id: impl Into<String>, doctor_endpoint: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            persona_id: persona_id.into(),
            doctor_endpoint: doctor_endpoint.into(),
            turns: Vec::new(),
            evaluations: Vec::new(),
            outcome: None,
            phase: SessionPhase::Initializing,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn turns(&self) -> &[DialogueTurn] {
        &self.turns
    }

    pub fn evaluations(&self) -> &[RoundEvaluation] {
        &self.evaluations
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_sealed(&self) -> bool {
        self.outcome.is_some()
    }

    /// Number of rounds that were fully evaluated.
    pub fn total_rounds(&self) -> u32 {
        self.evaluations.len() as u32
    }

    /// Round number of the next round to run.
    pub fn next_round(&self) -> u32 {
        self.total_rounds() + 1
    }

    /// Stop reason of the final evaluation, or `None`.
    pub fn stop_reason(&self) -> StopReason {
        self.evaluations
            .last()
            .map(|e| e.stop_reason)
            .unwrap_or_default()
    }

    /// Advance the round-loop phase.
    pub fn transition(&mut self, next: SessionPhase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(next) {
            return Err(SessionError::InvalidPhaseTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Append a turn for `round`, assigning the next sequence number.
    pub fn append_turn(
        &mut self,
        round: u32,
        speaker: Speaker,
        message: impl Into<String>,
    ) -> Result<&DialogueTurn, SessionError> {
        self.ensure_open()?;
        let sequence = self.turns.len() as u32 + 1;
        self.turns
            .push(DialogueTurn::new(sequence, round, speaker, message));
        Ok(&self.turns[self.turns.len() - 1])
    }

    /// Append the evaluation for the next round.
    pub fn push_evaluation(&mut self, evaluation: RoundEvaluation) -> Result<(), SessionError> {
        self.ensure_open()?;
        let expected = self.next_round();
        if evaluation.round_number != expected {
            return Err(SessionError::RoundOutOfOrder {
                expected,
                actual: evaluation.round_number,
            });
        }
        self.evaluations.push(evaluation);
        Ok(())
    }

    /// Mutable access to the latest evaluation, for merging the stop decision.
    pub fn last_evaluation_mut(&mut self) -> Option<&mut RoundEvaluation> {
        if self.is_sealed() {
            return None;
        }
        self.evaluations.last_mut()
    }

    /// Record the terminal outcome. Can only happen once.
    pub fn seal(&mut self, outcome: SessionOutcome) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.outcome = Some(outcome);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the session complete after reporting.
    pub fn complete(&mut self) -> Result<(), SessionError> {
        if !self.is_sealed() {
            return Err(SessionError::NotSealed(self.id));
        }
        self.transition(SessionPhase::Complete)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_sealed() {
            return Err(SessionError::AlreadySealed(self.id));
        }
        Ok(())
    }
}
