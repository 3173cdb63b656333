//! Round orchestration for a single persona.
//!
//! ```text
//! INITIALIZING -> ROUND_IN_PROGRESS -> EVALUATING -> DECIDING
//!                        ^                              |
//!                        +------------- next -----------+
//!                                                       |
//!                                       REPORTING <- stop
//!                                           |
//!                                        COMPLETE
//! ```
//!
//! The orchestrator owns the session while it runs. Rounds are strictly
//! sequential; cancellation is checked only at the top of a round, never
//! while a participant call is in flight.

use std::sync::Arc;

use async_trait::async_trait;
use bedside_core::config::BedsideConfig;
use bedside_core::dialogue::{Speaker, visible_utterance};
use bedside_core::error::ParticipantError;
use bedside_core::evaluation::{StopDecision, StopReason};
use bedside_core::participant::{DoctorPayload, Participant, PatientPayload, RoundCallClient};
use bedside_core::persona::{Persona, PersonaConstructor, PersonaId};
use bedside_core::session::{DialogueSession, SessionOutcome, SessionPhase};
use bedside_evals::{
    CriteriaSet, JudgeHarness, ReportGenerator, RoundEvaluator, RoundInput, ScoreWeights,
    StopConditionDetector,
};
use tokio_util::sync::CancellationToken;
use tracing::{Span, error, info, instrument, warn};

use crate::error::{ArenaError, RoundFailure};
use crate::task::SessionResult;

/// Runs dialogue sessions against a doctor participant.
pub struct RoundOrchestrator {
    personas: Arc<dyn PersonaConstructor>,
    patient: Arc<dyn Participant<PatientPayload>>,
    client: RoundCallClient,
    evaluator: RoundEvaluator,
    detector: StopConditionDetector,
    reporter: ReportGenerator,
}

impl RoundOrchestrator {
    pub fn new(
        personas: Arc<dyn PersonaConstructor>,
        patient: Arc<dyn Participant<PatientPayload>>,
        client: RoundCallClient,
        evaluator: RoundEvaluator,
        detector: StopConditionDetector,
        reporter: ReportGenerator,
    ) -> Self {
        Self {
            personas,
            patient,
            client,
            evaluator,
            detector,
            reporter,
        }
    }

    /// Wire up scoring, stop detection, and reporting from configuration.
    ///
    /// One judge serves all three when `[judge]` is enabled; the stop
    /// detector only uses it when `judge.semantic_stop` is set.
    pub async fn from_config(
        config: &BedsideConfig,
        personas: Arc<dyn PersonaConstructor>,
        patient: Arc<dyn Participant<PatientPayload>>,
    ) -> Result<Self, ArenaError> {
        config.validate()?;
        let judge = JudgeHarness::from_config(&config.judge)?;
        let criteria = match &config.scoring.criteria_file {
            Some(path) => CriteriaSet::load(path).await?,
            None => CriteriaSet::builtin(),
        };
        let classifier = judge.clone().filter(|_| config.judge.semantic_stop);

        Ok(Self::new(
            personas,
            patient,
            RoundCallClient::new(config.client.retry_policy()),
            RoundEvaluator::new(judge.clone(), criteria),
            StopConditionDetector::new(&config.stop, classifier),
            ReportGenerator::new(ScoreWeights::from(&config.scoring), judge),
        ))
    }

    /// Run one persona's dialogue to a sealed, completed session.
    ///
    /// Never fails: an unknown persona id, setup failures and participant
    /// failures become session outcomes. A report is produced when at least
    /// one round completed.
    #[instrument(
        name = "session.run",
        skip_all,
        fields(persona_id = %persona_id, session_id = tracing::field::Empty, max_rounds = max_rounds)
    )]
    pub async fn run_session(
        &self,
        persona_id: &str,
        doctor: &dyn Participant<DoctorPayload>,
        doctor_endpoint: &str,
        max_rounds: u32,
        cancel: &CancellationToken,
    ) -> SessionResult {
        let parsed = persona_id.parse::<PersonaId>();
        let label = parsed.as_ref().map_or_else(|_| persona_id.trim().to_string(), ToString::to_string);
        let mut session = DialogueSession::new(label, doctor_endpoint);
        Span::current().record("session_id", tracing::field::display(session.id));

        let persona = match parsed {
            Ok(id) => self.personas.construct(&id).await,
            Err(e) => Err(e),
        };
        let (outcome, error) = match persona {
            Ok(persona) => match self.drive(&mut session, &persona, doctor, max_rounds, cancel).await {
                Ok(outcome) => (outcome, None),
                Err(RoundFailure::Unavailable(e)) => {
                    warn!(error = %e, round = session.next_round(), "participant unavailable, ending session");
                    (SessionOutcome::ParticipantUnavailable, Some(e.to_string()))
                }
                Err(RoundFailure::Session(e)) => {
                    error!(error = %e, "session state error, aborting session");
                    (SessionOutcome::SetupFailed, Some(e.to_string()))
                }
            },
            Err(e) => {
                warn!(error = %e, "persona setup failed");
                (SessionOutcome::SetupFailed, Some(e.to_string()))
            }
        };

        self.conclude(session, outcome, error).await
    }

    async fn drive(
        &self,
        session: &mut DialogueSession,
        persona: &Persona,
        doctor: &dyn Participant<DoctorPayload>,
        max_rounds: u32,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, RoundFailure> {
        loop {
            if cancel.is_cancelled() {
                info!(completed_rounds = session.total_rounds(), "cancellation requested");
                return Ok(SessionOutcome::Canceled);
            }
            let round = session.next_round();

            session.transition(SessionPhase::RoundInProgress)?;
            let doctor_payload = DoctorPayload {
                brief: persona.brief.clone(),
                history: session.turns().to_vec(),
            };
            let doctor_message = self.client.call(doctor, &doctor_payload).await?;
            session.append_turn(round, Speaker::Doctor, doctor_message.trim())?;

            let patient_payload = PatientPayload {
                profile: persona.profile.clone(),
                history: session.turns().to_vec(),
            };
            let patient = VisibleSpeech(self.patient.as_ref());
            let patient_message = self.client.call(&patient, &patient_payload).await?;
            session.append_turn(round, Speaker::Patient, patient_message.clone())?;

            session.transition(SessionPhase::Evaluating)?;
            let evaluation = {
                let turns = session.turns();
                let input = RoundInput {
                    round,
                    doctor_turn: &turns[turns.len() - 2],
                    patient_turn: &turns[turns.len() - 1],
                    history: turns,
                    brief: &persona.brief,
                };
                self.evaluator.evaluate(&input).await
            };
            session.push_evaluation(evaluation)?;

            session.transition(SessionPhase::Deciding)?;
            let check = self
                .detector
                .decide(&patient_message, round, max_rounds, session.turns())
                .await;
            let mut decision = check.decision;
            if !decision.should_stop && round >= max_rounds {
                decision = StopDecision::stop(StopReason::MaxRoundsReached);
            }
            if let Some(last) = session.last_evaluation_mut() {
                last.apply_decision(decision);
                last.warnings.extend(check.warnings);
                info!(
                    round,
                    empathy = last.empathy,
                    persuasion = last.persuasion,
                    safety = last.safety,
                    source = ?last.source,
                    stop_reason = decision.reason.as_str(),
                    warnings = last.warnings.len(),
                    "round complete"
                );
            }

            if let Some(outcome) = SessionOutcome::from_stop_reason(decision.reason) {
                return Ok(outcome);
            }
        }
    }

    async fn conclude(
        &self,
        mut session: DialogueSession,
        outcome: SessionOutcome,
        mut error: Option<String>,
    ) -> SessionResult {
        if let Err(e) = session.transition(SessionPhase::Reporting) {
            warn!(error = %e, "unexpected phase before reporting");
        }
        if let Err(e) = session.seal(outcome) {
            warn!(error = %e, "session already sealed");
        }

        let report = if session.total_rounds() > 0 {
            match self.reporter.generate(&session).await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "report generation failed");
                    error.get_or_insert_with(|| e.to_string());
                    None
                }
            }
        } else {
            None
        };

        if let Err(e) = session.complete() {
            warn!(error = %e, "could not complete session");
        }
        info!(
            outcome = outcome.as_str(),
            total_rounds = session.total_rounds(),
            aggregate_score = report.as_ref().map(|r| r.aggregate_score),
            "session finished"
        );

        SessionResult {
            session,
            report,
            error,
        }
    }
}

/// Hands the client only what the patient says aloud. A reply that is all
/// private thought counts as malformed, so it gets the one re-request.
struct VisibleSpeech<'a>(&'a dyn Participant<PatientPayload>);

#[async_trait]
impl Participant<PatientPayload> for VisibleSpeech<'_> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn respond(&self, payload: &PatientPayload) -> Result<String, ParticipantError> {
        let raw = self.0.respond(payload).await?;
        let visible = visible_utterance(&raw);
        if visible.is_empty() && !raw.trim().is_empty() {
            return Err(ParticipantError::MalformedResponse(
                "reply has no visible speech".to_string(),
            ));
        }
        Ok(visible)
    }
}
