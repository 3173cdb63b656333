//! Shared stubs for bedside-arena integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bedside_arena::{AssessmentRunner, AssessmentTaskStore, DoctorConnector, RoundOrchestrator};
use bedside_core::config::DialogueConfig;
use bedside_core::error::{ParticipantError, PersonaError};
use bedside_core::participant::{
    DoctorPayload, Participant, PatientPayload, RetryPolicy, RoundCallClient,
};
use bedside_core::persona::{
    ClinicalBrief, MedicalCase, PatientBackground, PatientProfile, Persona, PersonaConstructor,
    PersonaId,
};
use bedside_evals::{ReportGenerator, RoundEvaluator, StopConditionDetector};
use tokio_util::sync::CancellationToken;

/// Text that only ever appears in patient profiles.
#[allow(dead_code)]
pub const PROFILE_MARKER: &str = "HIDDEN-PROFILE-7f3a";

/// Builds personas in memory; optionally fails for one persona.
#[derive(Default)]
pub struct StubPersonas {
    pub fail_for: Option<PersonaId>,
}

#[async_trait]
impl PersonaConstructor for StubPersonas {
    async fn construct(&self, id: &PersonaId) -> Result<Persona, PersonaError> {
        if self.fail_for.as_ref() == Some(id) {
            return Err(PersonaError::UnknownPersona(id.to_string()));
        }
        let brief = ClinicalBrief {
            age: 52,
            gender: id.gender(),
            condition: id.case(),
            symptoms: "shortness of breath".into(),
            diagnosis: "confirmed on imaging".into(),
            recommended_treatment: "surgery".into(),
            treatment_risks: "bleeding, infection".into(),
            treatment_benefits: "cure".into(),
            prognosis_with_treatment: "good".into(),
            prognosis_without_treatment: "poor".into(),
            background_facts: vec!["non-smoker".into()],
        };
        let profile = PatientProfile {
            persona_id: id.clone(),
            personality: id.personality().to_string(),
            gender: id.gender(),
            condition: id.case(),
            directives: format!("{PROFILE_MARKER} directives"),
            background: PatientBackground {
                occupation: format!("{PROFILE_MARKER} carpenter"),
                ..Default::default()
            },
            concerns: vec![format!("{PROFILE_MARKER} fear of surgery")],
            system_prompt: format!("{PROFILE_MARKER} prompt"),
        };
        Ok(Persona { brief, profile })
    }
}

/// Doctor that records every payload it receives.
#[derive(Default)]
pub struct ScriptedDoctor {
    /// Every call fails for briefs of this condition.
    pub fail_for: Option<MedicalCase>,
    pub payloads: Mutex<Vec<String>>,
}

impl ScriptedDoctor {
    pub fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

#[async_trait]
impl Participant<DoctorPayload> for ScriptedDoctor {
    fn name(&self) -> &str {
        "doctor"
    }

    async fn respond(&self, payload: &DoctorPayload) -> Result<String, ParticipantError> {
        self.payloads
            .lock()
            .unwrap()
            .push(serde_json::to_string(payload).unwrap());
        if self.fail_for == Some(payload.brief.condition) {
            return Err(ParticipantError::Transport("connection refused".into()));
        }
        let round = payload.history.len() / 2 + 1;
        Ok(format!("I understand. I recommend surgery; the benefits are clear (round {round})."))
    }
}

/// Patient replying from a script by round; the last reply repeats.
pub struct ScriptedPatient {
    pub replies: Vec<String>,
    /// Cancel this token while answering the given round.
    pub cancel_on: Option<(usize, CancellationToken)>,
}

impl ScriptedPatient {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            cancel_on: None,
        }
    }
}

#[async_trait]
impl Participant<PatientPayload> for ScriptedPatient {
    fn name(&self) -> &str {
        "patient"
    }

    async fn respond(&self, payload: &PatientPayload) -> Result<String, ParticipantError> {
        let round = (payload.history.len() + 1) / 2;
        if let Some((cancel_round, token)) = &self.cancel_on
            && *cancel_round == round
        {
            token.cancel();
        }
        let index = round.saturating_sub(1).min(self.replies.len() - 1);
        Ok(self.replies[index].clone())
    }
}

/// Retries quickly so failure tests finish fast.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        attempt_timeout: Duration::from_secs(2),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        jitter: 0.0,
    }
}

pub fn orchestrator(
    personas: StubPersonas,
    patient: impl Participant<PatientPayload> + 'static,
) -> RoundOrchestrator {
    RoundOrchestrator::new(
        Arc::new(personas),
        Arc::new(patient),
        RoundCallClient::new(fast_policy()),
        RoundEvaluator::rule_based(),
        StopConditionDetector::default(),
        ReportGenerator::default(),
    )
}

/// Hands out the same scripted doctor for every endpoint.
#[allow(dead_code)]
pub struct FixedDoctor(pub Arc<ScriptedDoctor>);

impl DoctorConnector for FixedDoctor {
    fn connect(&self, _endpoint: &str) -> Arc<dyn Participant<DoctorPayload>> {
        self.0.clone()
    }
}

#[allow(dead_code)]
pub fn runner(orchestrator: RoundOrchestrator, doctor: Arc<ScriptedDoctor>) -> AssessmentRunner {
    AssessmentRunner::new(
        Arc::new(AssessmentTaskStore::new()),
        Arc::new(orchestrator),
        Arc::new(FixedDoctor(doctor)),
        DialogueConfig::default(),
    )
}
