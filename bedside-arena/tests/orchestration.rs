//! Round loop behavior against scripted participants.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bedside_core::dialogue::Speaker;
use bedside_core::error::ParticipantError;
use bedside_core::evaluation::StopReason;
use bedside_core::participant::{Participant, PatientPayload};
use bedside_core::persona::{MedicalCase, PersonaId};
use bedside_core::session::{SessionOutcome, SessionPhase};
use common::{PROFILE_MARKER, ScriptedDoctor, ScriptedPatient, StubPersonas, orchestrator};
use tokio_util::sync::CancellationToken;

fn persona(id: &str) -> PersonaId {
    id.parse().unwrap()
}

/// Patient whose first `silent_calls` replies are private thought only.
struct ThinkingPatient {
    silent_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Participant<PatientPayload> for ThinkingPatient {
    fn name(&self) -> &str {
        "patient"
    }

    async fn respond(&self, _payload: &PatientPayload) -> Result<String, ParticipantError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.silent_calls {
            Ok("Think: I won't say anything.".to_string())
        } else {
            Ok("Say: Tell me about recovery.".to_string())
        }
    }
}

#[tokio::test]
async fn stops_at_ceiling_when_patient_never_decides() {
    let orchestrator = orchestrator(StubPersonas::default(), ScriptedPatient::new(&["I'm still unsure."]));
    let doctor = ScriptedDoctor::default();

    let result = orchestrator
        .run_session("INTJ_M_PNEUMO", &doctor, "http://doctor", 3, &CancellationToken::new())
        .await;

    let session = &result.session;
    assert_eq!(session.outcome(), Some(SessionOutcome::MaxRoundsReached));
    assert_eq!(session.phase(), SessionPhase::Complete);
    assert_eq!(session.evaluations().len(), 3);
    let rounds: Vec<u32> = session.evaluations().iter().map(|e| e.round_number).collect();
    assert_eq!(rounds, vec![1, 2, 3]);
    let stops: Vec<bool> = session.evaluations().iter().map(|e| e.should_stop).collect();
    assert_eq!(stops, vec![false, false, true]);
    assert_eq!(session.stop_reason(), StopReason::MaxRoundsReached);
    assert_eq!(session.turns().len(), 6);
    assert!(session.ended_at().is_some());

    let report = result.report.expect("report");
    assert_eq!(report.total_rounds, 3);
    assert_eq!(report.outcome, SessionOutcome::MaxRoundsReached);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn ceiling_outcome_is_reproducible() {
    let run = || async {
        let orchestrator = orchestrator(StubPersonas::default(), ScriptedPatient::new(&["Hmm."]));
        let doctor = ScriptedDoctor::default();
        orchestrator
            .run_session("ENFP_LUNG", &doctor, "http://doctor", 2, &CancellationToken::new())
            .await
    };
    let (a, b) = (run().await, run().await);
    assert_eq!(a.session.outcome(), b.session.outcome());
    let scores = |r: &bedside_arena::SessionResult| {
        r.report.as_ref().map(|rep| (rep.aggregate_score, rep.total_rounds))
    };
    assert_eq!(scores(&a), scores(&b));
}

#[tokio::test]
async fn stops_after_round_two_on_acceptance() {
    let patient = ScriptedPatient::new(&[
        "I'm scared of the operation.",
        "Okay, I'll do the surgery.",
        "This round must never happen.",
    ]);
    let orchestrator = orchestrator(StubPersonas::default(), patient);
    let doctor = ScriptedDoctor::default();

    let result = orchestrator
        .run_session("ISFJ_F_LUNG", &doctor, "http://doctor", 10, &CancellationToken::new())
        .await;

    let session = &result.session;
    assert_eq!(session.outcome(), Some(SessionOutcome::PatientAccepted));
    assert_eq!(session.total_rounds(), 2);
    assert_eq!(doctor.calls(), 2);
    let last = session.evaluations().last().unwrap();
    assert!(last.should_stop);
    assert_eq!(last.stop_reason, StopReason::PatientAccepted);
    assert!(!session.evaluations()[0].should_stop);
    assert_eq!(result.report.unwrap().total_rounds, 2);
}

#[tokio::test]
async fn leaving_patient_ends_session() {
    let orchestrator = orchestrator(
        StubPersonas::default(),
        ScriptedPatient::new(&["I've heard enough. Goodbye."]),
    );
    let doctor = ScriptedDoctor::default();
    let result = orchestrator
        .run_session("ESTP_PNEUMO", &doctor, "http://doctor", 10, &CancellationToken::new())
        .await;
    assert_eq!(result.session.outcome(), Some(SessionOutcome::PatientLeft));
    assert_eq!(result.session.total_rounds(), 1);
}

#[tokio::test]
async fn unavailable_doctor_ends_session_without_rounds() {
    let orchestrator = orchestrator(StubPersonas::default(), ScriptedPatient::new(&["Hmm."]));
    let doctor = ScriptedDoctor {
        fail_for: Some(MedicalCase::LungCancer),
        ..Default::default()
    };

    let result = orchestrator
        .run_session("INTJ_LUNG", &doctor, "http://doctor", 5, &CancellationToken::new())
        .await;

    assert_eq!(result.session.outcome(), Some(SessionOutcome::ParticipantUnavailable));
    assert_eq!(result.session.total_rounds(), 0);
    assert_eq!(doctor.calls(), 3);
    assert!(result.report.is_none());
    assert!(result.error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn doctor_never_sees_patient_profile() {
    let orchestrator = orchestrator(
        StubPersonas::default(),
        ScriptedPatient::new(&["Say: I'm worried. Think: I will never agree. Do: crosses arms"]),
    );
    let doctor = ScriptedDoctor::default();

    let result = orchestrator
        .run_session("INTP_M_LUNG", &doctor, "http://doctor", 3, &CancellationToken::new())
        .await;

    let payloads = doctor.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 3);
    for payload in payloads.iter() {
        assert!(!payload.contains(PROFILE_MARKER), "{payload}");
        assert!(!payload.contains("never agree"), "{payload}");
    }
    for turn in result.session.turns() {
        assert!(!turn.message.contains("Think:"));
        if turn.speaker == Speaker::Patient {
            assert!(turn.message.contains("crosses arms"));
        }
    }
}

#[tokio::test]
async fn cancellation_stops_before_next_round() {
    let cancel = CancellationToken::new();
    let patient = ScriptedPatient {
        cancel_on: Some((2, cancel.clone())),
        ..ScriptedPatient::new(&["Hmm."])
    };
    let orchestrator = orchestrator(StubPersonas::default(), patient);
    let doctor = ScriptedDoctor::default();

    let result = orchestrator
        .run_session("ENTJ_PNEUMO", &doctor, "http://doctor", 10, &cancel)
        .await;

    // The in-flight round finishes; no third round starts.
    assert_eq!(result.session.outcome(), Some(SessionOutcome::Canceled));
    assert_eq!(result.session.total_rounds(), 2);
    assert_eq!(doctor.calls(), 2);
    assert!(result.report.is_some());
}

#[tokio::test]
async fn persona_failure_aborts_before_any_round() {
    let personas = StubPersonas {
        fail_for: Some(persona("ESFJ_LUNG")),
    };
    let orchestrator = orchestrator(personas, ScriptedPatient::new(&["Hmm."]));
    let doctor = ScriptedDoctor::default();

    let result = orchestrator
        .run_session("ESFJ_LUNG", &doctor, "http://doctor", 5, &CancellationToken::new())
        .await;

    assert_eq!(result.session.outcome(), Some(SessionOutcome::SetupFailed));
    assert_eq!(result.session.phase(), SessionPhase::Complete);
    assert_eq!(doctor.calls(), 0);
    assert!(result.report.is_none());
    assert!(result.error.unwrap().contains("Unknown persona"));
}

#[tokio::test]
async fn unknown_persona_id_fails_only_its_session() {
    let orchestrator = orchestrator(StubPersonas::default(), ScriptedPatient::new(&["Hmm."]));
    let doctor = ScriptedDoctor::default();

    let result = orchestrator
        .run_session(" INTJ_X_LUNG ", &doctor, "http://doctor", 5, &CancellationToken::new())
        .await;

    assert_eq!(result.session.persona_id, "INTJ_X_LUNG");
    assert_eq!(result.session.outcome(), Some(SessionOutcome::SetupFailed));
    assert_eq!(result.session.total_rounds(), 0);
    assert_eq!(doctor.calls(), 0);
    assert!(result.report.is_none());
    assert_eq!(result.error.as_deref(), Some("Unknown persona: INTJ_X_LUNG"));
}

#[tokio::test]
async fn lowercase_persona_id_is_canonicalized() {
    let orchestrator = orchestrator(StubPersonas::default(), ScriptedPatient::new(&["Hmm."]));
    let doctor = ScriptedDoctor::default();
    let result = orchestrator
        .run_session("enfj_f_pneumo", &doctor, "http://doctor", 1, &CancellationToken::new())
        .await;
    assert_eq!(result.session.persona_id, "ENFJ_F_PNEUMO");
    assert_eq!(result.session.outcome(), Some(SessionOutcome::MaxRoundsReached));
}

#[tokio::test]
async fn thought_only_reply_is_asked_again() {
    let patient = ThinkingPatient {
        silent_calls: 1,
        calls: AtomicUsize::new(0),
    };
    let orchestrator = orchestrator(StubPersonas::default(), patient);
    let doctor = ScriptedDoctor::default();

    let result = orchestrator
        .run_session("ISTP_M_LUNG", &doctor, "http://doctor", 1, &CancellationToken::new())
        .await;

    assert_eq!(result.session.outcome(), Some(SessionOutcome::MaxRoundsReached));
    let patient_turns: Vec<&str> = result
        .session
        .turns()
        .iter()
        .filter(|t| t.speaker == Speaker::Patient)
        .map(|t| t.message.as_str())
        .collect();
    assert_eq!(patient_turns, vec!["Say: Tell me about recovery."]);
    assert_eq!(doctor.calls(), 1);
}

#[tokio::test]
async fn patient_who_never_speaks_is_unavailable() {
    let patient = ThinkingPatient {
        silent_calls: usize::MAX,
        calls: AtomicUsize::new(0),
    };
    let orchestrator = orchestrator(StubPersonas::default(), patient);
    let doctor = ScriptedDoctor::default();

    let result = orchestrator
        .run_session("ISTP_F_PNEUMO", &doctor, "http://doctor", 3, &CancellationToken::new())
        .await;

    assert_eq!(result.session.outcome(), Some(SessionOutcome::ParticipantUnavailable));
    assert!(result.session.turns().iter().all(|t| !t.message.trim().is_empty()));
    assert!(result.report.is_none());
    assert!(result.error.unwrap().contains("no visible speech"));
}
