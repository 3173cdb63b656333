//! Remote and local conversation participants.

mod client;
mod http;
mod llm_patient;
mod traits;

pub use client::{RetryPolicy, RoundCallClient};
pub use http::HttpParticipant;
pub use llm_patient::LlmPatient;
pub use traits::{DoctorPayload, Participant, PatientPayload, WirePayload};
