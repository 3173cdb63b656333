//! Doctor-visible and patient-private persona views.

use serde::{Deserialize, Serialize};

use super::id::{Gender, MedicalCase, PersonaId};

/// Clinical facts a treating doctor would have on file.
///
/// This is the only persona data that ever reaches the doctor participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalBrief {
    pub age: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    pub condition: MedicalCase,
    pub symptoms: String,
    pub diagnosis: String,
    pub recommended_treatment: String,
    pub treatment_risks: String,
    pub treatment_benefits: String,
    pub prognosis_with_treatment: String,
    pub prognosis_without_treatment: String,
    #[serde(default)]
    pub background_facts: Vec<String>,
}

impl ClinicalBrief {
    /// Plain-text rendering used in judge prompts.
    pub fn render(&self) -> String {
        let gender = self.gender.map(Gender::as_str).unwrap_or("unspecified");
        let mut out = format!(
            "Age: {}\nGender: {}\nCondition: {}\nSymptoms: {}\nDiagnosis: {}\n\
             Recommended treatment: {}\nTreatment risks: {}\nTreatment benefits: {}\n\
             Prognosis with treatment: {}\nPrognosis without treatment: {}",
            self.age,
            gender,
            self.condition.as_str(),
            self.symptoms,
            self.diagnosis,
            self.recommended_treatment,
            self.treatment_risks,
            self.treatment_benefits,
            self.prognosis_with_treatment,
            self.prognosis_without_treatment,
        );
        for fact in &self.background_facts {
            out.push_str("\n- ");
            out.push_str(fact);
        }
        out
    }
}

/// Personal background the patient simulator draws on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientBackground {
    pub occupation: String,
    pub family_situation: String,
    pub lifestyle: String,
    pub values: String,
}

/// Full description of the simulated patient. Never sent to the doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub persona_id: PersonaId,
    /// Personality type code, e.g. `INTJ`.
    pub personality: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    pub condition: MedicalCase,
    /// Behavioral directives for the personality type.
    pub directives: String,
    pub background: PatientBackground,
    pub concerns: Vec<String>,
    /// Rendered roleplay instructions for an LLM-driven patient.
    pub system_prompt: String,
}
