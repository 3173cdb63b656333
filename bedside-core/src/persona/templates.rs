//! Persona construction from template files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::brief::{ClinicalBrief, PatientBackground, PatientProfile};
use super::id::PersonaId;
use crate::error::PersonaError;

/// The two views of a persona handed to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub brief: ClinicalBrief,
    pub profile: PatientProfile,
}

/// Builds the doctor brief and patient profile for a persona id.
#[async_trait]
pub trait PersonaConstructor: Send + Sync {
    async fn construct(&self, id: &PersonaId) -> Result<Persona, PersonaError>;
}

const ROLEPLAY_INSTRUCTIONS: &str = "You are roleplaying this patient in a medical consultation \
with a doctor. Stay fully in character for the entire conversation. React to the doctor's \
explanations the way this person would, voicing concerns and asking questions. Never discuss \
the roleplay itself.

Answer in the form `Say: <spoken words> Think: <private thoughts> Do: <actions>`. Only the \
Say and Do parts are shown to the doctor. If you decide to accept the treatment, say so \
plainly. If you decide to end the consultation, say that you are leaving.";

/// Structured case file, `cases/<condition>.toml`.
#[derive(Debug, Deserialize)]
struct CaseTemplate {
    age: u32,
    symptoms: String,
    diagnosis: String,
    recommended_treatment: String,
    treatment_risks: String,
    treatment_benefits: String,
    prognosis_with_treatment: String,
    prognosis_without_treatment: String,
    #[serde(default)]
    background_facts: Vec<String>,
    #[serde(default)]
    patient: PatientSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PatientSection {
    #[serde(flatten)]
    background: PatientBackground,
    concerns: Vec<String>,
}

/// Reads personas from a template directory:
///
/// ```text
/// <root>/personality/<type>.txt
/// <root>/gender/<male|female>.txt
/// <root>/cases/<condition>.toml
/// ```
#[derive(Debug, Clone)]
pub struct TemplatePersonaConstructor {
    root: PathBuf,
}

impl TemplatePersonaConstructor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn personality_path(&self, id: &PersonaId) -> PathBuf {
        self.root
            .join("personality")
            .join(format!("{}.txt", id.personality().to_ascii_lowercase()))
    }

    fn case_path(&self, id: &PersonaId) -> PathBuf {
        self.root
            .join("cases")
            .join(format!("{}.toml", id.case().as_str()))
    }

    fn gender_path(&self, id: &PersonaId) -> Option<PathBuf> {
        id.gender().map(|g| {
            self.root
                .join("gender")
                .join(format!("{}.txt", g.as_str()))
        })
    }
}

async fn read_template(path: &Path) -> Result<String, PersonaError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text.trim().to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(PersonaError::MissingTemplate(path.to_path_buf()))
        }
        Err(e) => Err(PersonaError::Io(e)),
    }
}

#[async_trait]
impl PersonaConstructor for TemplatePersonaConstructor {
    #[instrument(name = "persona.construct", skip(self), fields(persona_id = %id))]
    async fn construct(&self, id: &PersonaId) -> Result<Persona, PersonaError> {
        let personality = read_template(&self.personality_path(id)).await?;
        let gender_text = match self.gender_path(id) {
            Some(path) => Some(read_template(&path).await?),
            None => None,
        };

        let case_path = self.case_path(id);
        let case_text = read_template(&case_path).await?;
        let case: CaseTemplate =
            toml::from_str(&case_text).map_err(|e| PersonaError::InvalidTemplate {
                path: case_path.clone(),
                message: e.to_string(),
            })?;

        let brief = ClinicalBrief {
            age: case.age,
            gender: id.gender(),
            condition: id.case(),
            symptoms: case.symptoms,
            diagnosis: case.diagnosis,
            recommended_treatment: case.recommended_treatment,
            treatment_risks: case.treatment_risks,
            treatment_benefits: case.treatment_benefits,
            prognosis_with_treatment: case.prognosis_with_treatment,
            prognosis_without_treatment: case.prognosis_without_treatment,
            background_facts: case.background_facts,
        };

        let system_prompt = render_system_prompt(
            id,
            &personality,
            gender_text.as_deref(),
            &brief,
            &case.patient,
        );

        let profile = PatientProfile {
            persona_id: id.clone(),
            personality: id.personality().to_string(),
            gender: id.gender(),
            condition: id.case(),
            directives: personality,
            background: case.patient.background,
            concerns: case.patient.concerns,
            system_prompt,
        };

        debug!(root = %self.root.display(), "persona constructed");
        Ok(Persona { brief, profile })
    }
}

fn render_system_prompt(
    id: &PersonaId,
    personality: &str,
    gender: Option<&str>,
    brief: &ClinicalBrief,
    patient: &PatientSection,
) -> String {
    let mut prompt = format!(
        "You are a {}-year-old patient facing {}.\n\n\
         === Personality ({}) ===\n{}\n",
        brief.age,
        id.case().as_str().replace('_', " "),
        id.personality(),
        personality,
    );

    if let Some(gender) = gender {
        prompt.push_str(&format!("\n=== Gender ===\n{gender}\n"));
    }

    prompt.push_str(&format!(
        "\n=== Your situation ===\nSymptoms: {}\nDiagnosis: {}\nThe doctor recommends: {}\n",
        brief.symptoms, brief.diagnosis, brief.recommended_treatment,
    ));

    let bg = &patient.background;
    let details = [
        ("Occupation", &bg.occupation),
        ("Family", &bg.family_situation),
        ("Lifestyle", &bg.lifestyle),
        ("Values", &bg.values),
    ];
    if details.iter().any(|(_, v)| !v.is_empty()) {
        prompt.push_str("\n=== Background ===\n");
        for (label, value) in details.iter().filter(|(_, v)| !v.is_empty()) {
            prompt.push_str(&format!("{label}: {value}\n"));
        }
    }

    if !patient.concerns.is_empty() {
        prompt.push_str("\n=== Concerns and fears ===\n");
        for concern in &patient.concerns {
            prompt.push_str(&format!("- {concern}\n"));
        }
    }

    prompt.push_str("\n---\n");
    prompt.push_str(ROLEPLAY_INSTRUCTIONS);
    prompt
}
