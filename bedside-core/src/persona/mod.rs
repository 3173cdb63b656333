//! Patient personas: ids, doctor/patient views, and template loading.

mod brief;
mod id;
mod templates;

pub use brief::{ClinicalBrief, PatientBackground, PatientProfile};
pub use id::{Gender, MedicalCase, PERSONALITY_TYPES, PersonaId, expand_persona_ids};
pub use templates::{Persona, PersonaConstructor, TemplatePersonaConstructor};
