//! Persona identifiers: `TYPE_G_CASE` or `TYPE_CASE`.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PersonaError;

/// The 16 personality type codes a persona can carry.
pub const PERSONALITY_TYPES: [&str; 16] = [
    "INTJ", "INTP", "ENTJ", "ENTP", "INFJ", "INFP", "ENFJ", "ENFP", "ISTJ", "ISFJ", "ESTJ", "ESFJ",
    "ISTP", "ISFP", "ESTP", "ESFP",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    fn code(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "M" => Some(Self::Male),
            "F" => Some(Self::Female),
            _ => None,
        }
    }

    /// Template file stem (`male` / `female`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

/// Medical scenario a persona is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicalCase {
    Pneumothorax,
    LungCancer,
}

impl MedicalCase {
    pub const ALL: [MedicalCase; 2] = [MedicalCase::Pneumothorax, MedicalCase::LungCancer];

    fn code(self) -> &'static str {
        match self {
            Self::Pneumothorax => "PNEUMO",
            Self::LungCancer => "LUNG",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "PNEUMO" => Some(Self::Pneumothorax),
            "LUNG" => Some(Self::LungCancer),
            _ => None,
        }
    }

    /// Condition identifier, also the case template stem.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pneumothorax => "pneumothorax",
            Self::LungCancer => "lung_cancer",
        }
    }
}

/// A concrete persona, e.g. `INTJ_M_PNEUMO` or `ESFP_LUNG`.
///
/// Serialized as its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersonaId {
    personality: &'static str,
    gender: Option<Gender>,
    case: MedicalCase,
}

impl PersonaId {
    pub fn personality(&self) -> &'static str {
        self.personality
    }

    pub fn gender(&self) -> Option<Gender> {
        self.gender
    }

    pub fn case(&self) -> MedicalCase {
        self.case
    }

    /// Every concrete persona, with or without a gender component.
    pub fn all(with_gender: bool) -> Vec<PersonaId> {
        let genders: &[Option<Gender>] = if with_gender {
            &[Some(Gender::Male), Some(Gender::Female)]
        } else {
            &[None]
        };
        let mut ids = Vec::with_capacity(PERSONALITY_TYPES.len() * 2 * genders.len());
        for personality in PERSONALITY_TYPES {
            for case in MedicalCase::ALL {
                for gender in genders {
                    ids.push(PersonaId {
                        personality,
                        gender: *gender,
                        case,
                    });
                }
            }
        }
        ids
    }

    fn random(with_gender: bool) -> PersonaId {
        let mut rng = rand::thread_rng();
        let personality = PERSONALITY_TYPES.choose(&mut rng).copied().unwrap_or("INTJ");
        let case = MedicalCase::ALL
            .choose(&mut rng)
            .copied()
            .unwrap_or(MedicalCase::Pneumothorax);
        let gender = if with_gender {
            Gender::ALL.choose(&mut rng).copied()
        } else {
            None
        };
        PersonaId {
            personality,
            gender,
            case,
        }
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gender {
            Some(gender) => write!(f, "{}_{}_{}", self.personality, gender.code(), self.case.code()),
            None => write!(f, "{}_{}", self.personality, self.case.code()),
        }
    }
}

impl FromStr for PersonaId {
    type Err = PersonaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || PersonaError::UnknownPersona(s.trim().to_string());
        let upper = s.trim().to_ascii_uppercase();
        let parts: Vec<&str> = upper.split('_').collect();

        let (personality, gender, case) = match parts.as_slice() {
            [p, g, c] => (*p, Some(Gender::from_code(g).ok_or_else(unknown)?), *c),
            [p, c] => (*p, None, *c),
            _ => return Err(unknown()),
        };

        let personality = PERSONALITY_TYPES
            .iter()
            .copied()
            .find(|t| *t == personality)
            .ok_or_else(unknown)?;
        let case = MedicalCase::from_code(case).ok_or_else(unknown)?;

        Ok(PersonaId {
            personality,
            gender,
            case,
        })
    }
}

impl Serialize for PersonaId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PersonaId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl From<PersonaId> for String {
    fn from(id: PersonaId) -> Self {
        id.to_string()
    }
}

/// Expand a requested persona list into the ids to run, one session each.
///
/// The keywords `all`, `all_no_gender`, `random` and `random_no_gender`
/// take precedence over explicit ids, checked in that order. Explicit ids
/// come back in canonical form when they parse and unchanged (trimmed) when
/// they don't; an unknown id fails its own session, not the selection.
pub fn expand_persona_ids<S: AsRef<str>>(requested: &[S]) -> Vec<String> {
    let has = |keyword: &str| requested.iter().any(|r| r.as_ref().trim() == keyword);
    let rendered = |ids: Vec<PersonaId>| -> Vec<String> { ids.iter().map(ToString::to_string).collect() };

    if has("all") {
        return rendered(PersonaId::all(true));
    }
    if has("all_no_gender") {
        return rendered(PersonaId::all(false));
    }
    if has("random") {
        return rendered(vec![PersonaId::random(true)]);
    }
    if has("random_no_gender") {
        return rendered(vec![PersonaId::random(false)]);
    }

    requested
        .iter()
        .map(|r| r.as_ref().trim())
        .filter(|r| !r.is_empty())
        .map(|r| match r.parse::<PersonaId>() {
            Ok(id) => id.to_string(),
            Err(_) => r.to_string(),
        })
        .collect()
}
