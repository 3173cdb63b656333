//! Dialogue turns and transcript helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Doctor,
    Patient,
}

impl Speaker {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Patient => "patient",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Doctor => "Doctor",
            Self::Patient => "Patient",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One utterance in a dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// 1-based position in the dialogue.
    pub sequence: u32,
    /// Round this turn belongs to (1-based).
    pub round: u32,
    pub speaker: Speaker,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DialogueTurn {
    pub fn new(sequence: u32, round: u32, speaker: Speaker, message: impl Into<String>) -> Self {
        Self {
            sequence,
            round,
            speaker,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Render turns as a plain `Speaker: message` transcript.
pub fn render_transcript(turns: &[DialogueTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.speaker.label(), turn.message))
        .collect::<Vec<_>>()
        .join("\n")
}

const THINK_MARKER: &str = "Think:";
const DO_MARKER: &str = "Do:";

/// Strip the private `Think:` section from a roleplay-formatted reply.
///
/// Patients may answer as `Say: ... Think: ... Do: ...`. Only the spoken and
/// acted parts are visible to the other side of the conversation.
pub fn visible_utterance(raw: &str) -> String {
    let Some((before, after)) = raw.split_once(THINK_MARKER) else {
        return raw.trim().to_string();
    };

    match after.split_once(DO_MARKER) {
        Some((_, action)) => {
            let before = before.trim_end();
            let action = action.trim();
            if before.is_empty() {
                format!("{DO_MARKER} {action}")
            } else {
                format!("{before} {DO_MARKER} {action}")
            }
        }
        None => before.trim().to_string(),
    }
}
