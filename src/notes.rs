//! Notes, as stored

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::blocks;
use crate::blocks::Block;
use crate::utils::now_millis;

/// How urgent a note is
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    /// Nothing special
    #[default]
    Normal,

    /// Somewhat important
    Medium,

    /// Always shown on the sticky panel
    High,
}

/// The stored urgency is outside of the known range
#[derive(Debug, Error)]
#[error("Unknown urgency: {0}")]
pub struct UnknownUrgency(pub i64);

impl Urgency {
    /// Ordinal as stored
    pub fn ordinal(self) -> i64 {
        match self {
            Self::Normal => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }
}

impl TryFrom<i64> for Urgency {
    type Error = UnknownUrgency;

    fn try_from(ordinal: i64) -> Result<Self, Self::Error> {
        match ordinal {
            0 => Ok(Self::Normal),
            1 => Ok(Self::Medium),
            2 => Ok(Self::High),
            _ => Err(UnknownUrgency(ordinal)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub urgency: Urgency,
    pub is_pinned: bool,
    pub blocks_data: Option<String>,
    pub reminder_time: Option<i64>,
    pub is_alarm: bool,
    pub repeat_mode: Option<String>,
    pub created_at: i64,
}

impl Note {
    /// Is this note shown on the sticky panel?
    pub fn is_sticky(&self) -> bool {
        self.urgency == Urgency::High || self.is_pinned
    }

    /// Decoded blocks of the note, never empty
    pub fn blocks(&self) -> Vec<Block> {
        blocks::decode(self.blocks_data.as_deref())
    }
}

/// Everything an editor hands over when saving a note
///
/// Saving always replaces the whole note, so every field is required.
#[derive(Clone, Debug, Default)]
pub struct NoteDraft {
    pub title: String,
    pub blocks: Vec<Block>,
    pub urgency: Urgency,
    pub is_pinned: bool,
    pub reminder_time: Option<i64>,
    pub is_alarm: bool,
    pub repeat_mode: Option<String>,
}

impl NoteDraft {
    /// Nothing worth saving: no title and no blocks
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.blocks.is_empty()
    }

    /// Turn the draft into a note
    ///
    /// Keeps the ID when an existing note is edited, otherwise a new one is generated. The
    /// creation time is always reset, it acts as "last modified".
    pub fn into_note(self, id: Option<String>) -> Note {
        Note {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            content: blocks::preview(&self.blocks),
            blocks_data: Some(blocks::encode(&self.blocks)),
            title: self.title,
            urgency: self.urgency,
            is_pinned: self.is_pinned,
            reminder_time: self.reminder_time,
            is_alarm: self.is_alarm,
            repeat_mode: self.repeat_mode,
            created_at: now_millis(),
        }
    }
}
