//! What the presence looks like
//!
//! The collapsed view is a single summary line, the expanded view has exactly three slots. Unused
//! slots are hidden instead of removed so the layout does not jump between updates.

use serde::Serialize;

use crate::notes::Note;

/// Number of note slots in the expanded view
pub const PRESENCE_SLOTS: usize = 3;

/// Prefix of the link that opens a note in the editor
const EDITOR_LINK_PREFIX: &str = "agenda://editor?id=";

/// Tap targets of the presence
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PresenceAction {
    /// Open the note in the editor
    OpenNote { note_id: String, link: String },

    /// Close the presence for good
    Close,
}

/// A single note in the expanded view
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSlot {
    pub visible: bool,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<PresenceAction>,
}

impl PresenceSlot {
    fn hidden() -> Self {
        Self::default()
    }

    fn for_note(note: &Note) -> Self {
        Self {
            visible: true,
            title: note.title.clone(),
            content: note.content.clone(),
            action: Some(PresenceAction::OpenNote {
                note_id: note.id.clone(),
                link: format!("{EDITOR_LINK_PREFIX}{}", note.id),
            }),
        }
    }
}

/// The rendered presence
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    /// Collapsed view
    pub summary: String,

    /// Expanded view
    pub slots: [PresenceSlot; PRESENCE_SLOTS],

    /// The close control
    pub close: PresenceAction,
}

impl Presence {
    /// Render the sticky notes, only the first three are shown
    pub fn render(notes: &[Note]) -> Self {
        let summary = match notes.len() {
            1 => "You have 1 pinned task.".to_string(),
            count => format!("You have {count} pinned tasks."),
        };

        Self {
            summary,
            slots: std::array::from_fn(|index| {
                notes
                    .get(index)
                    .map_or_else(PresenceSlot::hidden, PresenceSlot::for_note)
            }),
            close: PresenceAction::Close,
        }
    }

    /// Shown right away on start, before any notes are known
    pub fn placeholder() -> Self {
        Self::render(&[])
    }

    /// Note IDs of the visible slots, in order
    #[cfg(test)]
    pub fn note_ids(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter_map(|slot| match &slot.action {
                Some(PresenceAction::OpenNote { note_id, .. }) => Some(note_id.as_str()),
                Some(PresenceAction::Close) | None => None,
            })
            .collect()
    }
}
