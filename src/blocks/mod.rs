//! Blocks, the units of rich note content
//!
//! A note body is an ordered list of blocks. Blocks only exist inside the
//! serialized `blocks_data` of a note; see [`codec`] for the wire format.

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

pub use codec::decode;
pub use codec::encode;
pub use codec::preview;

mod codec;

/// One unit of note content
///
/// The `id` of every variant is ephemeral: it exists to tell blocks apart while editing, is never
/// persisted and is regenerated on every decode. Equality ignores it.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    /// Plain text paragraph
    Text {
        #[serde(default = "Uuid::new_v4")]
        id: Uuid,
        text: String,
    },

    /// Reference to an image owned by someone else
    Image {
        #[serde(default = "Uuid::new_v4")]
        id: Uuid,
        uri: String,
    },

    /// Reference to a locally recorded audio file
    Audio {
        #[serde(default = "Uuid::new_v4")]
        id: Uuid,
        path: String,
    },

    /// Checklist item
    Checkbox {
        #[serde(default = "Uuid::new_v4")]
        id: Uuid,
        text: String,
        #[serde(default)]
        checked: bool,
    },
}

impl Block {
    pub fn text<T: Into<String>>(text: T) -> Self {
        Self::Text {
            id: Uuid::new_v4(),
            text: text.into(),
        }
    }

    pub fn image<U: Into<String>>(uri: U) -> Self {
        Self::Image {
            id: Uuid::new_v4(),
            uri: uri.into(),
        }
    }

    pub fn audio<P: Into<String>>(path: P) -> Self {
        Self::Audio {
            id: Uuid::new_v4(),
            path: path.into(),
        }
    }

    pub fn checkbox<T: Into<String>>(text: T, checked: bool) -> Self {
        Self::Checkbox {
            id: Uuid::new_v4(),
            text: text.into(),
            checked,
        }
    }

    /// The ephemeral editing ID
    #[cfg(test)]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Text { id, .. }
            | Self::Image { id, .. }
            | Self::Audio { id, .. }
            | Self::Checkbox { id, .. } => *id,
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text { text: a, .. }, Self::Text { text: b, .. }) => a == b,
            (Self::Image { uri: a, .. }, Self::Image { uri: b, .. }) => a == b,
            (Self::Audio { path: a, .. }, Self::Audio { path: b, .. }) => a == b,
            (
                Self::Checkbox {
                    text: a,
                    checked: checked_a,
                    ..
                },
                Self::Checkbox {
                    text: b,
                    checked: checked_b,
                    ..
                },
            ) => a == b && checked_a == checked_b,
            _ => false,
        }
    }
}

impl Eq for Block {}
