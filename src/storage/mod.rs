//! All things related to the storage of notes

use async_trait::async_trait;
use thiserror::Error;

use crate::notes::Note;

pub use memory::Memory;
pub use sqlite::Sqlite;

mod memory;
mod sqlite;

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// A connection error with the storage
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stored data could not be turned into a note
    #[error("Corrupt data: {0}")]
    Corruption(String),
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Storage with all supported operations
///
/// Writes replace whole notes, there are no partial updates.
#[async_trait]
pub trait Storage: Clone + Send + Sync + 'static {
    /// Find all notes
    ///
    /// Pinned first, then by urgency (high first), then newest first
    async fn find_all_notes(&self) -> Result<Vec<Note>>;

    /// Find the notes for the sticky panel
    ///
    /// High urgency or pinned notes, by urgency (high first), then newest first
    async fn find_sticky_notes(&self, limit: usize) -> Result<Vec<Note>>;

    /// Find the most recently saved notes, newest first
    async fn find_recent_notes(&self, limit: usize) -> Result<Vec<Note>>;

    /// Find all notes with a reminder, earliest reminder first
    async fn find_notes_with_reminders(&self) -> Result<Vec<Note>>;

    /// Find a single note by its ID
    async fn find_single_note_by_id(&self, id: &str) -> Result<Option<Note>>;

    /// Insert the note, or replace the note with the same ID
    async fn save_note(&self, note: &Note) -> Result<()>;

    /// Delete a note, nothing happens when it does not exist
    async fn delete_note(&self, note: &Note) -> Result<()>;

    /// Delete multiple notes, unknown IDs are ignored
    async fn delete_notes_by_ids(&self, ids: &[String]) -> Result<()>;
}
