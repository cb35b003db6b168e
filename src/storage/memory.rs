//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::notes::Note;

use super::Result;
use super::Storage;

/// An in-memory storage
///
/// Will be destroyed on system shutdown
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// All notes in storage, by ID
    notes: Arc<Mutex<HashMap<String, Note>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all notes, sorted by the given key
    async fn sorted_by<K, F>(&self, key: F) -> Vec<Note>
    where
        K: Ord,
        F: FnMut(&Note) -> K,
    {
        let mut notes = self
            .notes
            .lock()
            .await
            .values()
            .cloned()
            .collect::<Vec<Note>>();

        notes.sort_by_key(key);

        notes
    }
}

#[async_trait]
impl Storage for Memory {
    async fn find_all_notes(&self) -> Result<Vec<Note>> {
        Ok(self
            .sorted_by(|note| {
                (
                    Reverse(note.is_pinned),
                    Reverse(note.urgency),
                    Reverse(note.created_at),
                )
            })
            .await)
    }

    async fn find_sticky_notes(&self, limit: usize) -> Result<Vec<Note>> {
        Ok(self
            .sorted_by(|note| (Reverse(note.urgency), Reverse(note.created_at)))
            .await
            .into_iter()
            .filter(Note::is_sticky)
            .take(limit)
            .collect())
    }

    async fn find_recent_notes(&self, limit: usize) -> Result<Vec<Note>> {
        Ok(self
            .sorted_by(|note| Reverse(note.created_at))
            .await
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn find_notes_with_reminders(&self) -> Result<Vec<Note>> {
        Ok(self
            .sorted_by(|note| note.reminder_time)
            .await
            .into_iter()
            .filter(|note| note.reminder_time.is_some())
            .collect())
    }

    async fn find_single_note_by_id(&self, id: &str) -> Result<Option<Note>> {
        Ok(self.notes.lock().await.get(id).cloned())
    }

    async fn save_note(&self, note: &Note) -> Result<()> {
        self.notes
            .lock()
            .await
            .insert(note.id.clone(), note.clone());

        Ok(())
    }

    async fn delete_note(&self, note: &Note) -> Result<()> {
        self.notes.lock().await.remove(&note.id);

        Ok(())
    }

    async fn delete_notes_by_ids(&self, ids: &[String]) -> Result<()> {
        let mut notes = self.notes.lock().await;

        for id in ids {
            notes.remove(id);
        }

        Ok(())
    }
}
