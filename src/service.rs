//! Note service
//!
//! Sits between the callers and the storage. Owns the live views: every committed write pushes a
//! fresh snapshot of the all/sticky/recent views to their watch channels. A watch channel only keeps
//! the newest snapshot, so slow subscribers skip intermediate ones instead of queueing them.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::notes::Note;
use crate::notes::NoteDraft;
use crate::storage::Result;
use crate::storage::Storage;

/// Maximum number of notes on the sticky panel
pub const STICKY_LIMIT: usize = 3;

/// Maximum number of recent notes
pub const RECENT_LIMIT: usize = 5;

/// The named live views
struct Views {
    all: watch::Sender<Vec<Note>>,
    sticky: watch::Sender<Vec<Note>>,
    recent: watch::Sender<Vec<Note>>,
}

/// Note service, cheap to clone
#[derive(Clone)]
pub struct NoteService<S: Storage> {
    storage: S,
    views: Arc<Views>,

    /// Serializes writes together with the view refresh that follows them
    write_lock: Arc<Mutex<()>>,
}

impl<S: Storage> NoteService<S> {
    /// Create the service and load the initial views
    pub async fn new(storage: S) -> Result<Self> {
        let service = Self {
            storage,
            views: Arc::new(Views {
                all: watch::Sender::new(Vec::new()),
                sticky: watch::Sender::new(Vec::new()),
                recent: watch::Sender::new(Vec::new()),
            }),
            write_lock: Arc::new(Mutex::new(())),
        };

        service.refresh_views().await?;

        Ok(service)
    }

    /// All notes: pinned first, then by urgency, then newest first
    pub fn all_notes(&self) -> watch::Receiver<Vec<Note>> {
        self.views.all.subscribe()
    }

    /// Up to three high urgency or pinned notes
    pub fn sticky_notes(&self) -> watch::Receiver<Vec<Note>> {
        self.views.sticky.subscribe()
    }

    /// Up to five most recently saved notes
    pub fn recent_notes(&self) -> watch::Receiver<Vec<Note>> {
        self.views.recent.subscribe()
    }

    /// Find a single note
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Note>> {
        self.storage.find_single_note_by_id(id).await
    }

    /// Notes with a reminder, earliest first
    pub async fn upcoming_reminders(&self) -> Result<Vec<Note>> {
        self.storage.find_notes_with_reminders().await
    }

    /// Case-insensitive search on title and content, in the order of the all-notes view
    pub async fn search(&self, query: &str) -> Result<Vec<Note>> {
        let query = query.to_lowercase();

        Ok(self
            .storage
            .find_all_notes()
            .await?
            .into_iter()
            .filter(|note| {
                note.title.to_lowercase().contains(&query)
                    || note.content.to_lowercase().contains(&query)
            })
            .collect())
    }

    /// Save a note, replacing any note with the same ID
    ///
    /// Only fails when the note was not stored.
    pub async fn save(&self, note: &Note) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        self.storage.save_note(note).await?;

        tracing::debug!("Saved note {}", note.id);

        self.publish_views().await;

        Ok(())
    }

    /// Save a note in the background
    ///
    /// The save is owned by its own task, so it completes even when the caller goes away right after
    pub fn spawn_save(&self, note: Note) -> JoinHandle<Result<()>> {
        let service = self.clone();

        tokio::spawn(async move {
            let result = service.save(&note).await;

            if let Err(err) = &result {
                tracing::error!("Could not save note {} in the background: {err}", note.id);
            }

            result
        })
    }

    /// Save what an editor hands over
    ///
    /// An empty draft is not saved and `None` is returned. Otherwise the saved note is returned,
    /// it keeps the given ID or gets a new one.
    pub async fn save_draft(&self, id: Option<String>, draft: NoteDraft) -> Result<Option<Note>> {
        if draft.is_empty() {
            tracing::debug!("Not saving an empty note");

            return Ok(None);
        }

        let note = draft.into_note(id);

        self.save(&note).await?;

        Ok(Some(note))
    }

    /// Delete a single note, a missing note is fine
    pub async fn delete_one(&self, note: &Note) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        self.storage.delete_note(note).await?;

        tracing::debug!("Deleted note {}", note.id);

        self.publish_views().await;

        Ok(())
    }

    /// Delete multiple notes, missing notes are fine
    pub async fn delete_many(&self, ids: &[String]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        self.storage.delete_notes_by_ids(ids).await?;

        tracing::debug!("Deleted {} note(s)", ids.len());

        self.publish_views().await;

        Ok(())
    }

    /// Refresh the views after a committed write
    ///
    /// The write stays committed when the views can not be queried, subscribers keep the previous
    /// snapshot until the next successful write.
    async fn publish_views(&self) {
        if let Err(err) = self.refresh_views().await {
            tracing::error!("Could not refresh the note views: {err}");
        }
    }

    /// Query all views again and push the snapshots to their subscribers
    async fn refresh_views(&self) -> Result<()> {
        let all = self.storage.find_all_notes().await?;
        let sticky = self.storage.find_sticky_notes(STICKY_LIMIT).await?;
        let recent = self.storage.find_recent_notes(RECENT_LIMIT).await?;

        self.views.all.send_replace(all);
        self.views.sticky.send_replace(sticky);
        self.views.recent.send_replace(recent);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use crate::blocks::Block;
    use crate::notes::Urgency;
    use crate::storage::Error;
    use crate::storage::Memory;
    use crate::storage::Sqlite;

    use super::*;

    /// Memory storage where queries start failing on request, writes keep working
    #[derive(Clone, Default)]
    struct FlakyReads {
        inner: Memory,
        failing: Arc<AtomicBool>,
    }

    impl FlakyReads {
        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Connection("read timed out".to_string()));
            }

            Ok(())
        }
    }

    #[async_trait]
    impl Storage for FlakyReads {
        async fn find_all_notes(&self) -> Result<Vec<Note>> {
            self.check()?;
            self.inner.find_all_notes().await
        }

        async fn find_sticky_notes(&self, limit: usize) -> Result<Vec<Note>> {
            self.check()?;
            self.inner.find_sticky_notes(limit).await
        }

        async fn find_recent_notes(&self, limit: usize) -> Result<Vec<Note>> {
            self.check()?;
            self.inner.find_recent_notes(limit).await
        }

        async fn find_notes_with_reminders(&self) -> Result<Vec<Note>> {
            self.check()?;
            self.inner.find_notes_with_reminders().await
        }

        async fn find_single_note_by_id(&self, id: &str) -> Result<Option<Note>> {
            self.inner.find_single_note_by_id(id).await
        }

        async fn save_note(&self, note: &Note) -> Result<()> {
            self.inner.save_note(note).await
        }

        async fn delete_note(&self, note: &Note) -> Result<()> {
            self.inner.delete_note(note).await
        }

        async fn delete_notes_by_ids(&self, ids: &[String]) -> Result<()> {
            self.inner.delete_notes_by_ids(ids).await
        }
    }

    fn note(id: &str, urgency: Urgency, is_pinned: bool, created_at: i64) -> Note {
        Note {
            id: id.to_string(),
            title: format!("Title {id}"),
            content: String::new(),
            urgency,
            is_pinned,
            blocks_data: None,
            reminder_time: None,
            is_alarm: false,
            repeat_mode: None,
            created_at,
        }
    }

    fn ids(notes: &[Note]) -> Vec<String> {
        notes.iter().map(|note| note.id.clone()).collect()
    }

    async fn check_sticky_scenario<S: Storage>(storage: S) {
        let service = NoteService::new(storage).await.unwrap();
        let sticky = service.sticky_notes();

        let mut milk = note("A", Urgency::High, false, 1);
        milk.title = "Milk".to_string();
        service.save(&milk).await.unwrap();

        assert_eq!(vec!["A".to_string()], ids(&sticky.borrow()));

        milk.urgency = Urgency::Normal;
        service.save(&milk).await.unwrap();

        assert!(sticky.borrow().is_empty());

        milk.is_pinned = true;
        service.save(&milk).await.unwrap();

        assert_eq!(vec!["A".to_string()], ids(&sticky.borrow()));
    }

    #[tokio::test]
    async fn test_sticky_scenario_memory() {
        check_sticky_scenario(Memory::new()).await;
    }

    #[tokio::test]
    async fn test_sticky_scenario_sqlite() {
        check_sticky_scenario(Sqlite::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_sticky_cap() {
        let service = NoteService::new(Memory::new()).await.unwrap();

        for created_at in 0..6 {
            service
                .save(&note(&format!("n{created_at}"), Urgency::High, true, created_at))
                .await
                .unwrap();
        }

        assert_eq!(STICKY_LIMIT, service.sticky_notes().borrow().len());
        assert_eq!(6, service.all_notes().borrow().len());
    }

    #[tokio::test]
    async fn test_recent_cap() {
        let service = NoteService::new(Memory::new()).await.unwrap();

        for created_at in 0..8 {
            service
                .save(&note(&format!("n{created_at}"), Urgency::Normal, false, created_at))
                .await
                .unwrap();
        }

        assert_eq!(
            vec!["n7", "n6", "n5", "n4", "n3"],
            ids(&service.recent_notes().borrow())
        );
    }

    #[tokio::test]
    async fn test_initial_views_are_loaded() {
        let storage = Memory::new();
        storage
            .save_note(&note("existing", Urgency::High, false, 1))
            .await
            .unwrap();

        let service = NoteService::new(storage).await.unwrap();

        assert_eq!(vec!["existing".to_string()], ids(&service.all_notes().borrow()));
        assert_eq!(vec!["existing".to_string()], ids(&service.sticky_notes().borrow()));
    }

    #[tokio::test]
    async fn test_subscriber_sees_latest_snapshot_only() {
        let service = NoteService::new(Memory::new()).await.unwrap();
        let mut all = service.all_notes();
        all.borrow_and_update();

        service.save(&note("one", Urgency::Normal, false, 1)).await.unwrap();
        service.save(&note("two", Urgency::Normal, false, 2)).await.unwrap();
        service.save(&note("three", Urgency::Normal, false, 3)).await.unwrap();

        all.changed().await.unwrap();
        assert_eq!(3, all.borrow_and_update().len());
        assert!(!all.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_upsert_idempotence() {
        let service = NoteService::new(Memory::new()).await.unwrap();
        let first = note("A", Urgency::High, false, 1);

        service.save(&first).await.unwrap();
        service.save(&first).await.unwrap();

        let mut second = first.clone();
        second.title = "Final".to_string();
        service.save(&second).await.unwrap();

        let all = service.all_notes().borrow().clone();
        assert_eq!(vec![second.clone()], all);
        assert_eq!(Some(second), service.get_by_id("A").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let service = NoteService::new(Memory::new()).await.unwrap();
        let one = note("one", Urgency::High, false, 1);

        service.save(&one).await.unwrap();
        service.save(&note("two", Urgency::Normal, false, 2)).await.unwrap();
        service.save(&note("three", Urgency::Normal, false, 3)).await.unwrap();

        service.delete_one(&one).await.unwrap();
        assert!(service.sticky_notes().borrow().is_empty());

        service
            .delete_many(&["two".to_string(), "unknown".to_string()])
            .await
            .unwrap();

        assert_eq!(vec!["three".to_string()], ids(&service.all_notes().borrow()));
    }

    #[tokio::test]
    async fn test_committed_write_survives_failed_refresh() {
        let storage = FlakyReads::default();
        let service = NoteService::new(storage.clone()).await.unwrap();
        let first = note("first", Urgency::Normal, false, 1);
        service.save(&first).await.unwrap();

        storage.failing.store(true, Ordering::SeqCst);

        let second = note("second", Urgency::High, false, 2);
        service.save(&second).await.unwrap();

        assert_eq!(Some(second.clone()), service.get_by_id("second").await.unwrap());
        assert_eq!(vec!["first".to_string()], ids(&service.all_notes().borrow()));

        service.delete_one(&first).await.unwrap();
        assert_eq!(None, service.get_by_id("first").await.unwrap());

        storage.failing.store(false, Ordering::SeqCst);

        service.delete_many(&[]).await.unwrap();
        assert_eq!(vec!["second".to_string()], ids(&service.all_notes().borrow()));
    }

    #[tokio::test]
    async fn test_search() {
        let service = NoteService::new(Memory::new()).await.unwrap();

        let mut groceries = note("groceries", Urgency::Normal, false, 1);
        groceries.title = "Groceries".to_string();
        groceries.content = "milk and bread".to_string();
        let mut work = note("work", Urgency::High, false, 2);
        work.title = "Work".to_string();
        work.content = "Call about the MILK delivery".to_string();

        service.save(&groceries).await.unwrap();
        service.save(&work).await.unwrap();

        assert_eq!(
            vec!["work".to_string(), "groceries".to_string()],
            ids(&service.search("Milk").await.unwrap())
        );
        assert_eq!(
            vec!["groceries".to_string()],
            ids(&service.search("grocer").await.unwrap())
        );
        assert!(service.search("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_draft() {
        let service = NoteService::new(Memory::new()).await.unwrap();

        let saved = service.save_draft(None, NoteDraft::default()).await.unwrap();
        assert_eq!(None, saved);
        assert!(service.all_notes().borrow().is_empty());

        let draft = NoteDraft {
            title: "Trip".to_string(),
            blocks: vec![Block::text("pack"), Block::image("file:///map.png")],
            ..NoteDraft::default()
        };
        let created = service.save_draft(None, draft).await.unwrap().unwrap();
        assert_eq!("pack", created.content);

        let draft = NoteDraft {
            title: "Trip".to_string(),
            blocks: vec![Block::text("pack"), Block::text("passport")],
            ..NoteDraft::default()
        };
        let updated = service
            .save_draft(Some(created.id.clone()), draft)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(vec![updated], service.all_notes().borrow().clone());
    }

    #[tokio::test]
    async fn test_spawn_save_outlives_caller() {
        let service = NoteService::new(Memory::new()).await.unwrap();

        let handle = {
            let scoped = service.clone();
            scoped.spawn_save(note("bg", Urgency::Normal, false, 1))
        };

        handle.await.unwrap().unwrap();

        assert!(service.get_by_id("bg").await.unwrap().is_some());
    }
}
