//! SQLite storage

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::QueryBuilder;
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqlitePoolOptions;

use crate::notes::Note;
use crate::notes::Urgency;

use super::Error;
use super::Result;
use super::Storage;

/// Migrator to run migrations on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// All columns of the notes table, in the order of [`SqlxNote`]
const NOTE_COLUMNS: &str =
    "id, title, content, urgency, isPinned, blocksData, reminderTime, isAlarm, repeatMode, createdAt";

/// SQLite storage
#[derive(Clone, Debug)]
pub struct Sqlite {
    /// Pool of connections
    connection_pool: SqlitePool,
}

impl Sqlite {
    /// Create SQLite storage from a connection string, like `sqlite://agenda.db`
    ///
    /// The database file is created when missing, migrations will be run
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(connection_error)?
            .create_if_missing(true);

        let connection_pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await
            .map_err(connection_error)?;

        Self::new_with_pool(connection_pool).await
    }

    /// Create SQLite storage in memory
    ///
    /// Every connection would get its own database, so the pool is limited to a single connection
    /// that is never recycled
    pub async fn in_memory() -> Result<Self> {
        let connection_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(connection_error)?;

        Self::new_with_pool(connection_pool).await
    }

    /// Create SQLite storage with existing pool
    ///
    /// Migrations will be run
    pub async fn new_with_pool(connection_pool: SqlitePool) -> Result<Self> {
        MIGRATOR
            .run(&connection_pool)
            .await
            .map_err(connection_error)?;

        Ok(Self { connection_pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.connection_pool
    }

    async fn fetch_notes(&self, query: &str, limit: Option<usize>) -> Result<Vec<Note>> {
        let mut query = sqlx::query_as::<_, SqlxNote>(query);

        if let Some(limit) = limit {
            query = query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        query
            .fetch_all(&self.connection_pool)
            .await
            .map_err(connection_error)?
            .into_iter()
            .map(Note::from_sqlx_note)
            .collect()
    }
}

/// `SQLx` version of a note
#[derive(sqlx::FromRow)]
#[sqlx(rename_all = "camelCase")]
struct SqlxNote {
    id: String,
    title: String,
    content: String,
    urgency: i64,
    is_pinned: bool,
    blocks_data: Option<String>,
    reminder_time: Option<i64>,
    is_alarm: bool,
    repeat_mode: Option<String>,
    created_at: i64,
}

impl Note {
    /// Create note from `SQLx` version
    fn from_sqlx_note(note: SqlxNote) -> Result<Self> {
        let urgency = Urgency::try_from(note.urgency)
            .map_err(|err| Error::Corruption(format!("note {}: {err}", note.id)))?;

        Ok(Self {
            id: note.id,
            title: note.title,
            content: note.content,
            urgency,
            is_pinned: note.is_pinned,
            blocks_data: note.blocks_data,
            reminder_time: note.reminder_time,
            is_alarm: note.is_alarm,
            repeat_mode: note.repeat_mode,
            created_at: note.created_at,
        })
    }
}

#[async_trait]
impl Storage for Sqlite {
    async fn find_all_notes(&self) -> Result<Vec<Note>> {
        self.fetch_notes(
            &format!(
                r"
                SELECT {NOTE_COLUMNS}
                FROM notes
                ORDER BY isPinned DESC, urgency DESC, createdAt DESC
                "
            ),
            None,
        )
        .await
    }

    async fn find_sticky_notes(&self, limit: usize) -> Result<Vec<Note>> {
        self.fetch_notes(
            &format!(
                r"
                SELECT {NOTE_COLUMNS}
                FROM notes
                WHERE urgency = 2 OR isPinned = 1
                ORDER BY urgency DESC, createdAt DESC
                LIMIT ?
                "
            ),
            Some(limit),
        )
        .await
    }

    async fn find_recent_notes(&self, limit: usize) -> Result<Vec<Note>> {
        self.fetch_notes(
            &format!(
                r"
                SELECT {NOTE_COLUMNS}
                FROM notes
                ORDER BY createdAt DESC
                LIMIT ?
                "
            ),
            Some(limit),
        )
        .await
    }

    async fn find_notes_with_reminders(&self) -> Result<Vec<Note>> {
        self.fetch_notes(
            &format!(
                r"
                SELECT {NOTE_COLUMNS}
                FROM notes
                WHERE reminderTime IS NOT NULL
                ORDER BY reminderTime ASC
                "
            ),
            None,
        )
        .await
    }

    async fn find_single_note_by_id(&self, id: &str) -> Result<Option<Note>> {
        sqlx::query_as::<_, SqlxNote>(&format!(
            r"
            SELECT {NOTE_COLUMNS}
            FROM notes
            WHERE id = ?
            LIMIT 1
            "
        ))
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)?
        .map(Note::from_sqlx_note)
        .transpose()
    }

    async fn save_note(&self, note: &Note) -> Result<()> {
        sqlx::query(&format!(
            r"
            INSERT OR REPLACE INTO notes ({NOTE_COLUMNS})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "
        ))
        .bind(&note.id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.urgency.ordinal())
        .bind(note.is_pinned)
        .bind(&note.blocks_data)
        .bind(note.reminder_time)
        .bind(note.is_alarm)
        .bind(&note.repeat_mode)
        .bind(note.created_at)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn delete_note(&self, note: &Note) -> Result<()> {
        sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(&note.id)
            .execute(&self.connection_pool)
            .await
            .map_err(connection_error)?;

        Ok(())
    }

    async fn delete_notes_by_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<sqlx::Sqlite>::new("DELETE FROM notes WHERE id IN (");

        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        builder
            .build()
            .execute(&self.connection_pool)
            .await
            .map_err(connection_error)?;

        Ok(())
    }
}

/// Convert `SQLx` to storage connection error
fn connection_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Connection(err.to_string())
}
