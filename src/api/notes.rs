use axum::Extension;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;

use crate::blocks::Block;
use crate::notes::Note;
use crate::notes::NoteDraft;
use crate::notes::Urgency;
use crate::service::NoteService;
use crate::storage::Storage;

use super::Error;
use super::Form;
use super::PathParameters;
use super::QueryParameters;
use super::Success;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteResponse {
    pub id: String,
    pub title: String,
    pub content: String,
    pub urgency: Urgency,
    pub is_pinned: bool,
    pub is_sticky: bool,
    pub blocks: Vec<Block>,
    pub reminder_time: Option<i64>,
    pub is_alarm: bool,
    pub repeat_mode: Option<String>,
    pub created_at: i64,
}

impl NoteResponse {
    fn from_note(note: Note) -> Self {
        Self {
            is_sticky: note.is_sticky(),
            blocks: note.blocks(),
            id: note.id,
            title: note.title,
            content: note.content,
            urgency: note.urgency,
            is_pinned: note.is_pinned,
            reminder_time: note.reminder_time,
            is_alarm: note.is_alarm,
            repeat_mode: note.repeat_mode,
            created_at: note.created_at,
        }
    }

    fn from_note_multiple(notes: Vec<Note>) -> Vec<Self> {
        notes.into_iter().map(Self::from_note).collect()
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    q: Option<String>,
}

pub async fn list<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
    QueryParameters(query): QueryParameters<ListQuery>,
) -> Result<Success<Vec<NoteResponse>>, Error> {
    let notes = match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => service.search(q).await?,
        _ => latest(&service.all_notes()),
    };

    Ok(Success::ok(NoteResponse::from_note_multiple(notes)))
}

pub async fn sticky<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
) -> Success<Vec<NoteResponse>> {
    let notes = latest(&service.sticky_notes());

    Success::ok(NoteResponse::from_note_multiple(notes))
}

pub async fn recent<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
) -> Success<Vec<NoteResponse>> {
    let notes = latest(&service.recent_notes());

    Success::ok(NoteResponse::from_note_multiple(notes))
}

pub async fn reminders<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
) -> Result<Success<Vec<NoteResponse>>, Error> {
    let notes = service.upcoming_reminders().await?;

    Ok(Success::ok(NoteResponse::from_note_multiple(notes)))
}

pub async fn single<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
    PathParameters(note_id): PathParameters<String>,
) -> Result<Success<NoteResponse>, Error> {
    let note = find_note(&service, &note_id).await?;

    Ok(Success::ok(NoteResponse::from_note(note)))
}

/// Everything the editor sends on save
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    blocks: Vec<Block>,
    #[serde(default)]
    urgency: Urgency,
    #[serde(default)]
    is_pinned: bool,
    reminder_time: Option<i64>,
    #[serde(default)]
    is_alarm: bool,
    repeat_mode: Option<String>,
}

impl From<NoteForm> for NoteDraft {
    fn from(form: NoteForm) -> Self {
        Self {
            title: form.title,
            blocks: form.blocks,
            urgency: form.urgency,
            is_pinned: form.is_pinned,
            reminder_time: form.reminder_time,
            is_alarm: form.is_alarm,
            repeat_mode: form.repeat_mode,
        }
    }
}

pub async fn create<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
    Form(form): Form<NoteForm>,
) -> Result<Success<NoteResponse>, Error> {
    let note = service
        .save_draft(None, form.into())
        .await?
        .ok_or_else(|| Error::bad_request("Note is empty"))?;

    Ok(Success::created(NoteResponse::from_note(note)))
}

/// Replace the note, it is created when it does not exist yet
pub async fn update<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
    PathParameters(note_id): PathParameters<String>,
    Form(form): Form<NoteForm>,
) -> Result<Success<NoteResponse>, Error> {
    let note = service
        .save_draft(Some(note_id), form.into())
        .await?
        .ok_or_else(|| Error::bad_request("Note is empty"))?;

    Ok(Success::ok(NoteResponse::from_note(note)))
}

pub async fn delete<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
    PathParameters(note_id): PathParameters<String>,
) -> Result<Success<NoteResponse>, Error> {
    let note = find_note(&service, &note_id).await?;

    service.delete_one(&note).await?;

    Ok(Success::no_content())
}

#[derive(Deserialize)]
pub struct DeleteManyForm {
    ids: Vec<String>,
}

pub async fn delete_many<S: Storage>(
    Extension(service): Extension<NoteService<S>>,
    Form(form): Form<DeleteManyForm>,
) -> Result<Success<NoteResponse>, Error> {
    service.delete_many(&form.ids).await?;

    Ok(Success::no_content())
}

async fn find_note<S: Storage>(service: &NoteService<S>, note_id: &str) -> Result<Note, Error> {
    service
        .get_by_id(note_id)
        .await?
        .ok_or_else(|| Error::not_found("Note not found"))
}

/// Latest snapshot of a live view
fn latest(view: &watch::Receiver<Vec<Note>>) -> Vec<Note> {
    view.borrow().clone()
}
