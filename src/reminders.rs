//! Reminder delivery
//!
//! Watches all notes and shows a notification once the reminder of a note is due. Repeating
//! reminders come back every day or every week. The last delivered occurrence of every note is kept
//! in the state directory, so a restart does not deliver it again.

use std::collections::HashMap;
use std::fs;
use std::future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::notes::Note;
use crate::presence::ChannelConfig;
use crate::presence::NotificationHost;
use crate::service::NoteService;
use crate::storage::Storage;
use crate::utils::now_millis;

const DEFAULT_TITLE: &str = "Reminder";
const DEFAULT_MESSAGE: &str = "You have a pending task";

/// File name of the delivered reminders within the state directory
const LEDGER_FILE_NAME: &str = "reminders-delivered.json";

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;
const WEEK_MILLIS: i64 = 7 * DAY_MILLIS;

/// A reminder as shown to the user
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderNotification {
    pub note_id: String,
    pub channel_id: &'static str,
    pub title: String,
    pub message: String,

    /// When the reminder was due, epoch millis
    pub due_at: i64,

    pub is_alarm: bool,

    /// Keeps alerting until the user reacts
    pub insistent: bool,
}

impl ReminderNotification {
    pub fn for_note(note: &Note, due_at: i64) -> Self {
        let title = if note.title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            note.title.clone()
        };

        let message = if note.content.trim().is_empty() {
            DEFAULT_MESSAGE.to_string()
        } else {
            note.content.clone()
        };

        Self {
            note_id: note.id.clone(),
            channel_id: channel_for(note.is_alarm).id,
            title,
            message,
            due_at,
            is_alarm: note.is_alarm,
            insistent: note.is_alarm,
        }
    }
}

/// Alarms get their own, louder channel
fn channel_for(is_alarm: bool) -> ChannelConfig {
    if is_alarm {
        ChannelConfig::ALARMS
    } else {
        ChannelConfig::REMINDERS
    }
}

/// Time between two occurrences, `None` for a one-shot reminder
fn repeat_interval(repeat_mode: Option<&str>) -> Option<i64> {
    let repeat_mode = repeat_mode?.trim();

    if repeat_mode.eq_ignore_ascii_case("daily") {
        Some(DAY_MILLIS)
    } else if repeat_mode.eq_ignore_ascii_case("weekly") {
        Some(WEEK_MILLIS)
    } else {
        None
    }
}

/// The most recent occurrence at or before `now`
///
/// `None` when there is none or when it is out of the representable range.
pub fn latest_due(reminder_time: i64, repeat_mode: Option<&str>, now: i64) -> Option<i64> {
    if reminder_time > now {
        return None;
    }

    match repeat_interval(repeat_mode) {
        Some(interval) => {
            let elapsed = now.checked_sub(reminder_time)?;

            reminder_time.checked_add(elapsed / interval * interval)
        }
        None => Some(reminder_time),
    }
}

/// The first occurrence after `now`
///
/// `None` when there is none or when it is out of the representable range.
pub fn next_occurrence(reminder_time: i64, repeat_mode: Option<&str>, now: i64) -> Option<i64> {
    if reminder_time > now {
        return Some(reminder_time);
    }

    let interval = repeat_interval(repeat_mode)?;
    let elapsed = now.checked_sub(reminder_time)?;

    (elapsed / interval + 1)
        .checked_mul(interval)
        .and_then(|offset| reminder_time.checked_add(offset))
}

/// Last delivered occurrence per note, kept in the state directory
#[derive(Debug)]
struct DeliveredLedger {
    path: PathBuf,
    entries: HashMap<String, i64>,
}

impl DeliveredLedger {
    /// Load the ledger, an absent or unreadable file starts empty
    fn load(path: PathBuf) -> Self {
        let entries = match fs::read(&path) {
            Ok(contents) => serde_json::from_slice(&contents).unwrap_or_else(|err| {
                tracing::warn!("Ignoring unreadable reminder ledger: {err}");

                HashMap::new()
            }),
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    tracing::warn!("Could not read reminder ledger: {err}");
                }

                HashMap::new()
            }
        };

        Self { path, entries }
    }

    fn is_delivered(&self, note_id: &str, due_at: i64) -> bool {
        self.entries
            .get(note_id)
            .is_some_and(|&delivered| delivered >= due_at)
    }

    fn record(&mut self, note_id: &str, due_at: i64) {
        self.entries.insert(note_id.to_string(), due_at);
    }

    /// Forget notes that are gone or no longer have a reminder, `true` when something was removed
    fn retain_notes(&mut self, notes: &[Note]) -> bool {
        let before = self.entries.len();

        self.entries.retain(|id, _| {
            notes
                .iter()
                .any(|note| &note.id == id && note.reminder_time.is_some())
        });

        self.entries.len() != before
    }

    fn persist(&self) {
        let result = self
            .path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| {
                serde_json::to_vec(&self.entries)
                    .map_err(std::io::Error::other)
                    .and_then(|contents| fs::write(&self.path, contents))
            });

        if let Err(err) = result {
            tracing::warn!("Could not write reminder ledger: {err}");
        }
    }
}

/// Delivers due reminders through the notification host
pub struct ReminderScheduler<S: Storage> {
    service: NoteService<S>,
    host: Arc<dyn NotificationHost>,
    delivered: DeliveredLedger,
}

impl<S: Storage> ReminderScheduler<S> {
    /// Create the scheduler, picking up what was delivered before from the state directory
    pub fn new<P: Into<PathBuf>>(
        service: NoteService<S>,
        host: Arc<dyn NotificationHost>,
        state_dir: P,
    ) -> Self {
        Self {
            service,
            host,
            delivered: DeliveredLedger::load(state_dir.into().join(LEDGER_FILE_NAME)),
        }
    }

    /// Run until the token is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }

    async fn run(mut self, token: CancellationToken) {
        let mut all = self.service.all_notes();

        loop {
            let notes = all.borrow_and_update().clone();
            let now = now_millis();

            self.deliver_due(&notes, now).await;

            let wake_in = notes
                .iter()
                .filter_map(|note| {
                    next_occurrence(note.reminder_time?, note.repeat_mode.as_deref(), now)
                })
                .min()
                .map(|at| {
                    Duration::from_millis(u64::try_from(at.saturating_sub(now)).unwrap_or_default())
                });

            tokio::select! {
                biased;

                () = token.cancelled() => return,
                changed = all.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                () = sleep_for(wake_in) => {}
            }
        }
    }

    async fn deliver_due(&mut self, notes: &[Note], now: i64) {
        let mut changed = self.delivered.retain_notes(notes);

        for note in notes {
            let Some(reminder_time) = note.reminder_time else {
                continue;
            };

            let Some(due_at) = latest_due(reminder_time, note.repeat_mode.as_deref(), now) else {
                continue;
            };

            if self.delivered.is_delivered(&note.id, due_at) {
                continue;
            }

            self.delivered.record(&note.id, due_at);
            changed = true;

            let notification = ReminderNotification::for_note(note, due_at);

            let result = match self.host.ensure_channel(&channel_for(note.is_alarm)) {
                Ok(()) => self.host.notify(&notification).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(()) => tracing::debug!("Delivered reminder of note {}", note.id),
                Err(err) => tracing::warn!("Could not deliver reminder of note {}: {err}", note.id),
            }
        }

        if changed {
            self.delivered.persist();
        }
    }
}

/// Sleep for the duration, or forever when there is nothing to wait for
async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => future::pending().await,
    }
}
