//! The notification host
//!
//! Everything the presence and the reminders need from the environment that shows notifications:
//! channels, one persistent presence, and one-off notifications.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use async_trait::async_trait;
use serde::Serialize;

use crate::reminders::ReminderNotification;

use super::Presence;
use super::Result;

/// Maximum number of delivered notifications kept by the in-process host
const DELIVERED_CAPACITY: usize = 50;

/// How loud a channel is
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Importance {
    Default,
    High,
}

/// A notification channel
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub importance: Importance,
    pub show_badge: bool,
    pub public_on_lock_screen: bool,
}

impl ChannelConfig {
    /// Channel of the sticky notes presence
    pub const STICKY: Self = Self {
        id: "sticky_notes_channel",
        name: "Sticky notes panel",
        description: "Keeps your pinned notes always visible",
        importance: Importance::High,
        show_badge: false,
        public_on_lock_screen: true,
    };

    /// Channel of reminders that are alarms
    pub const ALARMS: Self = Self {
        id: "alarm_channel",
        name: "Alarms",
        description: "Channel for alarms",
        importance: Importance::High,
        show_badge: true,
        public_on_lock_screen: true,
    };

    /// Channel of regular reminders
    pub const REMINDERS: Self = Self {
        id: "reminder_channel",
        name: "Reminders",
        description: "Channel for reminders",
        importance: Importance::Default,
        show_badge: true,
        public_on_lock_screen: false,
    };
}

/// Shows notifications
#[async_trait]
pub trait NotificationHost: Send + Sync + 'static {
    /// Make sure the channel exists, ensuring an existing channel changes nothing
    fn ensure_channel(&self, channel: &ChannelConfig) -> Result<()>;

    /// Show or replace the presence
    ///
    /// Only alerts the user (sound, vibration) when `alert` is set
    async fn publish_presence(&self, presence: &Presence, alert: bool) -> Result<()>;

    /// Take the presence away, fine when there is none
    fn remove_presence(&self);

    /// Show a one-off notification
    async fn notify(&self, notification: &ReminderNotification) -> Result<()>;
}

/// The presence as currently shown by the in-process host
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShownPresence {
    pub presence: Presence,

    /// How many publishes were shown since the presence appeared
    pub updates: u64,

    /// How many of those alerted the user
    pub alerts: u64,
}

/// Host that keeps its notifications in memory
///
/// The API serves them to whatever UI is attached, every change is traced.
#[derive(Debug, Default)]
pub struct InProcessHost {
    channels: Mutex<HashMap<&'static str, ChannelConfig>>,
    presence: Mutex<Option<ShownPresence>>,
    delivered: Mutex<VecDeque<ReminderNotification>>,
}

impl InProcessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// The presence currently shown
    pub fn shown_presence(&self) -> Option<ShownPresence> {
        lock(&self.presence).clone()
    }

    /// Delivered notifications, newest first
    pub fn delivered(&self) -> Vec<ReminderNotification> {
        lock(&self.delivered).iter().cloned().collect()
    }

    /// IDs of all channels created so far
    #[cfg(test)]
    pub fn channel_ids(&self) -> Vec<&'static str> {
        let mut ids = lock(&self.channels).keys().copied().collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl NotificationHost for InProcessHost {
    fn ensure_channel(&self, channel: &ChannelConfig) -> Result<()> {
        lock(&self.channels).entry(channel.id).or_insert_with(|| {
            tracing::debug!(r#"Created notification channel "{}""#, channel.id);

            channel.clone()
        });

        Ok(())
    }

    async fn publish_presence(&self, presence: &Presence, alert: bool) -> Result<()> {
        let mut shown = lock(&self.presence);

        let (updates, alerts) = shown
            .as_ref()
            .map_or((0, 0), |shown| (shown.updates, shown.alerts));

        if alert {
            tracing::info!("Presence alert: {}", presence.summary);
        } else {
            tracing::debug!("Presence update: {}", presence.summary);
        }

        *shown = Some(ShownPresence {
            presence: presence.clone(),
            updates: updates + 1,
            alerts: alerts + u64::from(alert),
        });

        Ok(())
    }

    fn remove_presence(&self) {
        if lock(&self.presence).take().is_some() {
            tracing::debug!("Presence removed");
        }
    }

    async fn notify(&self, notification: &ReminderNotification) -> Result<()> {
        tracing::info!(
            r#"Notification on "{}": {} - {}"#,
            notification.channel_id,
            notification.title,
            notification.message
        );

        let mut delivered = lock(&self.delivered);
        delivered.push_front(notification.clone());
        delivered.truncate(DELIVERED_CAPACITY);

        Ok(())
    }
}

/// Lock, a panic while holding the lock does not make the data unusable
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
