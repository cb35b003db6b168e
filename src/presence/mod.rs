//! The sticky notes presence
//!
//! A persistent notification that keeps the sticky notes in view. It follows the sticky view of the
//! note service while active and comes back by itself when it is swiped away or when the process
//! goes away while it is shown. Only an explicit [`PresenceController::stop`] gets rid of it.
//!
//! ```text
//! Stopped --start--> Starting --subscribed--> Active --stop--> Stopping --> Stopped
//!                                               |  \
//!                                     dismissed |   \ process teardown
//!                                               v    v
//!                                           PendingRestart --delay--> Starting
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::notes::Note;
use crate::service::NoteService;
use crate::storage::Storage;
use crate::utils::now_millis;

pub use host::ChannelConfig;
pub use host::InProcessHost;
pub use host::NotificationHost;
pub use host::ShownPresence;
pub use render::Presence;
pub use timer::FileRevivalTimer;
pub use timer::RevivalTimer;

mod host;
mod render;
mod timer;

/// Default delay before the presence comes back
const DEFAULT_REVIVAL_DELAY: Duration = Duration::from_secs(1);

/// Anything that can go wrong while showing notifications or scheduling them
#[derive(Debug, Error)]
pub enum Error {
    /// The notification channel could not be created
    #[error("Channel error: {0}")]
    Channel(String),

    /// The presence could not be shown
    #[error("Publish error: {0}")]
    Publish(String),

    /// The revival could not be scheduled
    #[error("Timer error: {0}")]
    Timer(String),

    /// A one-off notification could not be shown
    #[error("Delivery error: {0}")]
    Delivery(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Lifecycle of the presence
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceState {
    #[default]
    Stopped,
    Starting,
    Active,
    Stopping,

    /// Gone for now, a revival is scheduled
    PendingRestart,
}

#[derive(Clone, Copy, Debug)]
pub struct PresenceConfig {
    /// Delay before a dismissed presence comes back
    pub revival_delay: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            revival_delay: DEFAULT_REVIVAL_DELAY,
        }
    }
}

/// Mutable state of the controller
#[derive(Debug, Default)]
struct Session {
    state: PresenceState,

    /// Cancels the task following the sticky view
    subscription: Option<CancellationToken>,

    /// Cancels the in-process revival
    revival: Option<CancellationToken>,

    /// Last presence that was shown successfully
    last_published: Option<Presence>,

    /// Bumped on every transition that invalidates work in flight
    generation: u64,
}

struct Inner<S: Storage> {
    service: NoteService<S>,
    host: Arc<dyn NotificationHost>,
    timer: Arc<dyn RevivalTimer>,
    config: PresenceConfig,
    session: Mutex<Session>,
}

/// Handle to the presence, cheap to clone
///
/// There should be one controller per process, every clone shares its state.
#[derive(Clone)]
pub struct PresenceController<S: Storage> {
    inner: Arc<Inner<S>>,
}

impl<S: Storage> PresenceController<S> {
    pub fn new(
        service: NoteService<S>,
        host: Arc<dyn NotificationHost>,
        timer: Arc<dyn RevivalTimer>,
        config: PresenceConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                host,
                timer,
                config,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> PresenceState {
        self.session().state
    }

    /// Show the presence and start following the sticky notes
    ///
    /// Does nothing when the presence is already starting or active. When the placeholder cannot be
    /// shown the presence falls back to stopped and the error is returned.
    pub async fn start(&self) -> Result<()> {
        self.begin(None).await
    }

    /// Render the notes and show them
    ///
    /// Only alerts the user when the rendered presence differs from the last one shown. Ignored
    /// unless the presence is starting or active.
    pub async fn on_data_changed(&self, notes: &[Note]) -> Result<()> {
        let presence = Presence::render(notes);

        let (alert, generation) = {
            let session = self.session();

            if !matches!(
                session.state,
                PresenceState::Starting | PresenceState::Active
            ) {
                tracing::debug!("Ignoring sticky notes while {:?}", session.state);

                return Ok(());
            }

            (
                session.last_published.as_ref() != Some(&presence),
                session.generation,
            )
        };

        self.inner.host.publish_presence(&presence, alert).await?;

        let mut session = self.session();
        if session.generation == generation {
            session.last_published = Some(presence);
        }

        Ok(())
    }

    /// Take the presence away for good
    ///
    /// Cancels the subscription and every pending revival, the durable one included.
    pub fn stop(&self) {
        let (subscription, revival) = {
            let mut session = self.session();
            session.state = PresenceState::Stopping;
            session.generation += 1;

            (session.subscription.take(), session.revival.take())
        };

        for token in [subscription, revival].into_iter().flatten() {
            token.cancel();
        }

        self.inner.timer.take_pending();
        self.inner.host.remove_presence();

        let mut session = self.session();
        if session.state == PresenceState::Stopping {
            session.state = PresenceState::Stopped;
            session.last_published = None;
        }

        tracing::info!("Presence stopped");
    }

    /// The user swiped the presence away, bring it back after the revival delay
    ///
    /// Only acts on an active presence. The revival is quiet when nothing changed in the meantime.
    pub fn on_dismissed(&self) {
        let token = {
            let mut session = self.session();

            if session.state != PresenceState::Active {
                tracing::debug!("Ignoring dismissal while {:?}", session.state);

                return;
            }

            if let Some(subscription) = session.subscription.take() {
                subscription.cancel();
            }

            let token = CancellationToken::new();
            session.state = PresenceState::PendingRestart;
            session.revival = Some(token.clone());
            session.generation += 1;

            token
        };

        self.inner.host.remove_presence();

        tracing::info!(
            "Presence dismissed, reviving in {}ms",
            self.inner.config.revival_delay.as_millis()
        );

        self.spawn_revival(token, self.inner.config.revival_delay);
    }

    /// The process is going away while the presence is held
    ///
    /// In-process timers do not survive this, so the revival is handed to the durable timer.
    /// Scheduling is best-effort, failures are only logged.
    pub fn on_process_teardown(&self) {
        {
            let mut session = self.session();

            if matches!(
                session.state,
                PresenceState::Stopped | PresenceState::Stopping
            ) {
                tracing::debug!("No presence to revive");

                return;
            }

            for token in [session.subscription.take(), session.revival.take()]
                .into_iter()
                .flatten()
            {
                token.cancel();
            }

            session.state = PresenceState::PendingRestart;
            session.generation += 1;
        }

        match self
            .inner
            .timer
            .schedule_revival(self.inner.config.revival_delay)
        {
            Ok(()) => tracing::info!("Presence revival scheduled for the next start"),
            Err(err) => tracing::debug!("Could not schedule the presence revival: {err}"),
        }

        self.inner.host.remove_presence();
    }

    /// Pick up a revival scheduled by an earlier process
    ///
    /// Returns `true` when one was pending, the presence starts once it is due.
    pub fn resume_pending_revival(&self) -> bool {
        let Some(fire_at) = self.inner.timer.take_pending() else {
            return false;
        };

        let token = {
            let mut session = self.session();

            if session.state != PresenceState::Stopped {
                tracing::debug!("Ignoring pending revival while {:?}", session.state);

                return false;
            }

            let token = CancellationToken::new();
            session.state = PresenceState::PendingRestart;
            session.revival = Some(token.clone());

            token
        };

        let remaining = u64::try_from(fire_at.saturating_sub(now_millis())).unwrap_or_default();

        tracing::info!("Resuming presence revival in {remaining}ms");

        self.spawn_revival(token, Duration::from_millis(remaining));

        true
    }

    /// Start, either on request or as a revival
    ///
    /// A revival only goes ahead when its token is still the pending one.
    async fn begin(&self, revival: Option<&CancellationToken>) -> Result<()> {
        let generation = {
            let mut session = self.session();

            if let Some(token) = revival {
                if token.is_cancelled() || session.state != PresenceState::PendingRestart {
                    return Ok(());
                }
            }

            if matches!(
                session.state,
                PresenceState::Starting | PresenceState::Active
            ) {
                tracing::debug!("Presence is already {:?}", session.state);

                return Ok(());
            }

            if let Some(token) = session.revival.take() {
                token.cancel();
            }

            session.state = PresenceState::Starting;
            session.generation += 1;
            session.generation
        };

        if let Err(err) = self.show_placeholder().await {
            self.abort_start(generation);

            return Err(err);
        }

        let token = CancellationToken::new();

        {
            let mut session = self.session();

            if session.generation != generation {
                tracing::debug!("Presence changed while starting");

                return Ok(());
            }

            session.state = PresenceState::Active;
            session.subscription = Some(token.clone());
        }

        tracing::info!("Presence started");

        tokio::spawn(self.clone().follow_sticky_notes(token));

        Ok(())
    }

    async fn show_placeholder(&self) -> Result<()> {
        self.inner.host.ensure_channel(&ChannelConfig::STICKY)?;
        self.inner
            .host
            .publish_presence(&Presence::placeholder(), false)
            .await
    }

    fn abort_start(&self, generation: u64) {
        {
            let mut session = self.session();

            if session.generation != generation {
                return;
            }

            session.state = PresenceState::Stopped;
            session.generation += 1;
        }

        self.inner.host.remove_presence();
    }

    /// Publish every snapshot of the sticky view, a newer snapshot abandons the publish in flight
    async fn follow_sticky_notes(self, token: CancellationToken) {
        let mut sticky = self.inner.service.sticky_notes();
        let mut notes = sticky.borrow_and_update().clone();

        loop {
            tokio::select! {
                biased;

                () = token.cancelled() => return,
                next = next_snapshot(&mut sticky) => {
                    match next {
                        Some(next) => {
                            notes = next;

                            continue;
                        }
                        None => return,
                    }
                }
                result = self.on_data_changed(&notes) => {
                    if let Err(err) = result {
                        self.degrade(&err);

                        return;
                    }
                }
            }

            tokio::select! {
                biased;

                () = token.cancelled() => return,
                next = next_snapshot(&mut sticky) => {
                    match next {
                        Some(next) => notes = next,
                        None => return,
                    }
                }
            }
        }
    }

    fn degrade(&self, err: &Error) {
        tracing::warn!("Presence could not be shown, stopping: {err}");

        self.stop();
    }

    fn spawn_revival(&self, token: CancellationToken, delay: Duration) {
        let controller = self.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!("Presence revival cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    if let Err(err) = controller.begin(Some(&token)).await {
                        tracing::warn!("Could not revive the presence: {err}");
                    }
                }
            }
        });
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wait for the next snapshot, `None` when the view is gone
async fn next_snapshot(sticky: &mut watch::Receiver<Vec<Note>>) -> Option<Vec<Note>> {
    sticky.changed().await.ok()?;

    Some(sticky.borrow_and_update().clone())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use crate::notes::Urgency;
    use crate::reminders::ReminderNotification;
    use crate::storage::Memory;

    use super::*;

    #[derive(Clone, Debug, Eq, PartialEq)]
    enum Event {
        Channel(&'static str),
        Publish { summary: String, alert: bool },
        Remove,
    }

    #[derive(Default)]
    struct RecordingHost {
        events: Mutex<Vec<Event>>,
        failing: AtomicBool,

        /// Time a publish takes before it shows, in millis
        publish_delay: AtomicU64,
    }

    impl RecordingHost {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn publishes(&self) -> Vec<(String, bool)> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    Event::Publish { summary, alert } => Some((summary, alert)),
                    _ => None,
                })
                .collect()
        }

        fn clear(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl NotificationHost for RecordingHost {
        fn ensure_channel(&self, channel: &ChannelConfig) -> Result<()> {
            self.events.lock().unwrap().push(Event::Channel(channel.id));

            Ok(())
        }

        async fn publish_presence(&self, presence: &Presence, alert: bool) -> Result<()> {
            let delay = self.publish_delay.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Publish("host unavailable".to_string()));
            }

            self.events.lock().unwrap().push(Event::Publish {
                summary: presence.summary.clone(),
                alert,
            });

            Ok(())
        }

        fn remove_presence(&self) {
            self.events.lock().unwrap().push(Event::Remove);
        }

        async fn notify(&self, _notification: &ReminderNotification) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryTimer {
        pending: Mutex<Option<i64>>,
        failing: bool,
    }

    impl RevivalTimer for MemoryTimer {
        fn schedule_revival(&self, delay: Duration) -> Result<()> {
            if self.failing {
                return Err(Error::Timer("no timer".to_string()));
            }

            let delay = i64::try_from(delay.as_millis()).unwrap();
            *self.pending.lock().unwrap() = Some(now_millis() + delay);

            Ok(())
        }

        fn take_pending(&self) -> Option<i64> {
            self.pending.lock().unwrap().take()
        }
    }

    struct Fixture {
        service: NoteService<Memory>,
        host: Arc<RecordingHost>,
        timer: Arc<MemoryTimer>,
        controller: PresenceController<Memory>,
    }

    async fn fixture_with_timer(timer: MemoryTimer) -> Fixture {
        let service = NoteService::new(Memory::new()).await.unwrap();
        let host = Arc::new(RecordingHost::default());
        let timer = Arc::new(timer);

        let controller = PresenceController::new(
            service.clone(),
            host.clone(),
            timer.clone(),
            PresenceConfig::default(),
        );

        Fixture {
            service,
            host,
            timer,
            controller,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_timer(MemoryTimer::default()).await
    }

    fn sticky_note(id: &str, created_at: i64) -> Note {
        Note {
            id: id.to_string(),
            title: format!("Title {id}"),
            content: String::new(),
            urgency: Urgency::High,
            is_pinned: false,
            blocks_data: None,
            reminder_time: None,
            is_alarm: false,
            repeat_mode: None,
            created_at,
        }
    }

    /// Let spawned tasks run, the clock is paused so this only advances virtual time
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_shows_placeholder_then_sticky_notes() {
        let fixture = fixture().await;
        fixture.service.save(&sticky_note("a", 1)).await.unwrap();

        fixture.controller.start().await.unwrap();
        settle().await;

        assert_eq!(PresenceState::Active, fixture.controller.state());
        assert_eq!(
            vec![
                Event::Channel("sticky_notes_channel"),
                Event::Publish {
                    summary: "You have 0 pinned tasks.".to_string(),
                    alert: false,
                },
                Event::Publish {
                    summary: "You have 1 pinned task.".to_string(),
                    alert: true,
                },
            ],
            fixture.host.events()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_a_no_op() {
        let fixture = fixture().await;

        fixture.controller.start().await.unwrap();
        settle().await;
        fixture.host.clear();

        fixture.controller.start().await.unwrap();
        settle().await;

        assert_eq!(PresenceState::Active, fixture.controller.state());
        assert!(fixture.host.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_follows_sticky_view() {
        let fixture = fixture().await;

        fixture.controller.start().await.unwrap();
        settle().await;

        fixture.service.save(&sticky_note("a", 1)).await.unwrap();
        settle().await;
        fixture.service.save(&sticky_note("b", 2)).await.unwrap();
        settle().await;

        let publishes = fixture.host.publishes();
        assert_eq!(
            Some(&("You have 2 pinned tasks.".to_string(), true)),
            publishes.last()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_snapshot_abandons_publish_in_flight() {
        let fixture = fixture().await;

        fixture.controller.start().await.unwrap();
        settle().await;
        fixture.host.clear();
        fixture.host.publish_delay.store(100, Ordering::SeqCst);

        fixture.service.save(&sticky_note("a", 1)).await.unwrap();
        settle().await;

        // the first publish is still showing
        assert!(fixture.host.publishes().is_empty());

        fixture.service.save(&sticky_note("b", 2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(
            vec![("You have 2 pinned tasks.".to_string(), true)],
            fixture.host.publishes()
        );
        assert_eq!(PresenceState::Active, fixture.controller.state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_content_does_not_alert() {
        let fixture = fixture().await;
        let notes = vec![sticky_note("a", 1)];

        fixture.controller.start().await.unwrap();
        settle().await;
        fixture.host.clear();

        fixture.controller.on_data_changed(&notes).await.unwrap();
        fixture.controller.on_data_changed(&notes).await.unwrap();

        assert_eq!(
            vec![
                ("You have 1 pinned task.".to_string(), true),
                ("You have 1 pinned task.".to_string(), false),
            ],
            fixture.host.publishes()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_ignored_while_stopped() {
        let fixture = fixture().await;

        fixture
            .controller
            .on_data_changed(&[sticky_note("a", 1)])
            .await
            .unwrap();

        assert!(fixture.host.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop() {
        let fixture = fixture().await;

        fixture.controller.start().await.unwrap();
        settle().await;

        fixture.controller.stop();
        fixture.host.clear();

        fixture.service.save(&sticky_note("a", 1)).await.unwrap();
        settle().await;

        assert_eq!(PresenceState::Stopped, fixture.controller.state());
        assert!(fixture.host.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissed_presence_comes_back_quietly() {
        let fixture = fixture().await;
        fixture.service.save(&sticky_note("a", 1)).await.unwrap();

        fixture.controller.start().await.unwrap();
        settle().await;
        fixture.host.clear();

        fixture.controller.on_dismissed();

        assert_eq!(PresenceState::PendingRestart, fixture.controller.state());
        assert_eq!(vec![Event::Remove], fixture.host.events());

        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert_eq!(PresenceState::Active, fixture.controller.state());
        assert_eq!(
            Some(&("You have 1 pinned task.".to_string(), false)),
            fixture.host.publishes().last()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_revival() {
        let fixture = fixture().await;

        fixture.controller.start().await.unwrap();
        settle().await;

        fixture.controller.on_dismissed();
        fixture.controller.stop();
        fixture.host.clear();

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(PresenceState::Stopped, fixture.controller.state());
        assert!(fixture.host.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissal_ignored_unless_active() {
        let fixture = fixture().await;

        fixture.controller.on_dismissed();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(PresenceState::Stopped, fixture.controller.state());
        assert!(fixture.host.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_falls_back_to_stopped() {
        let fixture = fixture().await;
        fixture.host.failing.store(true, Ordering::SeqCst);

        let result = fixture.controller.start().await;

        assert!(matches!(result, Err(Error::Publish(_))));
        assert_eq!(PresenceState::Stopped, fixture.controller.state());
        assert_eq!(Some(&Event::Remove), fixture.host.events().last());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_publish_degrades_to_stopped() {
        let fixture = fixture().await;

        fixture.controller.start().await.unwrap();
        settle().await;

        fixture.host.failing.store(true, Ordering::SeqCst);
        fixture.service.save(&sticky_note("a", 1)).await.unwrap();
        settle().await;

        assert_eq!(PresenceState::Stopped, fixture.controller.state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_schedules_durable_revival() {
        let fixture = fixture().await;

        fixture.controller.start().await.unwrap();
        settle().await;

        fixture.controller.on_process_teardown();

        assert_eq!(PresenceState::PendingRestart, fixture.controller.state());
        assert!(fixture.timer.pending.lock().unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_without_presence() {
        let fixture = fixture().await;

        fixture.controller.on_process_teardown();

        assert_eq!(PresenceState::Stopped, fixture.controller.state());
        assert!(fixture.timer.pending.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_swallows_timer_failure() {
        let fixture = fixture_with_timer(MemoryTimer {
            failing: true,
            ..MemoryTimer::default()
        })
        .await;

        fixture.controller.start().await.unwrap();
        settle().await;

        fixture.controller.on_process_teardown();

        assert_eq!(PresenceState::PendingRestart, fixture.controller.state());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_pending_revival() {
        let fixture = fixture().await;

        assert!(!fixture.controller.resume_pending_revival());

        *fixture.timer.pending.lock().unwrap() = Some(now_millis());

        assert!(fixture.controller.resume_pending_revival());
        settle().await;

        assert_eq!(PresenceState::Active, fixture.controller.state());
        assert!(fixture.timer.pending.lock().unwrap().is_none());
    }
}
