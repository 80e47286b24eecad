//! Notification controller.
//!
//! Turns raw notifications into a navigable, filterable, rate-limited queue
//! and announces every change on the [`MessageBus`]. The queue has two
//! states: empty (`current_index() == None`) and displaying
//! (`current_index() == Some(i)` with `i < notification_count()`).
//!
//! Lock discipline: queue mutation and index repair happen inside one
//! critical section; broadcasting and logging happen after the lock is
//! released, so subscribers may call back into the controller.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use message_bus::{MessageBus, panic_payload_to_string};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::NotificationCenterConfig;
use crate::error::{Error, Result};
use crate::events::{
    ApplicationStatus, BuildPhaseNotification, NotificationAdded, NotificationOccurred,
    ViewChanged, ViewRefreshed,
};
use crate::logger::NotificationLogger;
use crate::notification::{Notification, Severity};
use crate::store::{AddOutcome, NotificationStore};

/// Observer for failures swallowed by the fail-open notify path.
pub type FailureHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Queue plus selection, guarded by the controller's mutex.
#[derive(Debug, Default)]
struct ViewState {
    store: NotificationStore,
    index: Option<usize>,
    current: Notification,
}

#[derive(Debug, PartialEq)]
struct ViewSnapshot {
    index: Option<usize>,
    count: usize,
    current: Notification,
}

impl ViewState {
    fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            index: self.index,
            count: self.store.len(),
            current: self.current.clone(),
        }
    }

    /// Clamp the index into the queue and re-read the displayed notification.
    fn refresh_current(&mut self) {
        let count = self.store.len();
        if count == 0 {
            self.index = None;
            self.current = Notification::placeholder();
            return;
        }

        let index = match self.index {
            Some(index) if index < count => index,
            Some(_) => count - 1,
            None => 0,
        };
        self.index = Some(index);
        self.current = self.store.show(index);
    }

    fn dismiss_current(&mut self) -> Result<()> {
        let Some(old_index) = self.index else {
            return self.store.dismiss(0).map(|_| ());
        };

        self.store.dismiss(old_index)?;
        let count = self.store.len();
        // The selection stays on the same slot, which now holds the next
        // notification; it only moves when the slot no longer exists.
        self.index = if count == 0 {
            None
        } else if old_index >= count {
            Some(count - 1)
        } else {
            Some(old_index)
        };
        Ok(())
    }

    fn selected_text(&self) -> Option<String> {
        self.index
            .filter(|&index| index < self.store.len())
            .map(|index| self.store.show(index).text)
    }
}

/// Public notification center state machine.
pub struct NotificationController {
    bus: Arc<MessageBus>,
    logger: Arc<dyn NotificationLogger>,
    view: Mutex<ViewState>,
    startup_finished: AtomicBool,
    log_only_during_startup: AtomicBool,
    controlled_interval: Duration,
    /// Last emission per text for `controlled_notify`. Never pruned.
    last_seen: DashMap<String, Instant>,
    failure_hook: RwLock<Option<FailureHook>>,
}

impl NotificationController {
    pub fn new(bus: Arc<MessageBus>, logger: Arc<dyn NotificationLogger>) -> Self {
        Self::with_config(bus, logger, &NotificationCenterConfig::default())
    }

    pub fn with_config(
        bus: Arc<MessageBus>,
        logger: Arc<dyn NotificationLogger>,
        config: &NotificationCenterConfig,
    ) -> Self {
        let view = ViewState {
            store: NotificationStore::with_ignored_topics(config.ignored_topics.iter().cloned()),
            ..Default::default()
        };

        Self {
            bus,
            logger,
            view: Mutex::new(view),
            startup_finished: AtomicBool::new(false),
            log_only_during_startup: AtomicBool::new(config.log_only_during_startup),
            controlled_interval: config.controlled_notify_interval(),
            last_seen: DashMap::new(),
            failure_hook: RwLock::new(None),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Observe errors that `notify` swallows.
    pub fn set_failure_hook(&self, hook: impl Fn(&Error) + Send + Sync + 'static) {
        *self.failure_hook.write() = Some(Arc::new(hook));
    }

    pub fn clear_failure_hook(&self) {
        *self.failure_hook.write() = None;
    }

    pub fn is_startup_finished(&self) -> bool {
        self.startup_finished.load(Ordering::Acquire)
    }

    pub fn set_startup_finished(&self, finished: bool) {
        self.startup_finished.store(finished, Ordering::Release);
        debug!(finished, "Startup state changed");
    }

    pub fn log_only_during_startup(&self) -> bool {
        self.log_only_during_startup.load(Ordering::Acquire)
    }

    pub fn set_log_only_during_startup(&self, enabled: bool) {
        self.log_only_during_startup.store(enabled, Ordering::Release);
    }

    /// Raise a notification and log it. Never fails; see [`Self::try_notify`].
    pub fn notify(&self, notification: Notification) {
        self.notify_with(notification, true);
    }

    pub fn notify_with(&self, notification: Notification, also_log: bool) {
        if let Err(e) = self.try_notify(notification, also_log) {
            self.report_failure(&e);
        }
    }

    pub fn notify_text(&self, text: impl Into<String>, severity: Severity, also_log: bool) {
        self.notify_with(Notification::now(text, severity), also_log);
    }

    pub fn notify_batch<I>(&self, notifications: I, also_log: bool)
    where
        I: IntoIterator<Item = Notification>,
    {
        for notification in notifications {
            self.notify_with(notification, also_log);
        }
    }

    /// The fallible body of `notify`.
    ///
    /// Every step runs even if an earlier broadcast or the logger failed;
    /// the first error is returned at the end.
    pub fn try_notify(&self, notification: Notification, also_log: bool) -> Result<()> {
        let startup_finished = self.is_startup_finished();
        let queue = notification.severity != Severity::Info
            && (!self.log_only_during_startup() || startup_finished);

        let mut added = false;
        if queue {
            let (outcome, _) = self.update_view(|view| {
                let outcome = view.store.add(notification.clone());
                if outcome == AddOutcome::Added && view.store.len() == 1 {
                    view.index = Some(0);
                }
                outcome
            });
            added = outcome == AddOutcome::Added;
        }

        let mut first_error = None;

        if added {
            keep_first(
                &mut first_error,
                self.broadcast(&NotificationAdded {
                    notification: notification.clone(),
                }),
            );
        }

        if !startup_finished {
            keep_first(
                &mut first_error,
                self.broadcast(&BuildPhaseNotification {
                    notification: notification.clone(),
                }),
            );
        }

        keep_first(
            &mut first_error,
            self.broadcast(&NotificationOccurred {
                notification: notification.clone(),
            }),
        );

        if also_log {
            keep_first(
                &mut first_error,
                self.guarded_log(|logger| logger.log_notification(&notification)),
            );
        }

        // Views always hear about a notify, even when nothing was queued.
        keep_first(&mut first_error, self.broadcast(&self.view_state()));

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Rate-limited notify keyed by `text`.
    ///
    /// Emits when `text` was never seen or was last emitted more than
    /// `min_interval` ago; otherwise drops the notification without any
    /// broadcast, log line or queue change. Returns whether it emitted.
    pub fn controlled_notify(
        &self,
        text: impl Into<String>,
        severity: Severity,
        min_interval: Duration,
        also_log: bool,
    ) -> bool {
        let text = text.into();
        let now = Instant::now();

        let emit = match self.last_seen.entry(text.clone()) {
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) > min_interval {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        };

        if !emit {
            trace!(text = %text, "Rate-limited notification dropped");
            return false;
        }

        self.notify_with(Notification::now(text, severity), also_log);
        true
    }

    /// [`Self::controlled_notify`] with the configured interval, logging on.
    pub fn controlled_notify_default(&self, text: impl Into<String>, severity: Severity) -> bool {
        self.controlled_notify(text, severity, self.controlled_interval, true)
    }

    /// Forward a line to the logger without touching the queue.
    pub fn log(&self, text: &str, severity: Severity) -> Result<()> {
        self.guarded_log(|logger| logger.log(text, severity))
    }

    pub fn set_application_status(&self, message: impl Into<String>) {
        self.publish(&ApplicationStatus {
            message: message.into(),
        });
    }

    /// Select the next notification. Stops at the last one.
    pub fn show_next(&self) {
        let ((), change) = self.update_view(|view| {
            if let Some(index) = view.index {
                if index + 1 < view.store.len() {
                    view.index = Some(index + 1);
                }
            }
        });
        self.finish_navigation(change);
    }

    /// Select the previous notification. Stops at the first one.
    pub fn show_previous(&self) {
        let ((), change) = self.update_view(|view| {
            if let Some(index) = view.index {
                if index != 0 {
                    view.index = Some(index - 1);
                }
            }
        });
        self.finish_navigation(change);
    }

    /// Select `index`; ignored when out of range.
    pub fn show_at(&self, index: usize) {
        let ((), change) = self.update_view(|view| {
            if index < view.store.len() {
                view.index = Some(index);
            }
        });
        self.finish_navigation(change);
    }

    /// Remove the selected notification. A no-op on an empty queue.
    pub fn dismiss_current(&self) -> Result<()> {
        let (result, change) = self.update_view(ViewState::dismiss_current);
        self.publish_change(change);
        result
    }

    /// Select `index` and remove it. On an invalid index the selection is
    /// left untouched and `IndexOutOfRange` is returned.
    pub fn dismiss_at(&self, index: usize) -> Result<()> {
        let (result, change) = self.update_view(|view| {
            let previous = view.index;
            view.index = Some(index);
            let result = view.dismiss_current();
            if result.is_err() {
                view.index = previous;
            }
            result
        });
        self.publish_change(change);
        result
    }

    /// Ignore the selected notification's text forever, dropping every queued
    /// copy of it. Returns the number of dropped notifications.
    pub fn ignore_current_message(&self) -> usize {
        let (purged, change) = self.update_view(|view| match view.selected_text() {
            Some(text) => view.store.ignore_message(text),
            None => 0,
        });
        self.publish_change(change);
        purged
    }

    /// Ignore `text` forever, dropping every queued copy of it.
    pub fn ignore_message(&self, text: impl Into<String>) -> usize {
        let text = text.into();
        let (purged, change) = self.update_view(|view| view.store.ignore_message(text));
        self.publish_change(change);
        purged
    }

    /// Ignore future notifications containing `topic`. Queued ones stay.
    pub fn ignore_topic(&self, topic: impl Into<String>) {
        let topic = topic.into();
        debug!(topic = %topic, "Ignoring notification topic");
        self.view.lock().store.ignore_topic(topic);
    }

    /// Drop every notification and ignore rule.
    pub fn clear(&self) {
        let ((), change) = self.update_view(|view| view.store.clear());
        self.publish_change(change);
    }

    pub fn has_notifications(&self) -> bool {
        !self.view.lock().store.is_empty()
    }

    pub fn notification_count(&self) -> usize {
        self.view.lock().store.len()
    }

    /// The selected notification, or the empty placeholder.
    pub fn current_notification(&self) -> Notification {
        self.view.lock().current.clone()
    }

    /// `None` exactly when the queue is empty.
    pub fn current_index(&self) -> Option<usize> {
        self.view.lock().index
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.view.lock().store.notifications().to_vec()
    }

    pub fn ignored_messages(&self) -> Vec<String> {
        self.view.lock().store.ignored_messages().to_vec()
    }

    pub fn ignored_topics(&self) -> Vec<String> {
        self.view.lock().store.ignored_topics().to_vec()
    }

    /// Run `f` on the view inside the critical section, refresh the selection
    /// and report whether the visible view changed.
    fn update_view<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> (R, Option<ViewChanged>) {
        let mut view = self.view.lock();
        let before = view.snapshot();
        let result = f(&mut view);
        view.refresh_current();
        let after = view.snapshot();

        let change = (before != after).then_some(ViewChanged {
            index: after.index,
            count: after.count,
        });
        (result, change)
    }

    fn view_state(&self) -> ViewChanged {
        let view = self.view.lock();
        ViewChanged {
            index: view.index,
            count: view.store.len(),
        }
    }

    /// Call the logger, turning a panic into [`Error::Logging`].
    fn guarded_log(&self, f: impl FnOnce(&dyn NotificationLogger) -> Result<()>) -> Result<()> {
        let logger = self.logger.as_ref();
        panic::catch_unwind(AssertUnwindSafe(|| f(logger))).unwrap_or_else(|payload| {
            Err(Error::logging(format!(
                "logger panicked: {}",
                panic_payload_to_string(&*payload)
            )))
        })
    }

    fn broadcast<T: 'static>(&self, event: &T) -> Result<()> {
        self.bus.send(event).into_result()?;
        Ok(())
    }

    fn publish<T: 'static>(&self, event: &T) {
        if let Err(e) = self.broadcast(event) {
            self.report_failure(&e);
        }
    }

    fn publish_change(&self, change: Option<ViewChanged>) {
        if let Some(change) = change {
            self.publish(&change);
        }
    }

    fn finish_navigation(&self, change: Option<ViewChanged>) {
        self.publish_change(change);
        self.publish(&ViewRefreshed);
    }

    fn report_failure(&self, error: &Error) {
        debug!(error = %error, "Notification failure swallowed");
        let hook = self.failure_hook.read().clone();
        if let Some(hook) = hook {
            hook(error);
        }
    }
}

impl std::fmt::Debug for NotificationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let view = self.view.lock();
        f.debug_struct("NotificationController")
            .field("count", &view.store.len())
            .field("index", &view.index)
            .field("startup_finished", &self.is_startup_finished())
            .finish()
    }
}

fn keep_first(slot: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        slot.get_or_insert(e);
    }
}
