//! Notification queue and suppression rules.
//!
//! The store is plain data: it performs no I/O and emits no events. The
//! controller owns the only instance and wraps every call in its own lock.

use tracing::trace;

use crate::error::{Error, Result};
use crate::notification::Notification;

/// Result of [`NotificationStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Suppressed,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationStore {
    notifications: Vec<Notification>,
    /// Exact, case-sensitive text matches.
    ignored_messages: Vec<String>,
    /// Substrings, stored lowercased.
    ignored_topics: Vec<String>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with topics pre-loaded, usually from configuration.
    pub fn with_ignored_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::new();
        for topic in topics {
            store.ignore_topic(topic);
        }
        store
    }

    /// Append `notification` unless an ignore rule matches it.
    pub fn add(&mut self, notification: Notification) -> AddOutcome {
        if self.is_suppressed(&notification.text) {
            trace!(text = %notification.text, "Notification suppressed");
            return AddOutcome::Suppressed;
        }
        self.notifications.push(notification);
        AddOutcome::Added
    }

    /// Notification at `index`, or the empty placeholder when out of range.
    pub fn show(&self, index: usize) -> Notification {
        self.notifications
            .get(index)
            .cloned()
            .unwrap_or_else(Notification::placeholder)
    }

    /// Remove the notification at `index`.
    ///
    /// Dismissing index 0 of an empty queue is a no-op returning `Ok(None)`.
    pub fn dismiss(&mut self, index: usize) -> Result<Option<Notification>> {
        if self.notifications.is_empty() && index == 0 {
            return Ok(None);
        }
        if index >= self.notifications.len() {
            return Err(Error::index_out_of_range(index, self.notifications.len()));
        }
        Ok(Some(self.notifications.remove(index)))
    }

    /// Ignore `text` from now on and drop every queued notification with
    /// exactly that text. Returns how many were dropped.
    pub fn ignore_message(&mut self, text: impl Into<String>) -> usize {
        let text = text.into();
        if self.ignored_messages.contains(&text) {
            return 0;
        }

        let before = self.notifications.len();
        self.notifications.retain(|n| n.text != text);
        self.ignored_messages.push(text);
        before - self.notifications.len()
    }

    /// Ignore every future notification whose text contains `topic`, ignoring
    /// case. Already queued notifications are kept.
    pub fn ignore_topic(&mut self, topic: impl Into<String>) {
        let topic = topic.into().to_lowercase();
        if !self.ignored_topics.contains(&topic) {
            self.ignored_topics.push(topic);
        }
    }

    /// Empty the queue and both ignore lists.
    pub fn clear(&mut self) {
        self.notifications.clear();
        self.ignored_messages.clear();
        self.ignored_topics.clear();
    }

    pub fn is_suppressed(&self, text: &str) -> bool {
        if self.ignored_messages.iter().any(|m| m == text) {
            return true;
        }
        if self.ignored_topics.is_empty() {
            return false;
        }
        let text = text.to_lowercase();
        self.ignored_topics
            .iter()
            .any(|topic| text.contains(topic.as_str()))
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn ignored_messages(&self) -> &[String] {
        &self.ignored_messages
    }

    pub fn ignored_topics(&self) -> &[String] {
        &self.ignored_topics
    }
}
