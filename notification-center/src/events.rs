//! Events broadcast on the message bus by the notification controller.
//!
//! Subscribers register for these types on the shared
//! [`MessageBus`](message_bus::MessageBus) and react by reading the
//! controller's queries or calling its navigation operations.

use crate::notification::Notification;

/// A notification was appended to the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationAdded {
    pub notification: Notification,
}

/// A notification was raised, whether or not it was queued.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationOccurred {
    pub notification: Notification,
}

/// A notification was raised before startup finished.
///
/// Sent in addition to [`NotificationOccurred`] so that subscribers can treat
/// startup-time messages separately.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPhaseNotification {
    pub notification: Notification,
}

/// The selected notification, its index or the queue length changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewChanged {
    pub index: Option<usize>,
    pub count: usize,
}

/// A navigation operation completed; views should re-read the current
/// notification even if nothing moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRefreshed;

/// Free-form application status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationStatus {
    pub message: String,
}
