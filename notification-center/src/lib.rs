//! Notification center.
//!
//! A filterable, rate-limited queue of user-visible notifications. Changes
//! are announced on a shared [`MessageBus`](message_bus::MessageBus).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use message_bus::{MessageBus, RecipientId};
//! use notification_center::{
//!     Notification, NotificationController, TracingLogger, events::ViewChanged,
//! };
//!
//! let bus = Arc::new(MessageBus::new());
//! bus.register(RecipientId::next(), |change: &ViewChanged| {
//!     println!("now showing {:?} of {}", change.index, change.count);
//! })
//! .unwrap();
//!
//! let center = NotificationController::new(bus, Arc::new(TracingLogger));
//! center.set_startup_finished(true);
//! center.notify(Notification::error("disk full"));
//!
//! assert_eq!(center.notification_count(), 1);
//! assert_eq!(center.current_index(), Some(0));
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logger;
pub mod logging;
pub mod notification;
pub mod store;

pub use config::{DEFAULT_CONTROLLED_NOTIFY_INTERVAL, NotificationCenterConfig};
pub use controller::{FailureHook, NotificationController};
pub use error::{Error, Result};
pub use logger::{NotificationLogger, TracingLogger};
pub use notification::{Notification, Severity};
pub use store::{AddOutcome, NotificationStore};
