//! Typed in-process publish/subscribe bus.
//!
//! Subscribers register a handler for a message type under a
//! [`RecipientId`] and an optional [`Context`]. Senders address a message
//! type (and optionally a context); every matching handler runs before
//! `send` returns, and handler failures are collected instead of aborting
//! delivery.
//!
//! # Example
//!
//! ```
//! use message_bus::{Context, MessageBus, RecipientId};
//!
//! #[derive(Clone)]
//! struct Refresh;
//!
//! let bus = MessageBus::new();
//! let panel = RecipientId::next();
//! bus.register_with_context(panel, "sidebar", |_: &Refresh| {}).unwrap();
//!
//! assert_eq!(bus.send_with_context(&Refresh, "sidebar").delivered, 1);
//! // A send without a context never reaches contextful registrations.
//! assert_eq!(bus.send(&Refresh).delivered, 0);
//!
//! bus.unregister(panel);
//! assert_eq!(bus.send_with_context(&Refresh, Context::named("sidebar")).delivered, 0);
//! ```

mod bus;
mod error;
mod key;

pub use bus::{MessageBus, panic_payload_to_string};
pub use error::{BusError, DeliveryFailure, DeliveryReport, Result};
pub use key::{Context, RecipientId};
