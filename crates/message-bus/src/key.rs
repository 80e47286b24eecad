//! Subscription identity: who is listening, and for which context.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RECIPIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying a subscriber.
///
/// A recipient does not own the messages it receives; the id only ties a set
/// of registrations together so they can be removed in one call. Zero is
/// never handed out by [`RecipientId::next`] and is rejected on registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientId(u64);

impl RecipientId {
    /// Allocate a fresh, process-unique recipient id.
    pub fn next() -> Self {
        Self(NEXT_RECIPIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an existing handle (for example an id owned by a UI toolkit).
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recipient#{}", self.0)
    }
}

/// Optional discriminator narrowing delivery to a subtopic.
///
/// `None` is its own matching class: a message sent without a context only
/// reaches registrations made without one, and never the `Named` ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Context {
    #[default]
    None,
    Named(String),
}

impl Context {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<&str> for Context {
    fn from(value: &str) -> Self {
        Self::Named(value.to_string())
    }
}

impl From<String> for Context {
    fn from(value: String) -> Self {
        Self::Named(value)
    }
}

impl<T: Into<Context>> From<Option<T>> for Context {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("<none>"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Registry key. One handler is stored per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SubscriptionKey {
    pub(crate) recipient: RecipientId,
    pub(crate) context: Context,
    pub(crate) message_type: TypeId,
}

impl SubscriptionKey {
    pub(crate) fn new<T: 'static>(recipient: RecipientId, context: Context) -> Self {
        Self {
            recipient,
            context,
            message_type: TypeId::of::<T>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_ids_are_unique_and_valid() {
        let a = RecipientId::next();
        let b = RecipientId::next();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert!(b.is_valid());
        assert!(!RecipientId::from_raw(0).is_valid());
    }

    #[test]
    fn none_context_is_distinct_from_named() {
        assert_ne!(Context::None, Context::named(""));
        assert_eq!(Context::from("ui"), Context::named("ui"));
        assert_eq!(Context::from(None::<&str>), Context::None);
        assert_eq!(Context::from(Some("ui")), Context::named("ui"));
    }

    #[test]
    fn key_distinguishes_message_types() {
        let recipient = RecipientId::next();
        let a = SubscriptionKey::new::<u32>(recipient, Context::None);
        let b = SubscriptionKey::new::<String>(recipient, Context::None);
        assert_ne!(a, b);
        assert_eq!(a, SubscriptionKey::new::<u32>(recipient, Context::None));
    }
}
