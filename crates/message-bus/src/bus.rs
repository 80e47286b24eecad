//! The message bus registry and dispatch.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{BusError, DeliveryFailure, DeliveryReport, Result};
use crate::key::{Context, RecipientId, SubscriptionKey};

type Handler = Arc<dyn Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync>;

/// Typed publish/subscribe registry.
///
/// Handlers are keyed by `(recipient, context, message type)`. The host
/// application constructs one bus and shares it as `Arc<MessageBus>`.
///
/// `send` snapshots the matching handlers and releases the registry lock
/// before invoking them, so a handler may register, unregister or send on the
/// same bus. A registration racing an in-flight `send` may or may not see
/// that message.
#[derive(Default)]
pub struct MessageBus {
    registry: RwLock<HashMap<SubscriptionKey, Handler>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for messages of type `T` sent without a context.
    pub fn register<T, F>(&self, recipient: RecipientId, handler: F) -> Result<()>
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register_with_context(recipient, Context::None, handler)
    }

    /// Register `handler` for messages of type `T` sent with `context`.
    pub fn register_with_context<T, F>(
        &self,
        recipient: RecipientId,
        context: impl Into<Context>,
        handler: F,
    ) -> Result<()>
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.try_register_with_context(recipient, context, move |message: &T| {
            handler(message);
            Ok(())
        })
    }

    /// Register a fallible handler. Errors it returns are reported in the
    /// sender's [`DeliveryReport`] and never stop delivery to other handlers.
    pub fn try_register<T, F>(&self, recipient: RecipientId, handler: F) -> Result<()>
    where
        T: 'static,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.try_register_with_context(recipient, Context::None, handler)
    }

    pub fn try_register_with_context<T, F>(
        &self,
        recipient: RecipientId,
        context: impl Into<Context>,
        handler: F,
    ) -> Result<()>
    where
        T: 'static,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if !recipient.is_valid() {
            return Err(BusError::invalid_argument(
                "recipient id must be non-zero",
            ));
        }

        let key = SubscriptionKey::new::<T>(recipient, context.into());
        let handler: Handler = Arc::new(move |message: &dyn Any| {
            match message.downcast_ref::<T>() {
                Some(message) => handler(message),
                None => Err(anyhow!(
                    "message type mismatch, expected {}",
                    std::any::type_name::<T>()
                )),
            }
        });

        let context = key.context.clone();
        if self.registry.write().insert(key, handler).is_some() {
            debug!(
                %recipient,
                %context,
                message_type = std::any::type_name::<T>(),
                "Replaced existing subscription"
            );
        }
        Ok(())
    }

    /// Register a recipient whose messages are forwarded into a tokio channel,
    /// for subscribers that consume events from an async task.
    ///
    /// Once the receiver is dropped, each send to this recipient is reported
    /// as a delivery failure until it is unregistered.
    pub fn register_channel<T>(
        &self,
        recipient: RecipientId,
        context: impl Into<Context>,
    ) -> Result<mpsc::UnboundedReceiver<T>>
    where
        T: Clone + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        self.try_register_with_context(recipient, context, move |message: &T| {
            tx.send(message.clone())
                .map_err(|_| anyhow!("subscriber channel closed"))
        })?;
        Ok(rx)
    }

    /// Remove every subscription held by `recipient`, whatever its context or
    /// message type. Returns the number of removed entries.
    pub fn unregister(&self, recipient: RecipientId) -> usize {
        let mut registry = self.registry.write();
        let before = registry.len();
        registry.retain(|key, _| key.recipient != recipient);
        let removed = before - registry.len();
        trace!(%recipient, removed, "Unregistered recipient");
        removed
    }

    /// Remove the subscriptions of `recipient` registered with exactly
    /// `context`. Other contexts of the same recipient are kept.
    pub fn unregister_context(&self, recipient: RecipientId, context: impl Into<Context>) -> usize {
        let context = context.into();
        let mut registry = self.registry.write();
        let before = registry.len();
        registry.retain(|key, _| !(key.recipient == recipient && key.context == context));
        let removed = before - registry.len();
        trace!(%recipient, %context, removed, "Unregistered recipient context");
        removed
    }

    /// Deliver `message` to every handler registered for `T` without a
    /// context.
    pub fn send<T: 'static>(&self, message: &T) -> DeliveryReport {
        self.send_with_context(message, Context::None)
    }

    /// Deliver `message` to every handler registered for `T` with exactly
    /// `context`. All matching handlers run before this returns.
    pub fn send_with_context<T: 'static>(
        &self,
        message: &T,
        context: impl Into<Context>,
    ) -> DeliveryReport {
        let context = context.into();
        let message_type = TypeId::of::<T>();

        let targets: Vec<(RecipientId, Handler)> = self
            .registry
            .read()
            .iter()
            .filter(|(key, _)| key.message_type == message_type && key.context == context)
            .map(|(key, handler)| (key.recipient, Arc::clone(handler)))
            .collect();

        let mut report = DeliveryReport::default();
        for (recipient, handler) in targets {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(message as &dyn Any)));
            let error = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(error)) => error,
                Err(payload) => anyhow!("handler panicked: {}", panic_payload_to_string(&*payload)),
            };
            report.failures.push(DeliveryFailure {
                recipient,
                context: context.clone(),
                error,
            });
        }

        if !report.is_ok() {
            warn!(
                message_type = std::any::type_name::<T>(),
                %context,
                delivered = report.delivered,
                failed = report.failures.len(),
                "Message delivered with handler failures"
            );
        }

        report
    }

    /// Whether `recipient` has a handler for `T` under `context`.
    pub fn is_registered<T: 'static>(
        &self,
        recipient: RecipientId,
        context: impl Into<Context>,
    ) -> bool {
        let key = SubscriptionKey::new::<T>(recipient, context.into());
        self.registry.read().contains_key(&key)
    }

    /// Number of stored handlers.
    pub fn subscription_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Number of distinct recipients with at least one handler.
    pub fn recipient_count(&self) -> usize {
        let registry = self.registry.read();
        let mut recipients: Vec<RecipientId> = registry.keys().map(|key| key.recipient).collect();
        recipients.sort_unstable();
        recipients.dedup();
        recipients.len()
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Best-effort message from a `catch_unwind` payload.
pub fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Pong;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn register_counter<T: 'static>(
        bus: &MessageBus,
        recipient: RecipientId,
        context: Context,
        hits: &Arc<AtomicUsize>,
    ) {
        let hits = hits.clone();
        bus.register_with_context(recipient, context, move |_: &T| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    #[test]
    fn send_reaches_every_matching_handler() {
        let bus = MessageBus::new();
        let a = counter();
        let b = counter();
        register_counter::<Ping>(&bus, RecipientId::next(), Context::None, &a);
        register_counter::<Ping>(&bus, RecipientId::next(), Context::None, &b);

        let report = bus.send(&Ping(1));
        assert_eq!(report.delivered, 2);
        assert!(report.is_ok());
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_filters_by_message_type() {
        let bus = MessageBus::new();
        let pings = counter();
        let pongs = counter();
        let recipient = RecipientId::next();
        register_counter::<Ping>(&bus, recipient, Context::None, &pings);
        register_counter::<Pong>(&bus, recipient, Context::None, &pongs);

        bus.send(&Pong);
        assert_eq!(pings.load(Ordering::SeqCst), 0);
        assert_eq!(pongs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_context_and_named_context_do_not_cross() {
        let bus = MessageBus::new();
        let plain = counter();
        let scoped = counter();
        let other = counter();
        register_counter::<Ping>(&bus, RecipientId::next(), Context::None, &plain);
        register_counter::<Ping>(&bus, RecipientId::next(), Context::named("ui"), &scoped);
        register_counter::<Ping>(&bus, RecipientId::next(), Context::named("worker"), &other);

        bus.send(&Ping(1));
        assert_eq!(plain.load(Ordering::SeqCst), 1);
        assert_eq!(scoped.load(Ordering::SeqCst), 0);

        bus.send_with_context(&Ping(2), "ui");
        assert_eq!(plain.load(Ordering::SeqCst), 1);
        assert_eq!(scoped.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registering_same_key_overwrites_previous_handler() {
        let bus = MessageBus::new();
        let first = counter();
        let second = counter();
        let recipient = RecipientId::next();
        register_counter::<Ping>(&bus, recipient, Context::None, &first);
        register_counter::<Ping>(&bus, recipient, Context::None, &second);

        assert_eq!(bus.subscription_count(), 1);
        let report = bus.send(&Ping(1));
        assert_eq!(report.delivered, 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_recipient_is_rejected() {
        let bus = MessageBus::new();
        let err = bus
            .register(RecipientId::from_raw(0), |_: &Ping| {})
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidArgument(_)));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[test]
    fn unregister_removes_all_contexts_and_types() {
        let bus = MessageBus::new();
        let hits = counter();
        let recipient = RecipientId::next();
        let survivor = RecipientId::next();
        register_counter::<Ping>(&bus, recipient, Context::None, &hits);
        register_counter::<Ping>(&bus, recipient, Context::named("ui"), &hits);
        register_counter::<Pong>(&bus, recipient, Context::None, &hits);
        register_counter::<Ping>(&bus, survivor, Context::None, &hits);

        assert_eq!(bus.unregister(recipient), 3);
        assert_eq!(bus.subscription_count(), 1);
        assert_eq!(bus.recipient_count(), 1);

        bus.send(&Ping(1));
        bus.send_with_context(&Ping(1), "ui");
        bus.send(&Pong);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_context_removes_only_exact_match() {
        let bus = MessageBus::new();
        let hits = counter();
        let recipient = RecipientId::next();
        register_counter::<Ping>(&bus, recipient, Context::None, &hits);
        register_counter::<Ping>(&bus, recipient, Context::named("ui"), &hits);

        assert_eq!(bus.unregister_context(recipient, "ui"), 1);
        assert!(bus.is_registered::<Ping>(recipient, Context::None));
        assert!(!bus.is_registered::<Ping>(recipient, "ui"));

        assert_eq!(bus.unregister_context(recipient, "missing"), 0);
        assert_eq!(bus.subscription_count(), 1);
    }

    #[test]
    fn failing_handlers_do_not_stop_fan_out() {
        let bus = MessageBus::new();
        let hits = counter();
        let failing = RecipientId::next();
        let panicking = RecipientId::next();
        bus.try_register(failing, |_: &Ping| Err(anyhow!("handler refused")))
            .unwrap();
        bus.register(panicking, |_: &Ping| panic!("handler exploded"))
            .unwrap();
        register_counter::<Ping>(&bus, RecipientId::next(), Context::None, &hits);
        register_counter::<Ping>(&bus, RecipientId::next(), Context::None, &hits);

        let report = bus.send(&Ping(1));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let mut failed: Vec<RecipientId> = report.failures.iter().map(|f| f.recipient).collect();
        failed.sort();
        let mut expected = vec![failing, panicking];
        expected.sort();
        assert_eq!(failed, expected);

        let panic_failure = report
            .failures
            .iter()
            .find(|f| f.recipient == panicking)
            .unwrap();
        assert!(panic_failure.error.to_string().contains("handler exploded"));
        assert!(report.into_result().is_err());
    }

    #[test]
    fn handlers_can_reenter_the_bus() {
        let bus = Arc::new(MessageBus::new());
        let recipient = RecipientId::next();
        let late = counter();

        let inner_bus = Arc::clone(&bus);
        let inner_hits = late.clone();
        bus.register(recipient, move |_: &Ping| {
            let hits = inner_hits.clone();
            inner_bus
                .register(RecipientId::next(), move |_: &Pong| {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            inner_bus.send(&Pong);
            inner_bus.unregister(recipient);
        })
        .unwrap();

        let report = bus.send(&Ping(1));
        assert_eq!(report.delivered, 1);
        assert_eq!(late.load(Ordering::SeqCst), 1);
        assert!(!bus.is_registered::<Ping>(recipient, Context::None));
    }

    #[test]
    fn concurrent_register_send_unregister_keeps_registry_consistent() {
        let bus = Arc::new(MessageBus::new());
        let hits = counter();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let bus = Arc::clone(&bus);
                let hits = hits.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let recipient = RecipientId::next();
                        let hits = hits.clone();
                        bus.register(recipient, move |_: &Ping| {
                            hits.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                        bus.send(&Ping(i));
                        assert_eq!(bus.unregister(recipient), 1);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(bus.subscription_count(), 0);
        // Every send at least reached the handler its own thread registered.
        assert!(hits.load(Ordering::SeqCst) >= 8 * 200);
    }

    #[tokio::test]
    async fn channel_subscribers_receive_clones() {
        let bus = MessageBus::new();
        let recipient = RecipientId::next();
        let mut rx = bus.register_channel::<Ping>(recipient, "async").unwrap();

        bus.send_with_context(&Ping(1), "async");
        bus.send_with_context(&Ping(2), "async");
        bus.send(&Ping(3));

        assert_eq!(rx.recv().await, Some(Ping(1)));
        assert_eq!(rx.recv().await, Some(Ping(2)));
        assert!(rx.try_recv().is_err());

        drop(rx);
        let report = bus.send_with_context(&Ping(4), "async");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].recipient, recipient);
    }
}
