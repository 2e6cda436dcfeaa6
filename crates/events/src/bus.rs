//! In-memory publish/subscribe bus.
//!
//! Dispatch is synchronous and re-entrant: `publish` runs every handler for
//! the event's kind on the caller's stack, in subscription order, and a
//! handler that publishes again sees its cascade complete before control
//! returns to it. No lock is held while handlers run.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::event::{Event, EventKind};

/// Event handler. Identity is the `Arc` allocation, not the closure body.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Default)]
struct BusInner {
    handlers: Mutex<HashMap<EventKind, Vec<Handler>>>,
}

impl BusInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Handler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, kind: EventKind, handler: &Handler) -> bool {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| !same_handler(h, handler));
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }

    fn is_registered(&self, kind: EventKind, handler: &Handler) -> bool {
        self.lock()
            .get(&kind)
            .is_some_and(|list| list.iter().any(|h| same_handler(h, handler)))
    }
}

fn same_handler(a: &Handler, b: &Handler) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Shared handle to the event bus. Clones refer to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`.
    ///
    /// Subscribing the same `Arc` twice keeps a single entry. Two distinct
    /// closures with identical bodies are two entries.
    pub fn subscribe(&self, kind: EventKind, handler: Handler) {
        let mut handlers = self.inner.lock();
        let list = handlers.entry(kind).or_default();
        if list.iter().any(|h| same_handler(h, &handler)) {
            tracing::trace!(kind = %kind, "handler already subscribed");
            return;
        }
        list.push(handler);
        tracing::trace!(kind = %kind, count = list.len(), "handler subscribed");
    }

    /// Remove `handler` from `kind`. No-op if it is not registered.
    pub fn unsubscribe(&self, kind: EventKind, handler: &Handler) {
        if self.inner.remove(kind, handler) {
            tracing::trace!(kind = %kind, "handler unsubscribed");
        }
    }

    /// Subscribe and return a guard that unsubscribes when dropped.
    pub fn subscribe_scoped(&self, kind: EventKind, handler: Handler) -> Subscription {
        self.subscribe(kind, Arc::clone(&handler));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            handler: Some(handler),
        }
    }

    /// Dispatch `event` to every handler registered for its kind.
    ///
    /// The handler list is snapshotted first. A handler removed while the
    /// dispatch is in progress is skipped if it has not run yet; handlers
    /// added during dispatch start receiving events from the next publish.
    ///
    /// A panicking handler is logged and skipped over. It never aborts its
    /// siblings or unwinds into the publisher.
    pub fn publish(&self, event: Event) {
        let kind = event.kind();
        let snapshot: Vec<Handler> = match self.inner.lock().get(&kind) {
            Some(list) => list.clone(),
            None => {
                tracing::trace!(kind = %kind, "no subscribers");
                return;
            }
        };

        tracing::trace!(kind = %kind, handlers = snapshot.len(), "publish");

        for (index, h) in snapshot.iter().enumerate() {
            if !self.inner.is_registered(kind, h) {
                continue;
            }
            let result = panic::catch_unwind(AssertUnwindSafe(|| h(&event)));
            if let Err(payload) = result {
                tracing::error!(
                    kind = %kind,
                    handler = index,
                    panic = panic_message(payload.as_ref()),
                    "event handler panicked"
                );
            }
        }
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner.lock().get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.inner.lock();
        let mut counts: Vec<(&str, usize)> = handlers
            .iter()
            .map(|(kind, list)| (kind.as_str(), list.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

/// Scoped subscription. Dropping it unsubscribes the handler.
///
/// Holds the bus weakly, so an outstanding guard does not keep a torn-down
/// bus alive.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    handler: Option<Handler>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Unsubscribe now rather than at drop.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(handler) = self.handler.take() else {
            return;
        };
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.kind, &handler);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("active", &self.handler.is_some())
            .finish()
    }
}

/// The subscriptions one component created, torn down together.
#[derive(Debug, Default)]
#[must_use = "dropping a Mount unsubscribes all of its handlers"]
pub struct Mount {
    owner: &'static str,
    subscriptions: Vec<Subscription>,
}

impl Mount {
    pub fn new(owner: &'static str) -> Self {
        Self {
            owner,
            subscriptions: Vec::new(),
        }
    }

    /// Subscribe one handler to several kinds and keep the guards.
    pub fn subscribe_all(&mut self, bus: &EventBus, kinds: &[EventKind], handler: &Handler) {
        for kind in kinds {
            self.subscriptions
                .push(bus.subscribe_scoped(*kind, Arc::clone(handler)));
        }
    }

    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release every subscription.
    pub fn unmount(mut self) {
        tracing::debug!(owner = self.owner, count = self.subscriptions.len(), "unmount");
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;
    use crate::{ModuleInteractionEvent, OpenTabEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn interaction(module: &str, action: &str) -> Event {
        Event::new(EventPayload::ModuleInteraction(ModuleInteractionEvent::new(
            module, action,
        )))
    }

    fn open_tab(id: &str) -> Event {
        Event::new(EventPayload::OpenTab(OpenTabEvent::new(id, id)))
    }

    #[test]
    fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let calls = Arc::clone(&calls);
            bus.subscribe(
                EventKind::ModuleInteraction,
                handler(move |_| calls.lock().unwrap().push(n)),
            );
        }

        bus.publish(interaction("chat", "open"));
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_same_handler_subscribed_twice_runs_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let h = handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.subscribe(EventKind::OpenTab, Arc::clone(&h));
        bus.subscribe(EventKind::OpenTab, Arc::clone(&h));
        assert_eq!(bus.handler_count(EventKind::OpenTab), 1);

        bus.publish(open_tab("t1"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_equal_closures_are_distinct_handlers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let c = Arc::clone(&count);
            bus.subscribe(
                EventKind::OpenTab,
                handler(move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        bus.publish(open_tab("t1"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribed_handler_is_not_called() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let h = handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.subscribe(EventKind::OpenTab, Arc::clone(&h));
        bus.unsubscribe(EventKind::OpenTab, &h);
        bus.unsubscribe(EventKind::OpenTab, &h);

        bus.publish(open_tab("t1"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.handler_count(EventKind::OpenTab), 0);
    }

    #[test]
    fn test_dispatch_is_per_kind() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        bus.subscribe(
            EventKind::OpenTab,
            handler(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(interaction("chat", "open"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reentrant_publish_is_depth_first() {
        let bus = EventBus::new();
        let trace = Arc::new(Mutex::new(Vec::new()));

        {
            let trace = Arc::clone(&trace);
            let inner_bus = bus.clone();
            bus.subscribe(
                EventKind::ModuleInteraction,
                handler(move |_| {
                    trace.lock().unwrap().push("outer-first:start");
                    inner_bus.publish(open_tab("nested"));
                    trace.lock().unwrap().push("outer-first:end");
                }),
            );
        }
        {
            let trace = Arc::clone(&trace);
            bus.subscribe(
                EventKind::ModuleInteraction,
                handler(move |_| trace.lock().unwrap().push("outer-second")),
            );
        }
        {
            let trace = Arc::clone(&trace);
            bus.subscribe(
                EventKind::OpenTab,
                handler(move |_| trace.lock().unwrap().push("nested")),
            );
        }

        bus.publish(interaction("chat", "open"));
        assert_eq!(
            *trace.lock().unwrap(),
            vec![
                "outer-first:start",
                "nested",
                "outer-first:end",
                "outer-second"
            ]
        );
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventKind::OpenTab, handler(|_| panic!("boom")));
        let c = Arc::clone(&count);
        bus.subscribe(
            EventKind::OpenTab,
            handler(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(open_tab("t1"));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // The bus is still usable afterwards.
        bus.publish(open_tab("t2"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_removed_mid_dispatch_is_skipped() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let victim = handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        {
            let bus_clone = bus.clone();
            let victim = Arc::clone(&victim);
            bus.subscribe(
                EventKind::OpenTab,
                handler(move |_| bus_clone.unsubscribe(EventKind::OpenTab, &victim)),
            );
        }
        bus.subscribe(EventKind::OpenTab, Arc::clone(&victim));

        bus.publish(open_tab("t1"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscription_guard_unsubscribes_on_drop() {
        let bus = EventBus::new();
        let sub = bus.subscribe_scoped(EventKind::OpenTab, handler(|_| {}));
        assert_eq!(bus.handler_count(EventKind::OpenTab), 1);
        assert_eq!(sub.kind(), EventKind::OpenTab);

        drop(sub);
        assert_eq!(bus.handler_count(EventKind::OpenTab), 0);
    }

    #[test]
    fn test_mount_releases_every_kind() {
        let bus = EventBus::new();
        let h = handler(|_| {});
        let mut mount = Mount::new("test");
        mount.subscribe_all(
            &bus,
            &[EventKind::OpenTab, EventKind::ModuleInteraction],
            &h,
        );
        assert_eq!(mount.len(), 2);
        assert_eq!(bus.handler_count(EventKind::ModuleInteraction), 1);

        mount.unmount();
        assert_eq!(bus.handler_count(EventKind::OpenTab), 0);
        assert_eq!(bus.handler_count(EventKind::ModuleInteraction), 0);
    }

    #[test]
    fn test_guard_outliving_bus_is_harmless() {
        let bus = EventBus::new();
        let sub = bus.subscribe_scoped(EventKind::OpenTab, handler(|_| {}));
        drop(bus);
        sub.cancel();
    }
}
