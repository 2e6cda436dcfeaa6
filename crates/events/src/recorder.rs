//! Capturing subscriber for tests and diagnostics.

use std::sync::{Arc, Mutex, PoisonError};

use crate::bus::{handler, EventBus, Mount};
use crate::event::{Event, EventKind};

/// Subscribes to a set of kinds and keeps every event it sees, in order.
///
/// Dropping the recorder unsubscribes it.
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
    _mount: Mount,
}

impl EventRecorder {
    /// Record the given kinds.
    pub fn attach(bus: &EventBus, kinds: &[EventKind]) -> Self {
        let events: Arc<Mutex<Vec<Event>>> = Arc::default();
        let sink = Arc::clone(&events);
        let h = handler(move |event: &Event| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        });
        let mut mount = Mount::new("recorder");
        mount.subscribe_all(bus, kinds, &h);
        Self {
            events,
            _mount: mount,
        }
    }

    /// Record every known kind.
    pub fn attach_all(bus: &EventBus) -> Self {
        Self::attach(bus, &EventKind::ALL)
    }

    /// Get all captured events.
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Get events of one kind.
    pub fn events_of(&self, kind: EventKind) -> Vec<Event> {
        self.lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Kinds in the order they were published.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.lock().iter().map(Event::kind).collect()
    }

    pub fn last(&self) -> Option<Event> {
        self.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
