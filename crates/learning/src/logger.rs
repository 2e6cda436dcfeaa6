//! Bounded event history.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use soma_events::{handler, Event, EventBus, EventKind, EventPayload, Mount};

/// Default number of entries a logger keeps.
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Kinds recorded by the behavior logger.
pub const BEHAVIOR_KINDS: &[EventKind] = &[
    EventKind::TabActivated,
    EventKind::ModuleInteraction,
    EventKind::SemanticContextChanged,
];

/// Kinds recorded by the usage logger.
pub const USAGE_KINDS: &[EventKind] = &[EventKind::OpenTab, EventKind::SemanticTripleAdded];

/// One recorded event: `{ timestamp, type, payload }` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl LogEntry {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Newest-first ring buffer over a fixed allow-list of event kinds.
pub struct EventLogger {
    name: &'static str,
    kinds: &'static [EventKind],
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl EventLogger {
    pub fn new(name: &'static str, kinds: &'static [EventKind], capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            kinds,
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Tab activations, module interactions and semantic context changes.
    pub fn behavior(capacity: usize) -> Self {
        Self::new("behavior", BEHAVIOR_KINDS, capacity)
    }

    /// Tab open requests and added triples.
    pub fn usage(capacity: usize) -> Self {
        Self::new("usage", USAGE_KINDS, capacity)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kinds(&self) -> &'static [EventKind] {
        self.kinds
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record `event` if its kind is on the allow-list. The oldest entry is
    /// dropped once the buffer is full.
    pub fn record(&self, event: &Event) -> bool {
        if !self.kinds.contains(&event.kind()) {
            return false;
        }
        let mut entries = self.lock();
        entries.push_front(LogEntry {
            timestamp: Utc::now(),
            payload: event.payload().clone(),
        });
        entries.truncate(self.capacity);
        true
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<LogEntry> {
        self.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn mount(self: &Arc<Self>, bus: &EventBus) -> Mount {
        let weak: Weak<Self> = Arc::downgrade(self);
        let h = handler(move |event: &Event| {
            if let Some(logger) = weak.upgrade() {
                logger.record(event);
            }
        });
        let mut mount = Mount::new(self.name);
        mount.subscribe_all(bus, self.kinds, &h);
        mount
    }
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
