//! The two shared context maps and their change events.

use std::sync::{Mutex, MutexGuard, PoisonError};

use soma_events::{ContextMap, Event, EventBus, EventPayload};

use crate::state::ContextSnapshot;

/// Holds the semantic and behavior contexts.
///
/// Every mutation merges shallowly and then publishes the full resulting
/// map, never the delta. The lock is released before publishing so handlers
/// can read or write the store again.
pub struct ContextStore {
    bus: EventBus,
    semantic: Mutex<ContextMap>,
    behavior: Mutex<ContextMap>,
}

impl ContextStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            semantic: Mutex::new(ContextMap::new()),
            behavior: Mutex::new(ContextMap::new()),
        }
    }

    /// Merge into the semantic context and publish `semantic-context-changed`.
    pub fn set_semantic_context(&self, partial: ContextMap) -> ContextMap {
        let snapshot = merge_into(&self.semantic, partial);
        tracing::debug!(keys = snapshot.len(), "semantic context changed");
        self.bus
            .publish(Event::new(EventPayload::SemanticContextChanged(snapshot.clone())));
        snapshot
    }

    /// Merge into the behavior context and publish `behavior-context-changed`.
    pub fn set_behavior_context(&self, partial: ContextMap) -> ContextMap {
        let snapshot = merge_into(&self.behavior, partial);
        tracing::debug!(keys = snapshot.len(), "behavior context changed");
        self.bus
            .publish(Event::new(EventPayload::BehaviorContextChanged(snapshot.clone())));
        snapshot
    }

    pub fn semantic_context(&self) -> ContextMap {
        lock(&self.semantic).clone()
    }

    pub fn behavior_context(&self) -> ContextMap {
        lock(&self.behavior).clone()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            semantic: self.semantic_context(),
            behavior: self.behavior_context(),
        }
    }
}

fn lock(map: &Mutex<ContextMap>) -> MutexGuard<'_, ContextMap> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

fn merge_into(map: &Mutex<ContextMap>, partial: ContextMap) -> ContextMap {
    let mut guard = lock(map);
    guard.merge(partial);
    guard.clone()
}
