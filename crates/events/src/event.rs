//! Event envelope and the tagged payload union.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context_map::ContextMap;
use crate::event_names;
use crate::{
    AnalysisCompleteEvent, InsightEvent, ModuleInteractionEvent, OpenTabEvent, TabActivatedEvent,
    Triple,
};

/// Dispatch key of an event. Serializes to the wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    TabActivated,
    ModuleInteraction,
    SemanticContextChanged,
    BehaviorContextChanged,
    SemanticTripleAdded,
    OpenTab,
    LearningAnalysisComplete,
    ModuleOptimization,
    FeatureSuggestion,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::TabActivated,
        EventKind::ModuleInteraction,
        EventKind::SemanticContextChanged,
        EventKind::BehaviorContextChanged,
        EventKind::SemanticTripleAdded,
        EventKind::OpenTab,
        EventKind::LearningAnalysisComplete,
        EventKind::ModuleOptimization,
        EventKind::FeatureSuggestion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::TabActivated => event_names::TAB_ACTIVATED,
            EventKind::ModuleInteraction => event_names::MODULE_INTERACTION,
            EventKind::SemanticContextChanged => event_names::SEMANTIC_CONTEXT_CHANGED,
            EventKind::BehaviorContextChanged => event_names::BEHAVIOR_CONTEXT_CHANGED,
            EventKind::SemanticTripleAdded => event_names::SEMANTIC_TRIPLE_ADDED,
            EventKind::OpenTab => event_names::OPEN_TAB,
            EventKind::LearningAnalysisComplete => event_names::LEARNING_ANALYSIS_COMPLETE,
            EventKind::ModuleOptimization => event_names::MODULE_OPTIMIZATION,
            EventKind::FeatureSuggestion => event_names::FEATURE_SUGGESTION,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a known event type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// One variant per known event type, so handlers match exhaustively
/// instead of probing payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum EventPayload {
    TabActivated(TabActivatedEvent),
    ModuleInteraction(ModuleInteractionEvent),
    SemanticContextChanged(ContextMap),
    BehaviorContextChanged(ContextMap),
    SemanticTripleAdded(Triple),
    OpenTab(OpenTabEvent),
    LearningAnalysisComplete(AnalysisCompleteEvent),
    ModuleOptimization(InsightEvent),
    FeatureSuggestion(InsightEvent),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::TabActivated(_) => EventKind::TabActivated,
            EventPayload::ModuleInteraction(_) => EventKind::ModuleInteraction,
            EventPayload::SemanticContextChanged(_) => EventKind::SemanticContextChanged,
            EventPayload::BehaviorContextChanged(_) => EventKind::BehaviorContextChanged,
            EventPayload::SemanticTripleAdded(_) => EventKind::SemanticTripleAdded,
            EventPayload::OpenTab(_) => EventKind::OpenTab,
            EventPayload::LearningAnalysisComplete(_) => EventKind::LearningAnalysisComplete,
            EventPayload::ModuleOptimization(_) => EventKind::ModuleOptimization,
            EventPayload::FeatureSuggestion(_) => EventKind::FeatureSuggestion,
        }
    }

    /// The payload body without the type tag, as it appears on the wire.
    pub fn to_value(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut obj)) => obj.remove("payload").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// An immutable published event: `{ type, payload, meta? }` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub struct Event {
    payload: EventPayload,
    meta: Map<String, Value>,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            meta: Map::new(),
        }
    }

    /// Attach a metadata entry (source, correlation id, ...).
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// Parse a `{ type, payload, meta? }` document.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<EventPayload> for Event {
    fn from(payload: EventPayload) -> Self {
        Event::new(payload)
    }
}

#[derive(Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(default)]
    payload: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    meta: Map<String, Value>,
}

impl TryFrom<WireEvent> for Event {
    type Error = serde_json::Error;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let mut tagged = Map::new();
        tagged.insert("type".into(), Value::String(wire.kind.as_str().into()));
        tagged.insert("payload".into(), wire.payload);
        let payload: EventPayload = serde_json::from_value(Value::Object(tagged))?;
        Ok(Event {
            payload,
            meta: wire.meta,
        })
    }
}

impl From<Event> for WireEvent {
    fn from(event: Event) -> Self {
        WireEvent {
            kind: event.kind(),
            payload: event.payload.to_value(),
            meta: event.meta,
        }
    }
}
