//! Shared event contracts and the in-process event bus.
//!
//! This crate defines the formal contracts (DTOs) for events that flow
//! between modules, and the synchronous [`EventBus`] that carries them.
//! Using shared types instead of free-form JSON means handlers match on
//! [`EventPayload`] variants rather than guessing payload shapes.

mod bus;
mod context_map;
mod event;
mod recorder;

pub use bus::{handler, EventBus, Handler, Mount, Subscription};
pub use context_map::{keys, ContextMap};
pub use event::{Event, EventKind, EventPayload, UnknownEventKind};
pub use recorder::EventRecorder;

use serde::{Deserialize, Serialize};

/// Opaque identifier the presentation layer resolves to something
/// renderable (`nocode:<id>`, `generated:<id>`, `builtin:<id>`).
///
/// The core never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderHandle(String);

impl RenderHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// `<scheme>:<id>`
    pub fn scoped(scheme: &str, id: &str) -> Self {
        Self(format!("{scheme}:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event emitted when the active tab changes.
///
/// Producers: tab manager
/// Consumers: behavior logger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabActivatedEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TabActivatedEvent {
    pub fn new(id: impl Into<String>, title: Option<String>) -> Self {
        Self {
            id: id.into(),
            title,
        }
    }
}

/// Event emitted when a module reports a user-level action.
///
/// Producers: no-code builder, generation orchestrator, chat history
/// Consumers: behavior logger, learning engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInteractionEvent {
    /// Module id.
    pub module: String,
    /// Action name, e.g. `component-added`.
    pub action: String,
    /// Action-specific detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ModuleInteractionEvent {
    pub fn new(module: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            action: action.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Subject-predicate-object statement.
///
/// Producers: triple store
/// Consumers: usage logger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

/// Request to open (or focus, if the manager decides so) a tab.
///
/// Producers: anyone
/// Consumers: tab manager, usage logger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTabEvent {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl OpenTabEvent {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            render: None,
            icon: None,
        }
    }

    pub fn with_render(mut self, render: RenderHandle) -> Self {
        self.render = Some(render);
        self
    }
}

/// Counts after a pattern analysis pass.
///
/// Producers: learning engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCompleteEvent {
    pub patterns: usize,
    pub insights: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Optimization,
    Suggestion,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightImpact {
    Low,
    Medium,
    High,
}

/// What applying an insight does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightAction {
    OptimizeModule,
    AdaptContext,
    SuggestFeature,
}

/// A derived, actionable recommendation.
///
/// Producers: learning engine (on apply)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub impact: InsightImpact,
    pub priority: u32,
    pub actionable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<InsightAction>,
}

/// Event names as constants to prevent typos.
pub mod event_names {
    pub const TAB_ACTIVATED: &str = "tab-activated";
    pub const MODULE_INTERACTION: &str = "module-interaction";
    pub const SEMANTIC_CONTEXT_CHANGED: &str = "semantic-context-changed";
    pub const BEHAVIOR_CONTEXT_CHANGED: &str = "behavior-context-changed";
    pub const SEMANTIC_TRIPLE_ADDED: &str = "semantic-triple-added";
    pub const OPEN_TAB: &str = "open-tab";
    pub const LEARNING_ANALYSIS_COMPLETE: &str = "learning-analysis-complete";
    pub const MODULE_OPTIMIZATION: &str = "module-optimization";
    pub const FEATURE_SUGGESTION: &str = "feature-suggestion";
}
