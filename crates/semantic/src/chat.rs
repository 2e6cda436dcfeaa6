//! Chat history and its context-filtered view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use soma_events::{
    handler, keys, ContextMap, Event, EventBus, EventKind, EventPayload, ModuleInteractionEvent,
    Mount,
};

/// Module id used in the interactions this history publishes.
pub const CHAT_HISTORY_MODULE: &str = "chat-history";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    /// Free-text note on what the message was about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            emotion: None,
            context: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn mentions(&self, needle_lower: &str) -> bool {
        self.content.to_lowercase().contains(needle_lower)
            || self
                .context
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(needle_lower))
    }
}

/// User-chosen filters, applied before the context filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatFilter {
    /// Case-insensitive substring of the content. Empty matches all.
    pub search: String,
    /// `None` matches every emotion.
    pub emotion: Option<String>,
}

#[derive(Default)]
struct ChatState {
    messages: Vec<ChatMessage>,
    filter: ChatFilter,
    semantic: ContextMap,
    view: Vec<ChatMessage>,
}

impl ChatState {
    /// Apply the user filter, then the semantic context: content or context
    /// note must mention `focusEntity` and `currentTask` when set.
    fn refresh(&mut self) {
        let search = self.filter.search.trim().to_lowercase();
        let focus = self.semantic.get_str(keys::FOCUS_ENTITY).map(str::to_lowercase);
        let task = self.semantic.get_str(keys::CURRENT_TASK).map(str::to_lowercase);

        self.view = self
            .messages
            .iter()
            .filter(|m| search.is_empty() || m.content.to_lowercase().contains(&search))
            .filter(|m| match self.filter.emotion.as_deref() {
                None => true,
                Some(e) => m.emotion.as_deref() == Some(e),
            })
            .filter(|m| focus.as_deref().map_or(true, |f| m.mentions(f)))
            .filter(|m| task.as_deref().map_or(true, |t| m.mentions(t)))
            .cloned()
            .collect();
    }
}

/// Ordered conversation log with a filtered view that follows the semantic
/// context once mounted.
pub struct ChatHistory {
    bus: EventBus,
    state: Mutex<ChatState>,
}

impl ChatHistory {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Mutex::new(ChatState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message and publish a `new-message` interaction carrying it.
    pub fn push(&self, message: ChatMessage) {
        let detail = serde_json::to_value(&message).unwrap_or_default();
        {
            let mut state = self.lock();
            state.messages.push(message);
            state.refresh();
        }
        self.bus.publish(Event::new(EventPayload::ModuleInteraction(
            ModuleInteractionEvent::new(CHAT_HISTORY_MODULE, "new-message").with_detail(detail),
        )));
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    pub fn set_filter(&self, filter: ChatFilter) -> Vec<ChatMessage> {
        let mut state = self.lock();
        state.filter = filter;
        state.refresh();
        state.view.clone()
    }

    /// Re-derive the view for a new semantic context.
    pub fn refresh(&self, semantic: &ContextMap) -> Vec<ChatMessage> {
        let mut state = self.lock();
        state.semantic = semantic.clone();
        state.refresh();
        state.view.clone()
    }

    /// Messages passing the current filter and semantic context.
    pub fn view(&self) -> Vec<ChatMessage> {
        self.lock().view.clone()
    }

    /// Follow `semantic-context-changed`.
    pub fn mount(self: &Arc<Self>) -> Mount {
        let mut mount = Mount::new("chat-history");
        let weak: Weak<Self> = Arc::downgrade(self);

        let h = handler(move |event: &Event| {
            let Some(history) = weak.upgrade() else {
                return;
            };
            if let EventPayload::SemanticContextChanged(ctx) = event.payload() {
                let shown = history.refresh(ctx).len();
                tracing::debug!(shown, "Chat view refreshed");
            }
        });
        mount.subscribe_all(&self.bus, &[EventKind::SemanticContextChanged], &h);
        mount
    }
}
