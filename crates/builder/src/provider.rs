//! Language-model providers available for generation.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use soma_events::{Event, EventBus, EventPayload, ModuleInteractionEvent};

/// Module id used in provider interactions.
pub const SEMANTIC_AI_MODULE: &str = "semantic-ai";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Groq,
    Openai,
    Local,
    Custom,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Openai => "openai",
            Self::Local => "local",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// Never serialized.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Overrides the client's endpoint for this provider kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Provider {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            api_key: None,
            endpoint: None,
            enabled: true,
            capabilities: default_capabilities(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn default_capabilities() -> Vec<String> {
    ["code-generation", "context-analysis", "module-creation"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Providers shipped out of the box.
pub fn default_providers() -> Vec<Provider> {
    vec![
        Provider::new("groq-default", "Groq (Default)", ProviderKind::Groq),
        Provider::new("openai-default", "OpenAI GPT-4", ProviderKind::Openai).disabled(),
    ]
}

struct ProviderState {
    providers: Vec<Provider>,
    /// Explicit choice. Ignored once that provider is removed.
    chosen: Option<String>,
}

pub struct ProviderSet {
    bus: EventBus,
    state: Mutex<ProviderState>,
}

impl ProviderSet {
    /// Set holding [`default_providers`].
    pub fn new(bus: EventBus) -> Self {
        Self::with_providers(bus, default_providers())
    }

    pub fn with_providers(bus: EventBus, providers: Vec<Provider>) -> Self {
        Self {
            bus,
            state: Mutex::new(ProviderState {
                providers,
                chosen: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a provider and publish `provider-added`. Ids are unique; a
    /// duplicate is ignored and false returned.
    pub fn add(&self, provider: Provider) -> bool {
        let detail = {
            let mut state = self.lock();
            if state.providers.iter().any(|p| p.id == provider.id) {
                tracing::debug!(provider = %provider.id, "Provider already present");
                return false;
            }
            let detail = serde_json::json!({ "provider": &provider });
            state.providers.push(provider);
            detail
        };
        self.bus.publish(Event::new(EventPayload::ModuleInteraction(
            ModuleInteractionEvent::new(SEMANTIC_AI_MODULE, "provider-added").with_detail(detail),
        )));
        true
    }

    pub fn remove(&self, id: &str) -> Option<Provider> {
        let mut state = self.lock();
        let index = state.providers.iter().position(|p| p.id == id)?;
        if state.chosen.as_deref() == Some(id) {
            state.chosen = None;
        }
        Some(state.providers.remove(index))
    }

    /// Choose the active provider. Unknown ids are ignored.
    pub fn set_active(&self, id: &str) -> bool {
        let mut state = self.lock();
        if !state.providers.iter().any(|p| p.id == id) {
            return false;
        }
        state.chosen = Some(id.to_string());
        true
    }

    /// The explicit choice, else the first enabled provider.
    pub fn active(&self) -> Option<Provider> {
        let state = self.lock();
        state
            .chosen
            .as_deref()
            .and_then(|id| state.providers.iter().find(|p| p.id == id))
            .or_else(|| state.providers.iter().find(|p| p.enabled))
            .cloned()
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.lock().providers.clone()
    }
}
