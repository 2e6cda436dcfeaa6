//! Chat-completion client.
//!
//! Endpoints take `{ "prompt": ... }` for generation or
//! `{ "messages": [...], "context": ... }` for chat, and answer
//! `{ "response": ... }` or `{ "content": ... }`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CompletionError, CompletionResult};
use crate::provider::{Provider, ProviderKind};

/// Reply used when the endpoint cannot be reached.
pub const FALLBACK_RESPONSE: &str = "I'm processing your request with my local intelligence.";

pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
}

/// One message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CompletionRequest {
    Prompt {
        prompt: String,
    },
    Messages {
        messages: Vec<ChatTurn>,
        /// Prompt-safe rendering of the current context.
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
}

impl CompletionRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::Prompt {
            prompt: prompt.into(),
        }
    }

    pub fn messages(messages: Vec<ChatTurn>, context: Option<String>) -> Self {
        Self::Messages { messages, context }
    }

    /// The prompt, or the content of the last chat message.
    pub fn text(&self) -> &str {
        match self {
            Self::Prompt { prompt } => prompt,
            Self::Messages { messages, .. } => messages.last().map_or("", |m| m.content.as_str()),
        }
    }
}

/// Sends a request to a provider and returns the reply text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        provider: &Provider,
        request: &CompletionRequest,
    ) -> CompletionResult<String>;
}

/// Like [`CompletionClient::complete`], but any failure yields
/// [`FALLBACK_RESPONSE`].
pub async fn complete_or_fallback(
    client: &dyn CompletionClient,
    provider: &Provider,
    request: &CompletionRequest,
) -> String {
    match client.complete(provider, request).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(provider = %provider.id, error = %e, "Completion failed, using local response");
            FALLBACK_RESPONSE.to_string()
        }
    }
}

#[derive(Deserialize)]
struct CompletionReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl CompletionReply {
    fn into_text(self) -> Option<String> {
        [self.response, self.content]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
    }
}

/// Posts JSON to a per-provider-kind endpoint.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoints: HashMap<ProviderKind, String>,
}

impl HttpCompletionClient {
    pub fn new(timeout: Duration) -> CompletionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoints: HashMap::new(),
        })
    }

    pub fn with_endpoint(mut self, kind: ProviderKind, url: impl Into<String>) -> Self {
        self.endpoints.insert(kind, url.into());
        self
    }

    fn endpoint_for<'a>(&'a self, provider: &'a Provider) -> Option<&'a str> {
        provider
            .endpoint
            .as_deref()
            .or_else(|| self.endpoints.get(&provider.kind).map(String::as_str))
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(
        &self,
        provider: &Provider,
        request: &CompletionRequest,
    ) -> CompletionResult<String> {
        let url = self
            .endpoint_for(provider)
            .ok_or_else(|| CompletionError::NoEndpoint {
                provider: provider.id.clone(),
            })?;

        tracing::debug!(provider = %provider.id, url, "Sending completion request");

        let mut builder = self.client.post(url).json(request);
        if let Some(key) = provider.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CompletionError::Status {
                status: resp.status().as_u16(),
            });
        }

        resp.json::<CompletionReply>()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?
            .into_text()
            .ok_or(CompletionError::EmptyResponse)
    }
}
