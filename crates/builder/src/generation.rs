//! Module generation through a language-model provider.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use soma_context::limits::{sanitize_for_prompt, MAX_VALUE_LEN};
use soma_context::{ContextSnapshot, ContextStore};
use soma_events::{keys, ContextMap, Event, EventBus, EventPayload, ModuleInteractionEvent};
use soma_registry::ModuleRegistry;

use crate::completion::{CompletionClient, CompletionRequest};
use crate::error::{GenerationError, GenerationResult};
use crate::json::parse_embedded;
use crate::nocode::{NoCodeBuilder, NoCodeModule};
use crate::provider::{ProviderSet, SEMANTIC_AI_MODULE};

pub const AI_GENERATED_CATEGORY: &str = "ai-generated";
pub const GENERATED_RENDER_SCHEME: &str = "generated";

/// Error recorded when a generation is dropped before it settles.
pub const GENERATION_CANCELLED: &str = "Generation cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Ui,
    Logic,
    Data,
    Event,
    Composite,
}

impl ModuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ui => "ui",
            Self::Logic => "logic",
            Self::Data => "data",
            Self::Event => "event",
            Self::Composite => "composite",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub semantic: ContextMap,
    pub behavior: ContextMap,
    pub user_intent: String,
}

impl GenerationContext {
    /// Prompt-safe rendering: sensitive entries are dropped and the rest
    /// sanitized.
    fn to_prompt(&self) -> String {
        let snippet = ContextSnapshot {
            semantic: self.semantic.clone(),
            behavior: self.behavior.clone(),
        }
        .to_prompt_snippet();
        let intent = sanitize_for_prompt(&self.user_intent, MAX_VALUE_LEN).unwrap_or_default();
        format!("{snippet}\nUser intent: {intent}")
    }
}

/// What to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSpec {
    pub prompt: String,
    pub context: GenerationContext,
    pub module_type: ModuleType,
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    /// Statuses only move forward: pending, generating, then completed or failed.
    pub fn can_become(self, next: GenerationStatus) -> bool {
        use GenerationStatus::*;
        matches!(
            (self, next),
            (Pending, Generating) | (Generating, Completed) | (Generating, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// One generation attempt and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub id: String,
    #[serde(flatten)]
    pub spec: GenerationSpec,
    pub status: GenerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<NoCodeModule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A module the provider proposes building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSuggestion {
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    #[serde(default)]
    pub suggestions: Vec<ModuleSuggestion>,
}

fn generation_prompt(spec: &GenerationSpec) -> String {
    format!(
        "{request}\n\n\
         Build a module for SOMA from these requirements.\n\n\
         Context:\n{context}\n\n\
         Module type: {kind}\n\
         Requirements: {requirements}\n\n\
         Reply with JSON only, with fields id, name, description, components, events, version.\n\
         Each component has type (ui, logic, data or event), name, properties and position.",
        request = spec.prompt.trim(),
        context = spec.context.to_prompt(),
        kind = spec.module_type.as_str(),
        requirements = spec.requirements.join(", "),
    )
}

fn analysis_prompt(context: &GenerationContext) -> String {
    format!(
        "Analyze this context and suggest modules to build.\n\n\
         Context:\n{context}\n\n\
         For each module give its type (ui, logic, data or event), name, description and requirements.\n\
         Reply with JSON only: {{\"suggestions\": [{{\"type\": \"ui\", \"name\": \"...\", \
         \"description\": \"...\", \"requirements\": [\"...\"]}}]}}",
        context = context.to_prompt(),
    )
}

/// Held while a generation runs. Dropping it decrements the in-flight count
/// and, if the request never settled because the caller's future was
/// dropped mid-call, marks it failed.
struct InFlight<'a> {
    orchestrator: &'a GenerationOrchestrator,
    id: &'a str,
}

impl<'a> InFlight<'a> {
    fn enter(orchestrator: &'a GenerationOrchestrator, id: &'a str) -> Self {
        orchestrator.in_flight.fetch_add(1, Ordering::AcqRel);
        Self { orchestrator, id }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.orchestrator.in_flight.fetch_sub(1, Ordering::AcqRel);
        let mut requests = self.orchestrator.lock();
        if let Some(request) = requests
            .iter_mut()
            .find(|r| r.id == self.id && r.status == GenerationStatus::Generating)
        {
            tracing::warn!(request = %self.id, "Generation dropped before it settled");
            request.status = GenerationStatus::Failed;
            request.error = Some(GENERATION_CANCELLED.to_string());
        }
    }
}

pub struct GenerationOrchestrator {
    bus: EventBus,
    registry: Arc<ModuleRegistry>,
    builder: Arc<NoCodeBuilder>,
    providers: Arc<ProviderSet>,
    context: Arc<ContextStore>,
    client: Arc<dyn CompletionClient>,
    requests: Mutex<Vec<GenerationRequest>>,
    in_flight: AtomicUsize,
}

impl GenerationOrchestrator {
    pub fn new(
        bus: EventBus,
        registry: Arc<ModuleRegistry>,
        builder: Arc<NoCodeBuilder>,
        providers: Arc<ProviderSet>,
        context: Arc<ContextStore>,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            bus,
            registry,
            builder,
            providers,
            context,
            client,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<GenerationRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.lock().clone()
    }

    pub fn request(&self, id: &str) -> Option<GenerationRequest> {
        self.lock().iter().find(|r| r.id == id).cloned()
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    pub fn providers(&self) -> &Arc<ProviderSet> {
        &self.providers
    }

    /// Move a request to `next`, applying `update` under the same lock.
    fn transition(
        &self,
        id: &str,
        next: GenerationStatus,
        update: impl FnOnce(&mut GenerationRequest),
    ) -> GenerationResult<GenerationRequest> {
        let mut requests = self.lock();
        let request = requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| GenerationError::UnknownRequest(id.to_string()))?;
        if !request.status.can_become(next) {
            return Err(GenerationError::InvalidTransition {
                id: id.to_string(),
                from: request.status,
                to: next,
            });
        }
        request.status = next;
        update(request);
        Ok(request.clone())
    }

    /// Generate a module from `spec`.
    ///
    /// Provider and parse failures end with the request marked failed and
    /// are reported through the returned record, not as `Err`.
    pub async fn generate_module(&self, spec: GenerationSpec) -> GenerationResult<GenerationRequest> {
        let provider = self
            .providers
            .active()
            .ok_or(GenerationError::NoActiveProvider)?;

        let id = format!("gen-{}", uuid::Uuid::new_v4().simple());
        let prompt = generation_prompt(&spec);
        self.lock().push(GenerationRequest {
            id: id.clone(),
            spec,
            status: GenerationStatus::Pending,
            result: None,
            error: None,
            timestamp: Utc::now(),
        });

        let _in_flight = InFlight::enter(self, &id);
        self.transition(&id, GenerationStatus::Generating, |_| {})?;
        tracing::info!(request = %id, provider = %provider.id, "Generating module");

        let outcome = match self
            .client
            .complete(&provider, &CompletionRequest::prompt(prompt))
            .await
        {
            Ok(reply) => parse_embedded::<NoCodeModule>(&reply).and_then(|module| {
                if module.id.trim().is_empty() || module.name.trim().is_empty() {
                    Err(GenerationError::Parse(
                        "Generated module needs an id and a name".to_string(),
                    ))
                } else {
                    Ok(module)
                }
            }),
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(mut module) => {
                for component in &mut module.components {
                    component.ensure_id();
                }
                let registered = self.registry.register(
                    module.to_manifest(AI_GENERATED_CATEGORY, GENERATED_RENDER_SCHEME),
                );
                self.builder.create_module(module.clone());
                let request = self.transition(&id, GenerationStatus::Completed, |r| {
                    r.result = Some(module.clone());
                })?;
                tracing::info!(request = %id, module = %module.id, registered, "Module generated");
                self.bus.publish(Event::new(EventPayload::ModuleInteraction(
                    ModuleInteractionEvent::new(SEMANTIC_AI_MODULE, "module-generated")
                        .with_detail(json!({ "generatedModule": &module })),
                )));
                Ok(request)
            }
            Err(e) => {
                tracing::warn!(request = %id, error = %e, "Module generation failed");
                self.transition(&id, GenerationStatus::Failed, |r| {
                    r.error = Some(e.to_string());
                })
            }
        }
    }

    /// Ask the active provider which modules would help in `context`.
    pub async fn analyze_context(
        &self,
        context: &GenerationContext,
    ) -> GenerationResult<ContextAnalysis> {
        let provider = self
            .providers
            .active()
            .ok_or(GenerationError::NoActiveProvider)?;
        let reply = self
            .client
            .complete(&provider, &CompletionRequest::prompt(analysis_prompt(context)))
            .await?;
        let analysis: ContextAnalysis = parse_embedded(&reply)?;
        tracing::debug!(suggestions = analysis.suggestions.len(), "Context analyzed");
        Ok(analysis)
    }

    /// Analyze the current context and generate every suggested module in
    /// order. Returns the finished requests.
    pub async fn auto_generate_from_context(&self) -> GenerationResult<Vec<GenerationRequest>> {
        let snapshot = self.context.snapshot();
        let context = GenerationContext {
            semantic: snapshot.semantic.clone(),
            behavior: snapshot.behavior.clone(),
            user_intent: snapshot
                .semantic
                .get_str(keys::USER_INTENT)
                .unwrap_or_default()
                .to_string(),
        };
        let analysis = self.analyze_context(&context).await?;

        let mut finished = Vec::with_capacity(analysis.suggestions.len());
        for suggestion in analysis.suggestions {
            let spec = GenerationSpec {
                prompt: format!("Build module: {}", suggestion.name),
                context: GenerationContext {
                    semantic: snapshot.semantic.clone(),
                    behavior: snapshot.behavior.clone(),
                    user_intent: suggestion.description,
                },
                module_type: suggestion.module_type,
                requirements: suggestion.requirements,
            };
            finished.push(self.generate_module(spec).await?);
        }
        Ok(finished)
    }
}
