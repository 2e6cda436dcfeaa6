//! Module producers.
//!
//! Two ways to get a module into the registry besides shipping a manifest:
//! - [`NoCodeBuilder`]: compose components from the palette and export.
//! - [`GenerationOrchestrator`]: ask a language-model provider to design one.

mod completion;
mod component;
mod error;
mod generation;
mod json;
mod nocode;
mod provider;

pub use completion::{
    complete_or_fallback, ChatTurn, CompletionClient, CompletionRequest, HttpCompletionClient,
    TurnRole, DEFAULT_COMPLETION_TIMEOUT, FALLBACK_RESPONSE,
};
pub use component::{
    palette, template, Component, ComponentKind, ComponentPatch, ComponentTemplate, Position,
};
pub use error::{
    BuilderError, BuilderResult, CompletionError, CompletionResult, GenerationError,
    GenerationResult,
};
pub use generation::{
    ContextAnalysis, GenerationContext, GenerationOrchestrator, GenerationRequest,
    GenerationSpec, GenerationStatus, ModuleSuggestion, ModuleType, AI_GENERATED_CATEGORY,
    GENERATION_CANCELLED, GENERATED_RENDER_SCHEME,
};
pub use json::{extract_json_object, parse_embedded};
pub use nocode::{
    ExportedModule, NoCodeBuilder, NoCodeModule, NO_CODE_BUILDER_MODULE, NO_CODE_CATEGORY,
};
pub use provider::{default_providers, Provider, ProviderKind, ProviderSet, SEMANTIC_AI_MODULE};
