//! Error types for the builder and generation layers.

use thiserror::Error;

use crate::generation::GenerationStatus;

pub type BuilderResult<T> = Result<T, BuilderError>;
pub type CompletionResult<T> = Result<T, CompletionError>;
pub type GenerationResult<T> = Result<T, GenerationError>;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("No module is being built")]
    NoCurrentModule,
}

/// Failures talking to a chat-completion endpoint.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Provider '{provider}' has no completion endpoint")]
    NoEndpoint { provider: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Completion request failed: {0}")]
    Request(String),

    #[error("Completion endpoint returned {status}")]
    Status { status: u16 },

    #[error("Completion response has neither 'response' nor 'content'")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No active AI provider")]
    NoActiveProvider,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// Reply contained no JSON object, or it did not have the expected shape.
    #[error("Failed to parse AI response: {0}")]
    Parse(String),

    #[error("Unknown generation request '{0}'")]
    UnknownRequest(String),

    #[error("Generation request '{id}' cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: GenerationStatus,
        to: GenerationStatus,
    },
}
