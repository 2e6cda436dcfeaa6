//! Semantic layer modules.
//!
//! Both stores keep a view derived from the last semantic context they saw.
//! Once mounted they re-derive it on every `semantic-context-changed`.

mod chat;
mod triples;

pub use chat::{ChatFilter, ChatHistory, ChatMessage, ChatRole, CHAT_HISTORY_MODULE};
pub use triples::{map_natural_language, SemanticView, TripleQuery, TripleStore, SEMANTIC_MODULE};
