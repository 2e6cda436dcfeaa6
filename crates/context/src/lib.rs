//! Shared context for SOMA modules.
//!
//! Two independent key-value maps:
//! - Semantic context: what the user is doing (`focusEntity`, `currentTask`,
//!   `userIntent`)
//! - Behavior context: how they are interacting (`activeModule`,
//!   `activeTab`, `lastAction`)
//!
//! Readers do not query the store for derived views. They subscribe to the
//! `*-context-changed` events and recompute from the published snapshot.

pub mod limits;
mod state;
mod store;

pub use state::ContextSnapshot;
pub use store::ContextStore;
