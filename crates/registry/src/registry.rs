//! In-memory module registry.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::manifest::ModuleManifest;

/// Category filter for [`ModuleRegistry::search`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Category(String),
}

impl CategoryFilter {
    /// `"all"` (any case) or an empty string means no filter.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Category(value.to_string())
        }
    }

    fn accepts(&self, manifest: &ModuleManifest) -> bool {
        match self {
            Self::All => true,
            Self::Category(c) => manifest.category.as_deref() == Some(c.as_str()),
        }
    }
}

/// Ordered set of module manifests keyed by id.
///
/// Registration is first-write-wins: re-registering an id does not update
/// the stored manifest. Removing a module does not touch any tab bound to
/// it; the tab manager reconciles that separately.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Mutex<Vec<ModuleManifest>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ModuleManifest>> {
        self.modules.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `manifest` unless its id is already registered.
    ///
    /// Returns whether it was inserted.
    pub fn register(&self, manifest: ModuleManifest) -> bool {
        let mut modules = self.lock();
        if modules.iter().any(|m| m.id == manifest.id) {
            debug!(module = %manifest.id, "Module already registered, keeping existing entry");
            return false;
        }
        info!(
            module = %manifest.id,
            category = manifest.category.as_deref().unwrap_or(""),
            "Module registered"
        );
        modules.push(manifest);
        true
    }

    pub fn unregister(&self, id: &str) -> Option<ModuleManifest> {
        let mut modules = self.lock();
        let index = modules.iter().position(|m| m.id == id)?;
        info!(module = %id, "Module unregistered");
        Some(modules.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<ModuleManifest> {
        self.lock().iter().find(|m| m.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().iter().any(|m| m.id == id)
    }

    /// Snapshot in registration order.
    pub fn modules(&self) -> Vec<ModuleManifest> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Distinct non-empty categories, in order of first appearance.
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = Vec::new();
        for manifest in self.lock().iter() {
            if let Some(category) = manifest.category.as_deref().filter(|c| !c.is_empty()) {
                if !categories.iter().any(|c| c == category) {
                    categories.push(category.to_string());
                }
            }
        }
        categories
    }

    /// Case-insensitive search on name or description, filtered by category.
    /// An empty query matches every module.
    pub fn search(&self, query: &str, category: &CategoryFilter) -> Vec<ModuleManifest> {
        let needle = query.trim().to_lowercase();
        self.lock()
            .iter()
            .filter(|m| category.accepts(m))
            .filter(|m| needle.is_empty() || m.matches_lowercase(&needle))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field(
                "modules",
                &self.lock().iter().map(|m| m.id.clone()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModuleRegistry {
        let registry = ModuleRegistry::new();
        registry.register(
            ModuleManifest::new("chat-history", "Chat History")
                .with_description("Browse past conversations")
                .with_category("core"),
        );
        registry.register(
            ModuleManifest::new("semantic-layer", "Semantic Layer")
                .with_description("Ontology triples")
                .with_category("ai"),
        );
        registry.register(
            ModuleManifest::new("semantic-ai", "Semantic AI")
                .with_description("Generate modules from CHAT context")
                .with_category("ai"),
        );
        registry.register(ModuleManifest::new("scratch", "Scratch"));
        registry
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = ModuleRegistry::new();
        assert!(registry.register(ModuleManifest::new("m", "Original")));
        assert!(!registry.register(ModuleManifest::new("m", "Replacement")));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("m").unwrap().name, "Original");
    }

    #[test]
    fn test_unregister() {
        let registry = sample();
        let removed = registry.unregister("semantic-layer").unwrap();
        assert_eq!(removed.name, "Semantic Layer");
        assert!(!registry.contains("semantic-layer"));
        assert!(registry.unregister("semantic-layer").is_none());
    }

    #[test]
    fn test_reregister_after_unregister_takes_new_metadata() {
        let registry = ModuleRegistry::new();
        registry.register(ModuleManifest::new("m", "Old"));
        registry.unregister("m");
        registry.register(ModuleManifest::new("m", "New"));
        assert_eq!(registry.get("m").unwrap().name, "New");
    }

    #[test]
    fn test_modules_keep_insertion_order() {
        let ids: Vec<String> = sample().modules().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, ["chat-history", "semantic-layer", "semantic-ai", "scratch"]);
    }

    #[test]
    fn test_categories_in_first_appearance_order() {
        assert_eq!(sample().categories(), ["core", "ai"]);
    }

    #[test]
    fn test_search_matches_name_or_description() {
        let registry = sample();
        let hits: Vec<String> = registry
            .search("chat", &CategoryFilter::All)
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(hits, ["chat-history", "semantic-ai"]);
    }

    #[test]
    fn test_search_with_category() {
        let registry = sample();
        let hits = registry.search("chat", &CategoryFilter::parse("ai"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "semantic-ai");

        assert_eq!(registry.search("", &CategoryFilter::parse("ALL")).len(), 4);
        assert!(registry.search("", &CategoryFilter::parse("tools")).is_empty());
    }
}
