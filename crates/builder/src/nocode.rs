//! Interactive module composition.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::json;
use soma_events::{Event, EventBus, EventPayload, ModuleInteractionEvent, RenderHandle};
use soma_registry::{ModuleManifest, ModuleRegistry};

use crate::component::{Component, ComponentPatch};
use crate::error::{BuilderError, BuilderResult};

/// Module id used in the interactions the builder publishes.
pub const NO_CODE_BUILDER_MODULE: &str = "no-code-builder";

/// Category given to exported modules.
pub const NO_CODE_CATEGORY: &str = "no-code";

/// Render scheme of exported modules.
pub const NO_CODE_RENDER_SCHEME: &str = "nocode";

/// A module as the builder sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoCodeModule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl NoCodeModule {
    /// Empty module with a fresh `nocode-` id. Blank name and description
    /// fall back to stock text.
    pub fn new(name: &str, description: &str) -> Self {
        let name = name.trim();
        let description = description.trim();
        Self {
            id: format!("nocode-{}", uuid::Uuid::new_v4().simple()),
            name: if name.is_empty() { "New Module" } else { name }.to_string(),
            description: if description.is_empty() {
                "Created with No-Code Builder"
            } else {
                description
            }
            .to_string(),
            components: Vec::new(),
            events: Vec::new(),
            version: default_version(),
        }
    }

    /// Registry manifest for this module.
    pub fn to_manifest(&self, category: &str, render_scheme: &str) -> ModuleManifest {
        let mut manifest = ModuleManifest::new(&self.id, &self.name)
            .with_category(category)
            .with_version(&self.version)
            .with_render(RenderHandle::scoped(render_scheme, &self.id));
        if !self.description.is_empty() {
            manifest = manifest.with_description(&self.description);
        }
        manifest
    }
}

/// Result of [`NoCodeBuilder::export_module`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedModule {
    pub module: NoCodeModule,
    pub manifest: ModuleManifest,
    /// False when a module with the same id was already registered.
    pub registered: bool,
}

#[derive(Default)]
struct BuilderState {
    current: Option<NoCodeModule>,
    components: Vec<Component>,
    selected: Option<String>,
}

pub struct NoCodeBuilder {
    bus: EventBus,
    registry: Arc<ModuleRegistry>,
    state: Mutex<BuilderState>,
}

impl NoCodeBuilder {
    pub fn new(bus: EventBus, registry: Arc<ModuleRegistry>) -> Self {
        Self {
            bus,
            registry,
            state: Mutex::new(BuilderState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_interaction(&self, action: &str, detail: serde_json::Value) {
        self.bus.publish(Event::new(EventPayload::ModuleInteraction(
            ModuleInteractionEvent::new(NO_CODE_BUILDER_MODULE, action).with_detail(detail),
        )));
    }

    /// Start editing `module`. Its components replace the canvas.
    pub fn create_module(&self, module: NoCodeModule) {
        tracing::debug!(module = %module.id, components = module.components.len(), "Builder module created");
        let mut state = self.lock();
        state.components = module.components.clone();
        state.selected = None;
        state.current = Some(module);
    }

    pub fn add_component(&self, component: Component) {
        let detail = json!({ "component": &component });
        self.lock().components.push(component);
        self.publish_interaction("component-added", detail);
    }

    /// Returns the updated component, or `None` for an unknown id.
    pub fn update_component(&self, id: &str, patch: ComponentPatch) -> Option<Component> {
        let mut state = self.lock();
        let component = state.components.iter_mut().find(|c| c.id == id)?;
        component.apply(patch);
        Some(component.clone())
    }

    pub fn remove_component(&self, id: &str) -> Option<Component> {
        let mut state = self.lock();
        let index = state.components.iter().position(|c| c.id == id)?;
        if state.selected.as_deref() == Some(id) {
            state.selected = None;
        }
        Some(state.components.remove(index))
    }

    /// Select a component by id, or clear the selection with `None`.
    pub fn select_component(&self, id: Option<&str>) {
        self.lock().selected = id.map(str::to_string);
    }

    pub fn current_module(&self) -> Option<NoCodeModule> {
        self.lock().current.clone()
    }

    pub fn components(&self) -> Vec<Component> {
        self.lock().components.clone()
    }

    pub fn selected_component(&self) -> Option<String> {
        self.lock().selected.clone()
    }

    /// Package the current module with the canvas components, register it
    /// and publish `module-exported`.
    pub fn export_module(&self) -> BuilderResult<ExportedModule> {
        let module = {
            let state = self.lock();
            let mut module = state.current.clone().ok_or(BuilderError::NoCurrentModule)?;
            module.components = state.components.clone();
            module
        };

        let manifest = module.to_manifest(NO_CODE_CATEGORY, NO_CODE_RENDER_SCHEME);
        let registered = self.registry.register(manifest.clone());
        tracing::info!(module = %module.id, registered, "Module exported");

        self.publish_interaction("module-exported", json!({ "exportedModule": &module }));
        Ok(ExportedModule {
            module,
            manifest,
            registered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{template, Position};
    use soma_events::{EventKind, EventRecorder};

    fn builder() -> (NoCodeBuilder, Arc<ModuleRegistry>, EventRecorder) {
        let bus = EventBus::new();
        let registry = Arc::new(ModuleRegistry::new());
        let recorder = EventRecorder::attach(&bus, &[EventKind::ModuleInteraction]);
        (NoCodeBuilder::new(bus, Arc::clone(&registry)), registry, recorder)
    }

    fn actions(recorder: &EventRecorder) -> Vec<String> {
        recorder
            .events()
            .iter()
            .filter_map(|e| match e.payload() {
                EventPayload::ModuleInteraction(i) => Some(i.action.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_module_defaults() {
        let module = NoCodeModule::new(" ", "");
        assert_eq!(module.name, "New Module");
        assert_eq!(module.description, "Created with No-Code Builder");
        assert!(module.id.starts_with("nocode-"));
        assert_eq!(module.version, "1.0.0");
    }

    #[test]
    fn test_export_without_module_fails() {
        let (builder, registry, recorder) = builder();
        assert!(matches!(
            builder.export_module(),
            Err(BuilderError::NoCurrentModule)
        ));
        assert!(registry.is_empty());
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_export_registers_manifest() {
        let (builder, registry, recorder) = builder();
        builder.create_module(NoCodeModule::new("Weather", "Shows the forecast"));
        builder.add_component(template("Text Display").unwrap().instantiate(Position::default()));

        let exported = builder.export_module().unwrap();

        assert!(exported.registered);
        assert_eq!(exported.module.components.len(), 1);
        let manifest = registry.get(&exported.module.id).unwrap();
        assert_eq!(manifest.category.as_deref(), Some("no-code"));
        assert_eq!(
            manifest.render.unwrap().as_str(),
            format!("nocode:{}", exported.module.id)
        );
        assert_eq!(actions(&recorder), ["component-added", "module-exported"]);
    }

    #[test]
    fn test_second_export_keeps_first_registration() {
        let (builder, registry, _recorder) = builder();
        builder.create_module(NoCodeModule::new("Weather", ""));
        assert!(builder.export_module().unwrap().registered);
        assert!(!builder.export_module().unwrap().registered);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_selected_clears_selection() {
        let (builder, _registry, _recorder) = builder();
        let button = template("Button").unwrap().instantiate(Position::default());
        let label = template("Text Display").unwrap().instantiate(Position::default());
        builder.add_component(button.clone());
        builder.add_component(label.clone());

        builder.select_component(Some(&label.id));
        builder.remove_component(&button.id);
        assert_eq!(builder.selected_component(), Some(label.id.clone()));

        builder.remove_component(&label.id);
        assert_eq!(builder.selected_component(), None);
        assert!(builder.components().is_empty());
        assert!(builder.remove_component("missing").is_none());
    }

    #[test]
    fn test_update_component() {
        let (builder, _registry, _recorder) = builder();
        let button = template("Button").unwrap().instantiate(Position::default());
        builder.add_component(button.clone());

        let updated = builder
            .update_component(
                &button.id,
                ComponentPatch {
                    position: Some(Position::new(10.0, 20.0)),
                    ..ComponentPatch::default()
                },
            )
            .unwrap();

        assert_eq!(updated.position, Position::new(10.0, 20.0));
        assert_eq!(updated.name, "Button");
        assert_eq!(builder.components()[0], updated);
        assert!(builder
            .update_component("missing", ComponentPatch::default())
            .is_none());
    }
}
