use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use soma_events::{
    handler, keys, ContextMap, Event, EventBus, EventKind, EventPayload, Mount, OpenTabEvent,
    RenderHandle, TabActivatedEvent,
};
use soma_registry::{ModuleManifest, ModuleRegistry};
use tracing::{debug, info};

/// Id prefix of tabs bound to a registered module.
pub const MODULE_TAB_PREFIX: &str = "mod-";

/// Tab id for a module: `mod-<moduleId>`.
pub fn module_tab_id(module_id: &str) -> String {
    format!("{MODULE_TAB_PREFIX}{module_id}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Tab {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            render: None,
            icon: None,
        }
    }

    /// The tab a module is displayed in.
    pub fn for_module(manifest: &ModuleManifest) -> Self {
        Self {
            id: module_tab_id(&manifest.id),
            title: manifest.name.clone(),
            render: manifest.render.clone(),
            icon: manifest.icon.clone(),
        }
    }

    /// Module id if this is a module-bound tab.
    pub fn module_id(&self) -> Option<&str> {
        self.id.strip_prefix(MODULE_TAB_PREFIX)
    }
}

impl From<OpenTabEvent> for Tab {
    fn from(event: OpenTabEvent) -> Self {
        Self {
            id: event.id,
            title: event.title,
            render: event.render,
            icon: event.icon,
        }
    }
}

#[derive(Default)]
struct TabState {
    tabs: Vec<Tab>,
    active: Option<String>,
}

impl TabState {
    fn find(&self, id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }
}

/// Ordered tab collection with a single optional active tab.
///
/// Publishes `tab-activated` whenever the active id changes to an open tab.
/// State is never locked while publishing.
pub struct TabManager {
    bus: EventBus,
    registry: Arc<ModuleRegistry>,
    state: Mutex<TabState>,
}

impl TabManager {
    pub fn new(bus: EventBus, registry: Arc<ModuleRegistry>) -> Self {
        Self {
            bus,
            registry,
            state: Mutex::new(TabState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TabState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, tab: Option<(String, String)>) {
        if let Some((id, title)) = tab {
            debug!(tab = %id, "Tab activated");
            self.bus
                .publish(Event::new(EventPayload::TabActivated(TabActivatedEvent::new(
                    id,
                    Some(title),
                ))));
        }
    }

    /// Append `tab` and make it active.
    ///
    /// If a tab with the same id is already open nothing changes, not even
    /// the focus, and `false` is returned.
    pub fn open_tab(&self, tab: Tab) -> bool {
        let activated = {
            let mut state = self.lock();
            if state.find(&tab.id).is_some() {
                debug!(tab = %tab.id, "Tab already open");
                return false;
            }
            let activated = (tab.id.clone(), tab.title.clone());
            state.active = Some(tab.id.clone());
            state.tabs.push(tab);
            activated
        };
        info!(tab = %activated.0, "Tab opened");
        self.announce(Some(activated));
        true
    }

    /// Remove a tab. If it was active, the last remaining tab becomes
    /// active, or nothing if the set is now empty.
    pub fn close_tab(&self, id: &str) -> Option<Tab> {
        let (removed, activated) = {
            let mut state = self.lock();
            let index = state.tabs.iter().position(|t| t.id == id)?;
            let removed = state.tabs.remove(index);
            let mut activated = None;
            if state.active.as_deref() == Some(id) {
                state.active = state.tabs.last().map(|t| t.id.clone());
                activated = state.tabs.last().map(|t| (t.id.clone(), t.title.clone()));
            }
            (removed, activated)
        };
        info!(tab = %id, "Tab closed");
        self.announce(activated);
        Some(removed)
    }

    /// Set the active id unconditionally, even if no such tab is open.
    pub fn set_active_tab(&self, id: &str) {
        let activated = {
            let mut state = self.lock();
            if state.active.as_deref() == Some(id) {
                return;
            }
            state.active = Some(id.to_string());
            state.find(id).map(|t| (t.id.clone(), t.title.clone()))
        };
        if activated.is_none() {
            debug!(tab = %id, "Active tab id has no open tab");
        }
        self.announce(activated);
    }

    /// Snapshot in display order.
    pub fn tabs(&self) -> Vec<Tab> {
        self.lock().tabs.clone()
    }

    pub fn active_tab_id(&self) -> Option<String> {
        self.lock().active.clone()
    }

    /// The active tab, or `None` if the active id does not match an open tab.
    pub fn active_tab(&self) -> Option<Tab> {
        let state = self.lock();
        state.active.as_deref().and_then(|id| state.find(id)).cloned()
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.lock().find(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tabs.is_empty()
    }

    /// Open (if needed) and activate the tab of a registered module.
    ///
    /// The registry is read now. An unknown module is ignored and `false`
    /// returned; a later call can succeed once it is registered.
    pub fn focus_module(&self, module_id: &str) -> bool {
        let Some(manifest) = self.registry.get(module_id) else {
            debug!(module = %module_id, "No registered module to focus");
            return false;
        };
        let tab = Tab::for_module(&manifest);
        let id = tab.id.clone();
        if !self.open_tab(tab) {
            self.set_active_tab(&id);
        }
        true
    }

    /// Close module tabs whose module is no longer registered.
    pub fn reconcile(&self) -> Vec<Tab> {
        let stale: Vec<String> = self
            .lock()
            .tabs
            .iter()
            .filter(|t| t.module_id().is_some_and(|m| !self.registry.contains(m)))
            .map(|t| t.id.clone())
            .collect();

        let closed: Vec<Tab> = stale.iter().filter_map(|id| self.close_tab(id)).collect();
        if !closed.is_empty() {
            info!(count = closed.len(), "Closed tabs of unregistered modules");
        }
        closed
    }

    fn focus_from_context(&self, ctx: &ContextMap, key: &str) {
        if let Some(module_id) = ctx.get_str(key) {
            self.focus_module(module_id);
        }
    }

    /// Subscribe to `open-tab` and both context-changed events.
    pub fn mount(self: &Arc<Self>) -> Mount {
        let mut mount = Mount::new("tabs");
        let weak: Weak<Self> = Arc::downgrade(self);

        let h = handler(move |event: &Event| {
            let Some(manager) = weak.upgrade() else {
                return;
            };
            match event.payload() {
                EventPayload::OpenTab(request) => {
                    manager.open_tab(Tab::from(request.clone()));
                }
                EventPayload::SemanticContextChanged(ctx) => {
                    manager.focus_from_context(ctx, keys::FOCUS_ENTITY);
                }
                EventPayload::BehaviorContextChanged(ctx) => {
                    manager.focus_from_context(ctx, keys::ACTIVE_MODULE);
                }
                _ => {}
            }
        });
        mount.subscribe_all(
            &self.bus,
            &[
                EventKind::OpenTab,
                EventKind::SemanticContextChanged,
                EventKind::BehaviorContextChanged,
            ],
            &h,
        );
        mount
    }
}
