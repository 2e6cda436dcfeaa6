//! Bus-driven behavior of the tab manager.

use std::sync::Arc;

use soma_events::{
    keys, ContextMap, Event, EventBus, EventPayload, OpenTabEvent, RenderHandle,
};
use soma_registry::{ModuleManifest, ModuleRegistry};
use soma_tabs::{module_tab_id, TabManager};

struct Fixture {
    bus: EventBus,
    registry: Arc<ModuleRegistry>,
    tabs: Arc<TabManager>,
}

fn fixture() -> Fixture {
    let bus = EventBus::new();
    let registry = Arc::new(ModuleRegistry::new());
    let tabs = Arc::new(TabManager::new(bus.clone(), Arc::clone(&registry)));
    Fixture {
        bus,
        registry,
        tabs,
    }
}

fn semantic(focus: &str) -> Event {
    Event::new(EventPayload::SemanticContextChanged(
        ContextMap::new().with(keys::FOCUS_ENTITY, focus),
    ))
}

fn behavior(module: &str) -> Event {
    Event::new(EventPayload::BehaviorContextChanged(
        ContextMap::new().with(keys::ACTIVE_MODULE, module),
    ))
}

#[test]
fn test_open_tab_event_opens_and_activates() {
    let f = fixture();
    let _mount = f.tabs.mount();

    let event: Event = serde_json::from_str(
        r#"{"type": "open-tab", "payload": {"id": "t1", "title": "Demo"}}"#,
    )
    .unwrap();
    f.bus.publish(event);

    let tabs = f.tabs.tabs();
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].id, "t1");
    assert_eq!(f.tabs.active_tab_id().as_deref(), Some("t1"));
}

#[test]
fn test_duplicate_open_tab_event_keeps_one_tab() {
    let f = fixture();
    let _mount = f.tabs.mount();

    for title in ["Demo", "Demo again"] {
        f.bus
            .publish(Event::new(EventPayload::OpenTab(OpenTabEvent::new("t1", title))));
    }

    let tabs = f.tabs.tabs();
    assert_eq!(tabs.len(), 1);
    assert_eq!(tabs[0].title, "Demo");
}

#[test]
fn test_behavior_context_opens_module_tab() {
    let f = fixture();
    let _mount = f.tabs.mount();
    f.registry.register(
        ModuleManifest::new("chat-history", "Chat History")
            .with_render(RenderHandle::scoped("builtin", "chat-history")),
    );

    f.bus.publish(behavior("chat-history"));

    let tab = f.tabs.active_tab().unwrap();
    assert_eq!(tab.id, module_tab_id("chat-history"));
    assert_eq!(tab.title, "Chat History");
    assert_eq!(tab.render.unwrap().as_str(), "builtin:chat-history");
}

#[test]
fn test_semantic_focus_refocuses_existing_module_tab() {
    let f = fixture();
    let _mount = f.tabs.mount();
    f.registry.register(ModuleManifest::new("a", "A"));
    f.registry.register(ModuleManifest::new("b", "B"));

    f.bus.publish(semantic("a"));
    f.bus.publish(semantic("b"));
    f.bus.publish(semantic("a"));

    assert_eq!(f.tabs.len(), 2);
    assert_eq!(f.tabs.active_tab_id().as_deref(), Some("mod-a"));
}

#[test]
fn test_unregistered_module_is_ignored_until_retriggered() {
    let f = fixture();
    let _mount = f.tabs.mount();

    f.bus.publish(behavior("late"));
    assert!(f.tabs.is_empty());

    f.registry.register(ModuleManifest::new("late", "Late"));
    assert!(f.tabs.is_empty());

    f.bus.publish(behavior("late"));
    assert_eq!(f.tabs.active_tab_id().as_deref(), Some("mod-late"));
}

#[test]
fn test_dropping_mount_stops_auto_open() {
    let f = fixture();
    let mount = f.tabs.mount();
    mount.unmount();

    f.bus
        .publish(Event::new(EventPayload::OpenTab(OpenTabEvent::new("t1", "Demo"))));
    assert!(f.tabs.is_empty());
}

#[test]
fn test_reconcile_closes_tabs_of_removed_modules() {
    let f = fixture();
    f.registry.register(ModuleManifest::new("keep", "Keep"));
    f.registry.register(ModuleManifest::new("drop", "Drop"));
    f.tabs.focus_module("keep");
    f.tabs.focus_module("drop");
    f.tabs
        .open_tab(soma_tabs::Tab::new("scratch", "Scratch"));

    f.registry.unregister("drop");
    let closed = f.tabs.reconcile();

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].id, "mod-drop");
    let ids: Vec<String> = f.tabs.tabs().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, ["mod-keep", "scratch"]);
    assert_eq!(f.tabs.active_tab_id().as_deref(), Some("scratch"));
}
