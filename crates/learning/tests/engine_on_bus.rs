//! Learning engine and loggers wired to a live bus.

use std::sync::Arc;
use std::time::Duration;

use soma_context::ContextStore;
use soma_events::{
    keys, ContextMap, Event, EventBus, EventKind, EventPayload, EventRecorder,
    ModuleInteractionEvent,
};
use soma_learning::{
    EventLogger, InsightAction, IntervalTask, LearningConfig, LearningEngine,
};

fn interaction() -> Event {
    Event::new(EventPayload::ModuleInteraction(ModuleInteractionEvent::new(
        "chat-history",
        "new-message",
    )))
}

#[test]
fn test_six_published_interactions_make_one_pattern() {
    let bus = EventBus::new();
    let context = Arc::new(ContextStore::new(bus.clone()));
    let engine = Arc::new(LearningEngine::new(
        bus.clone(),
        context,
        LearningConfig::default(),
    ));
    let _mount = engine.mount();

    for _ in 0..6 {
        bus.publish(interaction());
    }

    let patterns = engine.patterns();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern, "chat-history-new-message");
    assert_eq!(patterns[0].frequency, 6);
}

#[test]
fn test_context_change_feeds_behavior_pattern_and_logger() {
    let bus = EventBus::new();
    let context = Arc::new(ContextStore::new(bus.clone()));
    let engine = Arc::new(LearningEngine::new(
        bus.clone(),
        Arc::clone(&context),
        LearningConfig::default(),
    ));
    let behavior_log = Arc::new(EventLogger::behavior(10));
    let _mounts = (engine.mount(), behavior_log.mount(&bus));

    context.set_semantic_context(ContextMap::new().with(keys::FOCUS_ENTITY, "X"));
    context.set_behavior_context(ContextMap::new().with(keys::ACTIVE_MODULE, "notes"));

    assert!(engine.pattern("context-notes").is_some());
    // The behavior logger records semantic changes but not behavior changes.
    assert_eq!(behavior_log.len(), 1);
    assert_eq!(
        behavior_log.latest().unwrap().kind(),
        EventKind::SemanticContextChanged
    );
}

#[test]
fn test_applying_adapt_context_feeds_back_into_patterns() {
    let bus = EventBus::new();
    let context = Arc::new(ContextStore::new(bus.clone()));
    let engine = Arc::new(LearningEngine::new(
        bus.clone(),
        Arc::clone(&context),
        LearningConfig::default(),
    ));
    let _mount = engine.mount();
    let recorder = EventRecorder::attach(&bus, &[EventKind::BehaviorContextChanged]);

    context.set_behavior_context(ContextMap::new());
    engine.analyze();
    let insight = engine
        .insights()
        .into_iter()
        .find(|i| i.action == Some(InsightAction::AdaptContext))
        .unwrap();

    engine.apply_optimization(&insight.id);

    assert_eq!(recorder.len(), 2);
    assert_eq!(engine.pattern("context-general").unwrap().frequency, 2);
    assert!(engine.insights().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_periodic_analysis_publishes_completion() {
    let bus = EventBus::new();
    let context = Arc::new(ContextStore::new(bus.clone()));
    let engine = Arc::new(LearningEngine::new(
        bus.clone(),
        context,
        LearningConfig::default(),
    ));
    let recorder = EventRecorder::attach(&bus, &[EventKind::LearningAnalysisComplete]);

    let timer = IntervalTask::new("analysis");
    let weak = Arc::downgrade(&engine);
    timer.start(Duration::from_secs(30), move || {
        if let Some(engine) = weak.upgrade() {
            engine.analyze();
        }
    });

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(recorder.len(), 2);

    drop(timer);
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(recorder.len(), 2);
}
