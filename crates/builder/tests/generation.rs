//! Generation against a scripted completion client.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use soma_builder::{
    CompletionClient, CompletionError, CompletionRequest, CompletionResult, GenerationContext,
    GenerationError, GenerationOrchestrator, GenerationSpec, GenerationStatus, ModuleType,
    NoCodeBuilder, Provider, ProviderSet, GENERATION_CANCELLED,
};
use soma_context::ContextStore;
use soma_events::{keys, ContextMap, EventBus, EventKind, EventPayload, EventRecorder};
use soma_registry::ModuleRegistry;

/// Replays canned replies. While a call is in flight it records the status
/// of every request the orchestrator holds.
#[derive(Default)]
struct ScriptedClient {
    replies: Mutex<VecDeque<CompletionResult<String>>>,
    prompts: Mutex<Vec<String>>,
    orchestrator: OnceLock<Weak<GenerationOrchestrator>>,
    seen: Mutex<Vec<Vec<GenerationStatus>>>,
    stall: bool,
}

impl ScriptedClient {
    fn new(replies: Vec<CompletionResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        }
    }

    /// Never answers.
    fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Request statuses observed during each call.
    fn seen(&self) -> Vec<Vec<GenerationStatus>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        _provider: &Provider,
        request: &CompletionRequest,
    ) -> CompletionResult<String> {
        self.prompts.lock().unwrap().push(request.text().to_string());
        if let Some(orchestrator) = self.orchestrator.get().and_then(Weak::upgrade) {
            let statuses = orchestrator.requests().iter().map(|r| r.status).collect();
            self.seen.lock().unwrap().push(statuses);
        }
        if self.stall {
            return std::future::pending().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CompletionError::EmptyResponse))
    }
}

struct Harness {
    bus: EventBus,
    registry: Arc<ModuleRegistry>,
    builder: Arc<NoCodeBuilder>,
    providers: Arc<ProviderSet>,
    context: Arc<ContextStore>,
    client: Arc<ScriptedClient>,
    orchestrator: Arc<GenerationOrchestrator>,
}

fn harness(replies: Vec<CompletionResult<String>>) -> Harness {
    harness_with(ScriptedClient::new(replies))
}

fn harness_with(client: ScriptedClient) -> Harness {
    let bus = EventBus::new();
    let registry = Arc::new(ModuleRegistry::new());
    let builder = Arc::new(NoCodeBuilder::new(bus.clone(), Arc::clone(&registry)));
    let providers = Arc::new(ProviderSet::new(bus.clone()));
    let context = Arc::new(ContextStore::new(bus.clone()));
    let client = Arc::new(client);
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        bus.clone(),
        Arc::clone(&registry),
        Arc::clone(&builder),
        Arc::clone(&providers),
        Arc::clone(&context),
        client.clone(),
    ));
    let _ = client.orchestrator.set(Arc::downgrade(&orchestrator));
    Harness {
        bus,
        registry,
        builder,
        providers,
        context,
        client,
        orchestrator,
    }
}

fn spec(name: &str) -> GenerationSpec {
    GenerationSpec {
        prompt: format!("Build module: {name}"),
        context: GenerationContext::default(),
        module_type: ModuleType::Ui,
        requirements: vec!["simple".to_string()],
    }
}

const TIMER_REPLY: &str = r#"Here you go:
{"id": "timer", "name": "Timer", "description": "Counts down",
 "components": [{"type": "ui", "name": "Display", "properties": {"text": "00:00"}}],
 "events": ["tick"], "version": "0.1.0"}"#;

#[tokio::test]
async fn test_successful_generation() {
    let h = harness(vec![Ok(TIMER_REPLY.to_string())]);
    let recorder = EventRecorder::attach(&h.bus, &[EventKind::ModuleInteraction]);

    let request = h.orchestrator.generate_module(spec("Timer")).await.unwrap();

    assert_eq!(request.status, GenerationStatus::Completed);
    assert_eq!(h.client.seen(), [[GenerationStatus::Generating]]);
    assert!(request.error.is_none());
    let module = request.result.unwrap();
    assert_eq!(module.id, "timer");
    assert!(!module.components[0].id.is_empty());

    let manifest = h.registry.get("timer").unwrap();
    assert_eq!(manifest.category.as_deref(), Some("ai-generated"));
    assert_eq!(manifest.render.unwrap().as_str(), "generated:timer");
    assert_eq!(h.builder.current_module().unwrap().id, "timer");
    assert_eq!(h.builder.components().len(), 1);
    assert!(!h.orchestrator.is_generating());

    match recorder.last().unwrap().payload() {
        EventPayload::ModuleInteraction(i) => {
            assert_eq!(i.module, "semantic-ai");
            assert_eq!(i.action, "module-generated");
            assert_eq!(i.detail.as_ref().unwrap()["generatedModule"]["id"], "timer");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_reply_marks_request_failed() {
    let h = harness(vec![Ok("I cannot do that".to_string())]);
    let recorder = EventRecorder::attach(&h.bus, &[EventKind::ModuleInteraction]);

    let request = h.orchestrator.generate_module(spec("Timer")).await.unwrap();

    assert_eq!(request.status, GenerationStatus::Failed);
    assert_eq!(h.client.seen(), [[GenerationStatus::Generating]]);
    assert!(request.error.unwrap().contains("No JSON found"));
    assert!(request.result.is_none());
    assert!(h.registry.is_empty());
    assert!(h.builder.current_module().is_none());
    assert!(recorder.is_empty());
}

#[tokio::test]
async fn test_module_without_name_fails() {
    let h = harness(vec![Ok(r#"{"id": "x", "name": ""}"#.to_string())]);
    let request = h.orchestrator.generate_module(spec("X")).await.unwrap();
    assert_eq!(request.status, GenerationStatus::Failed);
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_transport_error_marks_request_failed() {
    let h = harness(vec![Err(CompletionError::Status { status: 500 })]);

    let request = h.orchestrator.generate_module(spec("Timer")).await.unwrap();

    assert_eq!(request.status, GenerationStatus::Failed);
    assert_eq!(request.error.as_deref(), Some("Completion endpoint returned 500"));
    assert_eq!(h.orchestrator.requests().len(), 1);
}

#[tokio::test]
async fn test_dropped_generation_is_marked_failed() {
    let h = harness_with(ScriptedClient::stalled());

    let outcome = tokio::time::timeout(
        Duration::from_millis(10),
        h.orchestrator.generate_module(spec("Timer")),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(h.client.seen(), [[GenerationStatus::Generating]]);
    let requests = h.orchestrator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, GenerationStatus::Failed);
    assert_eq!(requests[0].error.as_deref(), Some(GENERATION_CANCELLED));
    assert!(!h.orchestrator.is_generating());
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_sensitive_context_never_reaches_the_provider() {
    let h = harness(vec![Ok(TIMER_REPLY.to_string())]);
    let mut request = spec("Timer");
    request.context = GenerationContext {
        semantic: ContextMap::new()
            .with("note", "password=hunter2 <script>")
            .with(keys::FOCUS_ENTITY, "kitchen <b>"),
        behavior: ContextMap::new(),
        user_intent: "time the pasta".to_string(),
    };

    h.orchestrator.generate_module(request).await.unwrap();

    let prompt = h.client.prompts().remove(0);
    assert!(!prompt.contains("hunter2"), "{prompt}");
    assert!(!prompt.contains('<'), "{prompt}");
    assert!(prompt.contains("focusEntity: kitchen ‹b›"), "{prompt}");
    assert!(prompt.contains("User intent: time the pasta"), "{prompt}");
}

#[tokio::test]
async fn test_no_active_provider_records_nothing() {
    let h = harness(vec![Ok(TIMER_REPLY.to_string())]);
    h.providers.remove("groq-default");

    let err = h.orchestrator.generate_module(spec("Timer")).await.unwrap_err();

    assert!(matches!(err, GenerationError::NoActiveProvider));
    assert!(h.orchestrator.requests().is_empty());
    assert!(h.client.prompts().is_empty());
}

#[tokio::test]
async fn test_auto_generate_runs_each_suggestion_in_order() {
    let analysis = r#"{"suggestions": [
        {"type": "ui", "name": "Recipe Card", "description": "show a recipe", "requirements": ["image"]},
        {"type": "logic", "name": "Timer", "description": "time steps", "requirements": []}
    ]}"#;
    let h = harness(vec![
        Ok(analysis.to_string()),
        Ok(r#"{"id": "recipe-card", "name": "Recipe Card"}"#.to_string()),
        Ok("garbage".to_string()),
    ]);
    h.context.set_semantic_context(
        ContextMap::new()
            .with(keys::FOCUS_ENTITY, "cooking")
            .with(keys::USER_INTENT, "make dinner"),
    );

    let finished = h.orchestrator.auto_generate_from_context().await.unwrap();

    let statuses: Vec<_> = finished.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [GenerationStatus::Completed, GenerationStatus::Failed]
    );
    assert_eq!(finished[1].spec.module_type, ModuleType::Logic);
    assert_eq!(finished[1].spec.context.user_intent, "time steps");
    assert!(h.registry.contains("recipe-card"));

    let prompts = h.client.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].contains("make dinner"));
    assert!(prompts[1].starts_with("Build module: Recipe Card"));
    assert!(prompts[1].contains("cooking"));
}

#[tokio::test]
async fn test_analyze_context_propagates_parse_error() {
    let h = harness(vec![Ok("no suggestions today".to_string())]);
    let err = h
        .orchestrator
        .analyze_context(&GenerationContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Parse(_)));
}
