//! Application context: builds every component, wires them to the bus and
//! owns their subscriptions and timer.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use soma_builder::{
    complete_or_fallback, ChatTurn, CompletionClient, CompletionRequest, CompletionResult,
    GenerationOrchestrator, HttpCompletionClient, NoCodeBuilder, Provider, ProviderKind,
    ProviderSet, TurnRole,
};
use soma_context::ContextStore;
use soma_events::{EventBus, Mount, RenderHandle};
use soma_learning::{EventLogger, IntervalTask, LearningEngine};
use soma_registry::{import_manifests, ImportReport, ModuleManifest, ModuleRegistry};
use soma_semantic::{ChatHistory, ChatMessage, ChatRole, TripleStore, CHAT_HISTORY_MODULE};
use soma_tabs::{Tab, TabManager};
use tracing::{debug, info, warn};

use crate::config::SomaConfig;
use crate::status::ErrorSlots;

/// Render scheme of modules shipped with the application.
pub const BUILTIN_RENDER_SCHEME: &str = "builtin";

/// Modules registered at startup.
pub fn builtin_modules() -> Vec<ModuleManifest> {
    [
        ("chat-history", "Chat History", "Conversation history with the assistant", "core", "sparkles"),
        ("semantic-layer", "Semantic Layer", "Ontology triples and natural-language queries", "ai", "sparkles"),
        ("no-code-builder", "No-Code Builder", "Compose modules without programming", "tools", "code"),
        ("semantic-ai", "Semantic AI", "Generate modules with a language model", "ai", "brain"),
    ]
    .into_iter()
    .map(|(id, name, description, category, icon)| {
        ModuleManifest::new(id, name)
            .with_description(description)
            .with_category(category)
            .with_icon(icon)
            .with_version("1.0.0")
            .with_render(RenderHandle::scoped(BUILTIN_RENDER_SCHEME, id))
    })
    .collect()
}

/// Build the HTTP completion client from config.
pub fn http_client(config: &SomaConfig) -> CompletionResult<HttpCompletionClient> {
    let mut client = HttpCompletionClient::new(config.completion.timeout())?;
    if let Some(url) = &config.completion.groq_endpoint {
        client = client.with_endpoint(ProviderKind::Groq, url);
    }
    if let Some(url) = &config.completion.openai_endpoint {
        client = client.with_endpoint(ProviderKind::Openai, url);
    }
    Ok(client)
}

pub struct Soma {
    config: SomaConfig,
    bus: EventBus,
    registry: Arc<ModuleRegistry>,
    context: Arc<ContextStore>,
    tabs: Arc<TabManager>,
    behavior_log: Arc<EventLogger>,
    usage_log: Arc<EventLogger>,
    learning: Arc<LearningEngine>,
    triples: Arc<TripleStore>,
    chat: Arc<ChatHistory>,
    builder: Arc<NoCodeBuilder>,
    providers: Arc<ProviderSet>,
    completion: Arc<dyn CompletionClient>,
    generation: Arc<GenerationOrchestrator>,
    errors: ErrorSlots,
    mounts: Mutex<Vec<Mount>>,
    analysis_timer: IntervalTask,
}

impl Soma {
    /// Build with the HTTP completion client.
    pub fn new(config: SomaConfig) -> CompletionResult<Self> {
        let client = Arc::new(http_client(&config)?);
        Ok(Self::with_client(config, client))
    }

    /// Build every component and mount it on the bus. The analysis timer
    /// is not running until [`start`](Self::start).
    pub fn with_client(config: SomaConfig, completion: Arc<dyn CompletionClient>) -> Self {
        let bus = EventBus::new();
        let registry = Arc::new(ModuleRegistry::new());
        let context = Arc::new(ContextStore::new(bus.clone()));
        let tabs = Arc::new(TabManager::new(bus.clone(), Arc::clone(&registry)));
        let behavior_log = Arc::new(EventLogger::behavior(config.log_capacity));
        let usage_log = Arc::new(EventLogger::usage(config.log_capacity));
        let learning = Arc::new(LearningEngine::new(
            bus.clone(),
            Arc::clone(&context),
            config.learning.clone(),
        ));
        let triples = Arc::new(TripleStore::new(bus.clone()));
        let chat = Arc::new(ChatHistory::new(bus.clone()));
        let builder = Arc::new(NoCodeBuilder::new(bus.clone(), Arc::clone(&registry)));
        let providers = Arc::new(ProviderSet::new(bus.clone()));
        let generation = Arc::new(GenerationOrchestrator::new(
            bus.clone(),
            Arc::clone(&registry),
            Arc::clone(&builder),
            Arc::clone(&providers),
            Arc::clone(&context),
            Arc::clone(&completion),
        ));

        let mounts = vec![
            tabs.mount(),
            behavior_log.mount(&bus),
            usage_log.mount(&bus),
            learning.mount(),
            triples.mount(),
            chat.mount(),
        ];

        for manifest in builtin_modules() {
            registry.register(manifest);
        }

        let soma = Self {
            config,
            bus,
            registry,
            context,
            tabs,
            behavior_log,
            usage_log,
            learning,
            triples,
            chat,
            builder,
            providers,
            completion,
            generation,
            errors: ErrorSlots::new(),
            mounts: Mutex::new(mounts),
            analysis_timer: IntervalTask::new("learning-analysis"),
        };

        if let Some(chat) = soma.registry.get(CHAT_HISTORY_MODULE) {
            soma.tabs.open_tab(Tab::for_module(&chat));
        }
        info!(modules = soma.registry.len(), "Soma initialized");
        soma
    }

    /// Start the periodic learning analysis. Needs a tokio runtime.
    pub fn start(&self) -> bool {
        let weak: Weak<LearningEngine> = Arc::downgrade(&self.learning);
        self.analysis_timer
            .start(self.config.analysis_interval(), move || {
                if let Some(engine) = weak.upgrade() {
                    engine.analyze();
                }
            })
    }

    /// Stop the timer and drop every subscription. Idempotent.
    pub fn shutdown(&self) {
        self.analysis_timer.stop();
        let mounts: Vec<Mount> = std::mem::take(
            &mut *self.mounts.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !mounts.is_empty() {
            info!(mounts = mounts.len(), "Soma shutting down");
        }
        for mount in mounts {
            mount.unmount();
        }
    }

    pub fn is_mounted(&self) -> bool {
        !self
            .mounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Register manifests from every configured directory that exists.
    pub fn load_configured_manifests(&self) -> ImportReport {
        let dirs: Vec<PathBuf> = self
            .config
            .manifest_directories()
            .into_iter()
            .filter(|dir| {
                let exists = dir.is_dir();
                if !exists {
                    debug!(path = %dir.display(), "Manifest directory missing, skipping");
                }
                exists
            })
            .collect();
        let report = import_manifests(&self.registry, &dirs);
        if !report.is_clean() {
            warn!(errors = report.errors.len(), "Some module manifests could not be loaded");
        }
        report
    }

    /// Register manifests from explicit files.
    pub fn import_manifests(&self, paths: &[PathBuf]) -> ImportReport {
        import_manifests(&self.registry, paths)
    }

    /// Unregister a module and close its tab.
    pub fn unregister_module(&self, id: &str) -> Option<ModuleManifest> {
        let removed = self.registry.unregister(id)?;
        self.tabs.reconcile();
        Some(removed)
    }

    /// Record a user line, get a reply from the chat endpoint (or the local
    /// fallback), and record that too.
    ///
    /// The endpoint gets the whole conversation plus the prompt-safe context.
    pub async fn ask(&self, message: &str) -> String {
        self.chat.push(ChatMessage::user(message));
        let reply = match self.chat_provider() {
            Some(provider) => {
                let turns = self
                    .chat
                    .messages()
                    .into_iter()
                    .map(|m| {
                        let role = match m.role {
                            ChatRole::User => TurnRole::User,
                            ChatRole::Assistant => TurnRole::Assistant,
                        };
                        ChatTurn::new(role, m.content)
                    })
                    .collect();
                let context = self.context.snapshot().to_prompt_snippet();
                complete_or_fallback(
                    self.completion.as_ref(),
                    &provider,
                    &CompletionRequest::messages(turns, Some(context)),
                )
                .await
            }
            None => soma_builder::FALLBACK_RESPONSE.to_string(),
        };
        self.chat.push(ChatMessage::assistant(&reply));
        reply
    }

    fn chat_provider(&self) -> Option<Provider> {
        match &self.config.completion.chat_endpoint {
            Some(url) => Some(Provider::new("chat", "Chat", ProviderKind::Custom).with_endpoint(url)),
            None => self.providers.active(),
        }
    }

    pub fn config(&self) -> &SomaConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    pub fn tabs(&self) -> &Arc<TabManager> {
        &self.tabs
    }

    pub fn behavior_log(&self) -> &Arc<EventLogger> {
        &self.behavior_log
    }

    pub fn usage_log(&self) -> &Arc<EventLogger> {
        &self.usage_log
    }

    pub fn learning(&self) -> &Arc<LearningEngine> {
        &self.learning
    }

    pub fn triples(&self) -> &Arc<TripleStore> {
        &self.triples
    }

    pub fn chat(&self) -> &Arc<ChatHistory> {
        &self.chat
    }

    pub fn builder(&self) -> &Arc<NoCodeBuilder> {
        &self.builder
    }

    pub fn providers(&self) -> &Arc<ProviderSet> {
        &self.providers
    }

    pub fn generation(&self) -> &Arc<GenerationOrchestrator> {
        &self.generation
    }

    pub fn errors(&self) -> &ErrorSlots {
        &self.errors
    }
}

impl Drop for Soma {
    fn drop(&mut self) {
        self.shutdown();
    }
}
