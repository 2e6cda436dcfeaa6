//! Subject-predicate-object statements.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use regex::Regex;
use serde::{Deserialize, Serialize};
use soma_events::{
    handler, keys, ContextMap, Event, EventBus, EventKind, EventPayload, ModuleInteractionEvent,
    Mount, Triple,
};

/// Module id used in the interactions the semantic layer publishes.
pub const SEMANTIC_MODULE: &str = "semantic";

static NL_TRIPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+)\s+(\w+)\s+(.+)$").expect("natural-language triple pattern is valid")
});

/// Partial triple used as a query. Absent or empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

impl TripleQuery {
    /// Substring match on each given field. Case-sensitive.
    pub fn matches(&self, triple: &Triple) -> bool {
        fn field(query: &Option<String>, value: &str) -> bool {
            match query.as_deref() {
                None | Some("") => true,
                Some(q) => value.contains(q),
            }
        }
        field(&self.subject, &triple.subject)
            && field(&self.predicate, &triple.predicate)
            && field(&self.object, &triple.object)
    }

    /// The full triple, if every field is present.
    pub fn into_triple(self) -> Option<Triple> {
        Some(Triple::new(self.subject?, self.predicate?, self.object?))
    }
}

/// "User likes AI" maps to subject `User`, predicate `likes`, object `AI`.
/// Anything else becomes a subject-only query on the trimmed input.
pub fn map_natural_language(input: &str) -> TripleQuery {
    let input = input.trim();
    match NL_TRIPLE.captures(input) {
        Some(caps) => TripleQuery {
            subject: Some(caps[1].to_string()),
            predicate: Some(caps[2].to_string()),
            object: Some(caps[3].to_string()),
        },
        None => TripleQuery {
            subject: Some(input.to_string()),
            ..TripleQuery::default()
        },
    }
}

/// What the semantic layer shows for the last semantic context it saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticView {
    /// Triples relevant to `focusEntity` or `currentTask`.
    pub focused: Vec<Triple>,
    /// The `userIntent` sentence, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Natural-language query results for `intent`.
    pub intent_results: Vec<Triple>,
}

#[derive(Default)]
struct TripleState {
    triples: Vec<Triple>,
    semantic: ContextMap,
    view: SemanticView,
}

impl TripleState {
    fn refresh(&mut self) {
        let intent = self
            .semantic
            .get_str(keys::USER_INTENT)
            .filter(|i| !i.trim().is_empty())
            .map(str::to_string);
        let intent_results = match &intent {
            Some(sentence) => {
                let query = map_natural_language(sentence);
                self.triples
                    .iter()
                    .filter(|t| query.matches(t))
                    .cloned()
                    .collect()
            }
            None => Vec::new(),
        };
        self.view = SemanticView {
            focused: contextual(&self.triples, &self.semantic),
            intent,
            intent_results,
        };
    }
}

/// With a `focusEntity`, triples whose subject or object contains it
/// (case-insensitive). Otherwise with a `currentTask`, triples whose
/// predicate contains it. Otherwise everything.
fn contextual(triples: &[Triple], semantic: &ContextMap) -> Vec<Triple> {
    if let Some(focus) = semantic.get_str(keys::FOCUS_ENTITY) {
        let focus = focus.to_lowercase();
        return triples
            .iter()
            .filter(|t| {
                t.subject.to_lowercase().contains(&focus) || t.object.to_lowercase().contains(&focus)
            })
            .cloned()
            .collect();
    }
    if let Some(task) = semantic.get_str(keys::CURRENT_TASK) {
        let task = task.to_lowercase();
        return triples
            .iter()
            .filter(|t| t.predicate.to_lowercase().contains(&task))
            .cloned()
            .collect();
    }
    triples.to_vec()
}

/// Append-only triple store with a view derived from the semantic context.
pub struct TripleStore {
    bus: EventBus,
    state: Mutex<TripleState>,
}

impl TripleStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            state: Mutex::new(TripleState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TripleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a triple and publish `semantic-triple-added`.
    pub fn add_triple(&self, triple: Triple) {
        tracing::debug!(
            subject = %triple.subject,
            predicate = %triple.predicate,
            "Triple added"
        );
        {
            let mut state = self.lock();
            state.triples.push(triple.clone());
            state.refresh();
        }
        self.bus
            .publish(Event::new(EventPayload::SemanticTripleAdded(triple)));
    }

    /// Parse a sentence into a triple and add it.
    ///
    /// Returns `None`, adding nothing, if the sentence has fewer than three parts.
    pub fn add_natural_language(&self, input: &str) -> Option<Triple> {
        let triple = map_natural_language(input).into_triple()?;
        self.add_triple(triple.clone());
        Some(triple)
    }

    pub fn query(&self, query: &TripleQuery) -> Vec<Triple> {
        self.lock()
            .triples
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect()
    }

    /// Re-derive the view from `semantic` and keep it.
    pub fn refresh(&self, semantic: &ContextMap) -> SemanticView {
        let mut state = self.lock();
        state.semantic = semantic.clone();
        state.refresh();
        state.view.clone()
    }

    pub fn view(&self) -> SemanticView {
        self.lock().view.clone()
    }

    /// Follow both context-changed events. A semantic change re-derives the
    /// view; either change is announced as a `context-updated` interaction.
    pub fn mount(self: &Arc<Self>) -> Mount {
        let mut mount = Mount::new("semantic");
        let weak: Weak<Self> = Arc::downgrade(self);

        let h = handler(move |event: &Event| {
            let Some(store) = weak.upgrade() else {
                return;
            };
            if let EventPayload::SemanticContextChanged(ctx) = event.payload() {
                let view = store.refresh(ctx);
                tracing::debug!(
                    focused = view.focused.len(),
                    intent_results = view.intent_results.len(),
                    "Semantic view refreshed"
                );
            }
            store.bus.publish(Event::new(EventPayload::ModuleInteraction(
                ModuleInteractionEvent::new(SEMANTIC_MODULE, "context-updated"),
            )));
        });
        mount.subscribe_all(
            &self.bus,
            &[EventKind::SemanticContextChanged, EventKind::BehaviorContextChanged],
            &h,
        );
        mount
    }

    pub fn triples(&self) -> Vec<Triple> {
        self.lock().triples.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().triples.is_empty()
    }
}
