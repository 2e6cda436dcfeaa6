//! Line commands.
//!
//! Typed lines and decoded speech go through the same parser. A line that
//! does not start with a command word is sent to the assistant as chat.

use std::fmt::Write as _;
use std::str::FromStr;

use soma_builder::{GenerationContext, GenerationSpec, GenerationStatus, ModuleType};
use soma_events::{keys, ContextMap, Event, EventPayload, ModuleInteractionEvent, OpenTabEvent};
use soma_registry::CategoryFilter;
use soma_semantic::{ChatFilter, ChatMessage};
use thiserror::Error;

use crate::app::Soma;
use crate::status::Concern;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open { id: String, title: String },
    Close(String),
    Focus(String),
    Module(String),
    Interact { module: String, action: String },
    Triple(String),
    Triples,
    History(Option<String>),
    Analyze,
    Apply(String),
    Generate(String),
    Ask(String),
    Tabs,
    Modules(Option<String>),
    Logs,
    Insights,
    Errors,
    Dismiss(Concern),
    Retry(Concern),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Nothing to do")]
    Empty,

    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("Unknown concern '{0}', expected voice or generation")]
    UnknownConcern(String),
}

fn required(rest: &str, command: &'static str, argument: &'static str) -> Result<String, ParseError> {
    let rest = rest.trim();
    if rest.is_empty() {
        Err(ParseError::MissingArgument { command, argument })
    } else {
        Ok(rest.to_string())
    }
}

fn concern(rest: &str) -> Result<Concern, ParseError> {
    match rest.trim().to_ascii_lowercase().as_str() {
        "voice" => Ok(Concern::Voice),
        "generation" | "" => Ok(Concern::Generation),
        other => Err(ParseError::UnknownConcern(other.to_string())),
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match word.to_ascii_lowercase().as_str() {
            "open" => {
                let id = required(rest, "open", "a tab id")?;
                let (id, title) = match id.split_once(char::is_whitespace) {
                    Some((id, title)) => (id.to_string(), title.trim().to_string()),
                    None => (id.clone(), id),
                };
                Command::Open { id, title }
            }
            "close" => Command::Close(required(rest, "close", "a tab id")?),
            "focus" => Command::Focus(required(rest, "focus", "an entity")?),
            "module" => Command::Module(required(rest, "module", "a module id")?),
            "interact" => {
                let args = required(rest, "interact", "a module and an action")?;
                match args.split_once(char::is_whitespace) {
                    Some((module, action)) => Command::Interact {
                        module: module.to_string(),
                        action: action.trim().to_string(),
                    },
                    None => {
                        return Err(ParseError::MissingArgument {
                            command: "interact",
                            argument: "an action",
                        })
                    }
                }
            }
            "triple" => Command::Triple(required(rest, "triple", "a sentence")?),
            "triples" => Command::Triples,
            "history" => Command::History((!rest.is_empty()).then(|| rest.to_string())),
            "analyze" => Command::Analyze,
            "apply" => Command::Apply(required(rest, "apply", "an insight id")?),
            "generate" => Command::Generate(required(rest, "generate", "a description")?),
            "ask" => Command::Ask(required(rest, "ask", "a message")?),
            "tabs" => Command::Tabs,
            "modules" => Command::Modules((!rest.is_empty()).then(|| rest.to_string())),
            "logs" => Command::Logs,
            "insights" => Command::Insights,
            "errors" => Command::Errors,
            "dismiss" => Command::Dismiss(concern(rest)?),
            "retry" => Command::Retry(concern(rest)?),
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Ask(line.to_string()),
        };
        Ok(command)
    }
}

const HELP: &str = "\
open <id> [title]       open a tab
close <id>              close a tab
focus <entity>          set the semantic focus
module <id>             set the active module
interact <module> <act> record a module interaction
triple <s> <p> <o>      add a triple
triples                 triples for the current context
history [search]        chat history for the current context
analyze                 run the learning analysis
apply <insight-id>      apply an insight
generate <description>  generate a module
ask <message>           chat with the assistant
tabs | modules [query] | logs | insights | errors
dismiss|retry [voice|generation]
quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(String),
    Quit,
}

/// Runs commands against a [`Soma`] instance.
pub struct Shell<'a> {
    soma: &'a Soma,
    last_generation: Option<String>,
}

impl<'a> Shell<'a> {
    pub fn new(soma: &'a Soma) -> Self {
        Self {
            soma,
            last_generation: None,
        }
    }

    /// Parse and run one line. Parse errors are reported as output.
    pub async fn run_line(&mut self, line: &str) -> Outcome {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command).await,
            Err(ParseError::Empty) => Outcome::Continue(String::new()),
            Err(e) => Outcome::Continue(e.to_string()),
        }
    }

    pub async fn execute(&mut self, command: Command) -> Outcome {
        let soma = self.soma;
        let output = match command {
            Command::Quit => return Outcome::Quit,
            Command::Help => HELP.to_string(),
            Command::Open { id, title } => {
                soma.bus()
                    .publish(Event::new(EventPayload::OpenTab(OpenTabEvent::new(id, title))));
                self.describe_active_tab()
            }
            Command::Close(id) => match soma.tabs().close_tab(&id) {
                Some(tab) => format!("Closed {}. {}", tab.id, self.describe_active_tab()),
                None => format!("No tab '{id}'"),
            },
            Command::Focus(entity) => {
                soma.context()
                    .set_semantic_context(ContextMap::new().with(keys::FOCUS_ENTITY, entity));
                self.describe_active_tab()
            }
            Command::Module(id) => {
                soma.context()
                    .set_behavior_context(ContextMap::new().with(keys::ACTIVE_MODULE, id));
                self.describe_active_tab()
            }
            Command::Interact { module, action } => {
                soma.bus().publish(Event::new(EventPayload::ModuleInteraction(
                    ModuleInteractionEvent::new(module, action),
                )));
                String::new()
            }
            Command::Triple(sentence) => match soma.triples().add_natural_language(&sentence) {
                Some(t) => format!("Added ({}, {}, {})", t.subject, t.predicate, t.object),
                None => "A triple needs a subject, a predicate and an object".to_string(),
            },
            Command::Triples => self.list_triples(),
            Command::History(search) => {
                let shown = soma.chat().set_filter(ChatFilter {
                    search: search.unwrap_or_default(),
                    emotion: None,
                });
                list_messages(&shown)
            }
            Command::Analyze => {
                let done = soma.learning().analyze();
                format!("Analysis: {} patterns, {} insights", done.patterns, done.insights)
            }
            Command::Apply(id) => match soma.learning().apply_optimization(&id) {
                Some(insight) => format!("Applied '{}'", insight.title),
                None => format!("No insight '{id}'"),
            },
            Command::Generate(description) => self.generate(description).await,
            Command::Ask(message) => soma.ask(&message).await,
            Command::Tabs => self.list_tabs(),
            Command::Modules(query) => self.list_modules(query.as_deref()),
            Command::Logs => self.list_logs(),
            Command::Insights => self.list_insights(),
            Command::Errors => {
                let errors = soma.errors().active();
                if errors.is_empty() {
                    "No errors".to_string()
                } else {
                    errors
                        .iter()
                        .map(|(concern, message)| format!("{concern}: {message}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Command::Dismiss(concern) => match soma.errors().dismiss(concern) {
                Some(_) => format!("Dismissed {concern} error"),
                None => format!("No {concern} error"),
            },
            Command::Retry(Concern::Generation) => {
                let last = soma
                    .errors()
                    .retry(Concern::Generation, || self.last_generation.clone());
                match last {
                    Some(description) => self.generate(description).await,
                    None => "Nothing to retry".to_string(),
                }
            }
            Command::Retry(Concern::Voice) => {
                soma.errors().retry(Concern::Voice, || ());
                "Listening".to_string()
            }
        };
        Outcome::Continue(output)
    }

    async fn generate(&mut self, description: String) -> String {
        let soma = self.soma;
        self.last_generation = Some(description.clone());
        let snapshot = soma.context().snapshot();
        let spec = GenerationSpec {
            prompt: format!("Build module: {description}"),
            context: GenerationContext {
                semantic: snapshot.semantic,
                behavior: snapshot.behavior,
                user_intent: description.clone(),
            },
            module_type: ModuleType::Composite,
            requirements: description
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect(),
        };

        match soma.generation().generate_module(spec).await {
            Ok(request) if request.status == GenerationStatus::Completed => {
                let Some(module) = request.result else {
                    return "Generation completed without a module".to_string();
                };
                soma.context().set_behavior_context(
                    ContextMap::new().with(keys::ACTIVE_MODULE, module.id.clone()),
                );
                format!("Generated module '{}' ({})", module.name, module.id)
            }
            Ok(request) => {
                let error = request.error.unwrap_or_else(|| "unknown error".to_string());
                soma.errors().report(Concern::Generation, error.clone());
                format!("Generation failed: {error}")
            }
            Err(e) => {
                soma.errors().report(Concern::Generation, e.to_string());
                format!("Generation failed: {e}")
            }
        }
    }

    fn describe_active_tab(&self) -> String {
        match self.soma.tabs().active_tab() {
            Some(tab) => format!("Active tab: {} ({})", tab.id, tab.title),
            None => "No active tab".to_string(),
        }
    }

    fn list_tabs(&self) -> String {
        let tabs = self.soma.tabs();
        let active = tabs.active_tab_id();
        let mut out = String::new();
        for tab in tabs.tabs() {
            let marker = if active.as_deref() == Some(tab.id.as_str()) { '*' } else { ' ' };
            let _ = writeln!(out, "{marker} {:<24} {}", tab.id, tab.title);
        }
        out.trim_end().to_string()
    }

    fn list_modules(&self, query: Option<&str>) -> String {
        let registry = self.soma.registry();
        let modules = match query {
            Some(q) => registry.search(q, &CategoryFilter::All),
            None => registry.modules(),
        };
        let mut out = String::new();
        for m in modules {
            let _ = writeln!(
                out,
                "{:<24} {:<24} [{}]",
                m.id,
                m.name,
                m.category.as_deref().unwrap_or("-")
            );
        }
        out.trim_end().to_string()
    }

    fn list_logs(&self) -> String {
        let mut out = String::new();
        for logger in [self.soma.behavior_log(), self.soma.usage_log()] {
            let _ = writeln!(out, "{} ({}):", logger.name(), logger.len());
            for entry in logger.entries().iter().take(10) {
                let _ = writeln!(
                    out,
                    "  {} {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.kind()
                );
            }
        }
        out.trim_end().to_string()
    }

    fn list_triples(&self) -> String {
        let view = self.soma.triples().view();
        let mut out = String::new();
        for t in &view.focused {
            let _ = writeln!(out, "({}, {}, {})", t.subject, t.predicate, t.object);
        }
        if let Some(intent) = &view.intent {
            let _ = writeln!(out, "Intent '{intent}': {} matches", view.intent_results.len());
            for t in &view.intent_results {
                let _ = writeln!(out, "  ({}, {}, {})", t.subject, t.predicate, t.object);
            }
        }
        if out.is_empty() {
            return "No triples".to_string();
        }
        out.trim_end().to_string()
    }

    fn list_insights(&self) -> String {
        let insights = self.soma.learning().insights();
        if insights.is_empty() {
            return "No insights".to_string();
        }
        let mut out = String::new();
        for i in insights {
            let _ = writeln!(
                out,
                "{} [{:?}] {} (priority {})",
                i.id, i.impact, i.title, i.priority
            );
        }
        out.trim_end().to_string()
    }
}

fn list_messages(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return "No messages".to_string();
    }
    messages
        .iter()
        .map(|m| format!("{} {:?}: {}", m.timestamp.format("%H:%M:%S"), m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
