//! Pattern accumulation and insight derivation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use soma_context::ContextStore;
use soma_events::{
    handler, keys, AnalysisCompleteEvent, ContextMap, Event, EventBus, EventKind, EventPayload,
    Mount,
};
use tracing::{debug, info};

use crate::types::{
    new_insight_id, InsightAction, InsightImpact, InsightKind, LearningInsight, LearningPattern,
    PatternKind,
};

/// Thresholds and confidences used by [`LearningEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// A usage pattern seen more often than this yields an optimization insight.
    pub usage_frequency_threshold: u32,
    /// Above this frequency the optimization insight is high impact.
    pub high_impact_frequency: u32,
    /// A behavior pattern more confident than this yields a suggestion.
    pub behavior_confidence_threshold: f64,
    pub usage_confidence: f64,
    pub behavior_confidence: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            usage_frequency_threshold: 5,
            high_impact_frequency: 10,
            behavior_confidence_threshold: 0.7,
            usage_confidence: 0.8,
            behavior_confidence: 0.9,
        }
    }
}

#[derive(Default)]
struct LearningState {
    patterns: Vec<LearningPattern>,
    insights: Vec<LearningInsight>,
}

/// Watches interactions and behavior context, counts recurring patterns,
/// and turns frequent ones into insights.
pub struct LearningEngine {
    bus: EventBus,
    context: Arc<ContextStore>,
    config: LearningConfig,
    state: Mutex<LearningState>,
}

impl LearningEngine {
    pub fn new(bus: EventBus, context: Arc<ContextStore>, config: LearningConfig) -> Self {
        Self {
            bus,
            context,
            config,
            state: Mutex::new(LearningState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LearningState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Derive a pattern from an event, if it is one the engine learns from.
    pub fn observe(&self, event: &Event) {
        match event.payload() {
            EventPayload::ModuleInteraction(interaction) => {
                self.add_pattern(LearningPattern::observed(
                    PatternKind::Usage,
                    format!("{}-{}", interaction.module, interaction.action),
                    self.config.usage_confidence,
                    vec![format!("Optimize {} module", interaction.module)],
                ));
            }
            EventPayload::BehaviorContextChanged(ctx) => {
                let module = ctx.get_str(keys::ACTIVE_MODULE).unwrap_or("general");
                self.add_pattern(LearningPattern::observed(
                    PatternKind::Behavior,
                    format!("context-{module}"),
                    self.config.behavior_confidence,
                    vec!["Adapt interface for this context".to_string()],
                ));
            }
            _ => {}
        }
    }

    /// Add a pattern, or bump the frequency of the one with the same key.
    ///
    /// Returns the stored pattern.
    pub fn add_pattern(&self, pattern: LearningPattern) -> LearningPattern {
        let mut state = self.lock();
        if let Some(existing) = state
            .patterns
            .iter_mut()
            .find(|p| p.pattern == pattern.pattern)
        {
            existing.frequency += 1;
            existing.last_seen = pattern.last_seen;
            debug!(pattern = %existing.pattern, frequency = existing.frequency, "Pattern seen again");
            return existing.clone();
        }
        debug!(pattern = %pattern.pattern, kind = ?pattern.kind, "New pattern");
        state.patterns.push(pattern.clone());
        pattern
    }

    /// Add an insight unless one with the same title exists. The list stays
    /// sorted by descending priority; equal priorities keep arrival order.
    pub fn add_insight(&self, insight: LearningInsight) -> bool {
        let mut state = self.lock();
        if state.insights.iter().any(|i| i.title == insight.title) {
            return false;
        }
        let index = state
            .insights
            .iter()
            .position(|i| i.priority < insight.priority)
            .unwrap_or(state.insights.len());
        state.insights.insert(index, insight);
        true
    }

    fn derive_insights(&self, patterns: &[LearningPattern]) -> Vec<LearningInsight> {
        let cfg = &self.config;
        let mut derived = Vec::new();

        for p in patterns.iter().filter(|p| p.kind == PatternKind::Usage) {
            if p.frequency > cfg.usage_frequency_threshold {
                derived.push(LearningInsight {
                    id: new_insight_id(),
                    kind: InsightKind::Optimization,
                    title: format!("High Usage Pattern: {}", p.pattern),
                    description: format!(
                        "This pattern occurs {} times. Consider optimizing for better user experience.",
                        p.frequency
                    ),
                    impact: if p.frequency > cfg.high_impact_frequency {
                        InsightImpact::High
                    } else {
                        InsightImpact::Medium
                    },
                    priority: p.frequency,
                    actionable: true,
                    action: Some(InsightAction::OptimizeModule),
                });
            }
        }

        for p in patterns.iter().filter(|p| p.kind == PatternKind::Behavior) {
            if p.confidence > cfg.behavior_confidence_threshold {
                derived.push(LearningInsight {
                    id: new_insight_id(),
                    kind: InsightKind::Suggestion,
                    title: format!("Behavior Pattern Detected: {}", p.pattern),
                    description: format!(
                        "User behavior suggests {}. Consider adapting the interface.",
                        p.pattern
                    ),
                    impact: InsightImpact::Medium,
                    priority: (p.confidence * 10.0).floor() as u32,
                    actionable: true,
                    action: Some(InsightAction::AdaptContext),
                });
            }
        }

        derived
    }

    /// Scan patterns for insights and publish `learning-analysis-complete`
    /// with the counts after the scan.
    pub fn analyze(&self) -> AnalysisCompleteEvent {
        let patterns = self.patterns();
        let added = self
            .derive_insights(&patterns)
            .into_iter()
            .filter(|insight| self.add_insight(insight.clone()))
            .count();

        let summary = {
            let state = self.lock();
            AnalysisCompleteEvent {
                patterns: state.patterns.len(),
                insights: state.insights.len(),
            }
        };
        info!(
            patterns = summary.patterns,
            insights = summary.insights,
            added,
            "Learning analysis complete"
        );
        self.bus
            .publish(Event::new(EventPayload::LearningAnalysisComplete(summary)));
        summary
    }

    /// Consume an insight and act on it.
    ///
    /// The insight is removed before anything is dispatched, so it can only
    /// be applied once even if a handler re-enters. Unknown ids return `None`.
    pub fn apply_optimization(&self, insight_id: &str) -> Option<LearningInsight> {
        let insight = {
            let mut state = self.lock();
            let index = state.insights.iter().position(|i| i.id == insight_id)?;
            state.insights.remove(index)
        };

        info!(insight = %insight.title, action = ?insight.action, "Applying insight");
        match insight.action {
            Some(InsightAction::OptimizeModule) => {
                self.bus
                    .publish(Event::new(EventPayload::ModuleOptimization(insight.clone())));
            }
            Some(InsightAction::AdaptContext) => {
                self.context.set_behavior_context(
                    ContextMap::new()
                        .with(keys::LAST_ACTION, "learning-adaptation")
                        .with(keys::LEARNING_APPLIED, insight.title.clone()),
                );
            }
            Some(InsightAction::SuggestFeature) => {
                self.bus
                    .publish(Event::new(EventPayload::FeatureSuggestion(insight.clone())));
            }
            None => debug!(insight = %insight.id, "Insight has no action"),
        }
        Some(insight)
    }

    pub fn patterns(&self) -> Vec<LearningPattern> {
        self.lock().patterns.clone()
    }

    /// Pending insights, highest priority first.
    pub fn insights(&self) -> Vec<LearningInsight> {
        self.lock().insights.clone()
    }

    pub fn pattern(&self, key: &str) -> Option<LearningPattern> {
        self.lock().patterns.iter().find(|p| p.pattern == key).cloned()
    }

    /// Subscribe to `module-interaction` and `behavior-context-changed`.
    pub fn mount(self: &Arc<Self>) -> Mount {
        let weak: Weak<Self> = Arc::downgrade(self);
        let h = handler(move |event: &Event| {
            if let Some(engine) = weak.upgrade() {
                engine.observe(event);
            }
        });
        let mut mount = Mount::new("learning");
        mount.subscribe_all(
            &self.bus,
            &[EventKind::ModuleInteraction, EventKind::BehaviorContextChanged],
            &h,
        );
        mount
    }
}
