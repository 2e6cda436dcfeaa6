//! Pattern and insight types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use soma_events::{
    InsightAction, InsightEvent as LearningInsight, InsightImpact, InsightKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Usage,
    Behavior,
    Context,
}

/// A recurring observation, deduplicated by `pattern`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPattern {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PatternKind,
    /// Dedup key, e.g. `chat-history-send` or `context-general`.
    pub pattern: String,
    pub frequency: u32,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub suggestions: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

impl LearningPattern {
    /// A first observation: frequency 1, seen now.
    pub fn observed(
        kind: PatternKind,
        pattern: impl Into<String>,
        confidence: f64,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            id: format!("pattern-{}", uuid::Uuid::new_v4()),
            kind,
            pattern: pattern.into(),
            frequency: 1,
            confidence: confidence.clamp(0.0, 1.0),
            suggestions,
            last_seen: Utc::now(),
        }
    }
}

pub(crate) fn new_insight_id() -> String {
    format!("insight-{}", uuid::Uuid::new_v4())
}
