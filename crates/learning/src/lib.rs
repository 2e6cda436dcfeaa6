//! Bus-driven observers.
//!
//! - `EventLogger`: bounded newest-first history of selected event kinds
//! - `LearningEngine`: counts recurring interactions and derives insights
//! - `IntervalTask`: runs the periodic analysis

mod engine;
mod logger;
mod scheduler;
mod types;

pub use engine::{LearningConfig, LearningEngine};
pub use logger::{
    EventLogger, LogEntry, BEHAVIOR_KINDS, DEFAULT_LOG_CAPACITY, USAGE_KINDS,
};
pub use scheduler::{IntervalTask, DEFAULT_ANALYSIS_INTERVAL};
pub use types::{
    InsightAction, InsightImpact, InsightKind, LearningInsight, LearningPattern, PatternKind,
};
