//! Context injection limits and sanitization policy.
//!
//! Centralizes all limits and redaction rules for prompt context injection.
//! This is the single source of truth for context hygiene.

use soma_events::keys;

/// Maximum length for a single context value in prompts (chars).
pub const MAX_VALUE_LEN: usize = 200;

/// Maximum total context snippet length (chars).
pub const MAX_CONTEXT_SNIPPET_LEN: usize = 1024;

/// Patterns that should be redacted from context (potential secrets).
/// These are case-insensitive substring patterns.
pub const REDACTION_PATTERNS: &[&str] = &[
    "password",
    "secret",
    "api_key",
    "apikey",
    "api-key",
    "token",
    "bearer",
    "authorization",
    "credential",
    "private_key",
    "privatekey",
    "access_key",
    "accesskey",
];

/// Context precedence order (higher = more important, shown first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContextPrecedence {
    /// What the user is looking at.
    FocusEntity = 100,
    CurrentTask = 90,
    UserIntent = 80,
    ActiveModule = 70,
    ActiveTab = 60,
    LastAction = 50,
    /// Keys without a well-known meaning.
    Other = 10,
}

impl ContextPrecedence {
    pub fn of(key: &str) -> Self {
        match key {
            keys::FOCUS_ENTITY => Self::FocusEntity,
            keys::CURRENT_TASK => Self::CurrentTask,
            keys::USER_INTENT => Self::UserIntent,
            keys::ACTIVE_MODULE => Self::ActiveModule,
            keys::ACTIVE_TAB => Self::ActiveTab,
            keys::LAST_ACTION => Self::LastAction,
            _ => Self::Other,
        }
    }
}

/// Check if content contains potential secrets that should be redacted.
pub fn contains_sensitive_pattern(content: &str) -> bool {
    let lower = content.to_lowercase();
    REDACTION_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Cut `content` to at most `max_chars` characters, appending `...` if cut.
pub fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content.to_string(),
    }
}

/// Sanitize and limit content for prompt injection.
///
/// Applies:
/// 1. Sensitive content redaction
/// 2. Length truncation
/// 3. Angle bracket escaping (prevents marker injection)
/// 4. Whitespace normalization
pub fn sanitize_for_prompt(content: &str, max_len: usize) -> Option<String> {
    if contains_sensitive_pattern(content) {
        return None;
    }

    let sanitized = truncate_chars(content, max_len)
        .replace('<', "‹")
        .replace('>', "›")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}
