//! Point-in-time view of both contexts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use soma_events::ContextMap;

use crate::limits::{
    sanitize_for_prompt, truncate_chars, ContextPrecedence, MAX_CONTEXT_SNIPPET_LEN, MAX_VALUE_LEN,
};

/// Copy of the semantic and behavior maps taken at one moment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub semantic: ContextMap,
    pub behavior: ContextMap,
}

impl ContextSnapshot {
    /// Build context for language-model prompts. Sensitive content is redacted.
    ///
    /// Well-known keys come first in precedence order, the remaining keys
    /// follow alphabetically. Keys present in both maps are listed once per
    /// map.
    pub fn to_prompt_snippet(&self) -> String {
        let mut entries: Vec<(ContextPrecedence, &str, &Value)> = self
            .semantic
            .iter()
            .chain(self.behavior.iter())
            .map(|(k, v)| (ContextPrecedence::of(k), k.as_str(), v))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let mut lines = Vec::new();
        for (_, key, value) in entries {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            // The key takes part in redaction: `apiKey: abc` must not leak.
            if let Some(sanitized) = sanitize_for_prompt(&format!("{key}: {text}"), MAX_VALUE_LEN)
            {
                lines.push(sanitized);
            }
        }

        let now = chrono::Utc::now();
        lines.push(format!("Date: {}", now.format("%Y-%m-%d")));

        truncate_chars(&lines.join("\n"), MAX_CONTEXT_SNIPPET_LEN)
    }
}
