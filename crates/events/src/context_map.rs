use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known context keys.
pub mod keys {
    pub const FOCUS_ENTITY: &str = "focusEntity";
    pub const CURRENT_TASK: &str = "currentTask";
    pub const USER_INTENT: &str = "userIntent";
    pub const ACTIVE_MODULE: &str = "activeModule";
    pub const ACTIVE_TAB: &str = "activeTab";
    pub const LAST_ACTION: &str = "lastAction";
    pub const LEARNING_APPLIED: &str = "learningApplied";
}

/// String-keyed map with heterogeneous JSON values.
///
/// Used both for the stored context and for the partial updates merged into
/// it. Merging is shallow: top-level keys in the partial replace the
/// existing ones, nested objects are not merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextMap(Map<String, Value>);

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Shallow merge, last writer wins per key.
    pub fn merge(&mut self, partial: ContextMap) {
        for (key, value) in partial.0 {
            self.0.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for `key`. Non-string and empty values read as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ContextMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ContextMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
