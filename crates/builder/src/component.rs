//! Building blocks placed on the no-code canvas.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Ui,
    Logic,
    Data,
    Event,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Empty when parsed from a generated module; filled by [`Component::ensure_id`].
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Component>,
    #[serde(default)]
    pub position: Position,
}

pub(crate) fn new_component_id() -> String {
    format!("comp-{}", uuid::Uuid::new_v4().simple())
}

impl Component {
    pub fn new(kind: ComponentKind, name: impl Into<String>) -> Self {
        Self {
            id: new_component_id(),
            kind,
            name: name.into(),
            icon: None,
            properties: Map::new(),
            children: Vec::new(),
            position: Position::default(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Give this component and its children fresh ids where missing.
    pub fn ensure_id(&mut self) {
        if self.id.is_empty() {
            self.id = new_component_id();
        }
        for child in &mut self.children {
            child.ensure_id();
        }
    }

    /// Apply a shallow patch. `properties` replaces the whole bag.
    pub fn apply(&mut self, patch: ComponentPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(properties) = patch.properties {
            self.properties = properties;
        }
        if let Some(position) = patch.position {
            self.position = position;
        }
        if let Some(icon) = patch.icon {
            self.icon = Some(icon);
        }
    }
}

/// Fields to overwrite on an existing component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentPatch {
    pub name: Option<String>,
    pub properties: Option<Map<String, Value>>,
    pub position: Option<Position>,
    pub icon: Option<String>,
}

/// Palette entry that instantiates new components.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTemplate {
    pub kind: ComponentKind,
    pub name: &'static str,
    pub icon: &'static str,
    pub properties: Map<String, Value>,
}

impl ComponentTemplate {
    fn new(kind: ComponentKind, name: &'static str, icon: &'static str, properties: Value) -> Self {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            kind,
            name,
            icon,
            properties,
        }
    }

    /// A new component with a fresh id at `position`.
    pub fn instantiate(&self, position: Position) -> Component {
        Component {
            id: new_component_id(),
            kind: self.kind,
            name: self.name.to_string(),
            icon: Some(self.icon.to_string()),
            properties: self.properties.clone(),
            children: Vec::new(),
            position,
        }
    }
}

/// The six stock templates offered by the builder.
pub fn palette() -> Vec<ComponentTemplate> {
    use ComponentKind::*;
    vec![
        ComponentTemplate::new(
            Ui,
            "Text Display",
            "eye",
            json!({ "text": "Sample text", "color": "white", "size": "medium" }),
        ),
        ComponentTemplate::new(
            Ui,
            "Button",
            "zap",
            json!({ "label": "Click me", "action": "none", "color": "blue" }),
        ),
        ComponentTemplate::new(
            Ui,
            "Input Field",
            "code",
            json!({ "placeholder": "Enter text...", "type": "text", "required": false }),
        ),
        ComponentTemplate::new(
            Logic,
            "Condition",
            "settings",
            json!({ "condition": "if", "value": "true", "action": "show" }),
        ),
        ComponentTemplate::new(
            Data,
            "Data Source",
            "palette",
            json!({ "source": "context", "field": "focusEntity", "format": "string" }),
        ),
        ComponentTemplate::new(
            Event,
            "Event Trigger",
            "zap",
            json!({ "event": "click", "target": "button", "action": "publish" }),
        ),
    ]
}

/// Case-insensitive template lookup by name.
pub fn template(name: &str) -> Option<ComponentTemplate> {
    palette()
        .into_iter()
        .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
}
