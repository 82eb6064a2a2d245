//! Panels: the affordances capability providers attach to an item.
//!
//! A panel is declarative. Providers describe controls and how each one
//! maps onto a remote request ([`Binding`]); rendering and input handling
//! belong to whatever front end consumes the mirror.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a control talks back to the remote tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Remote request name.
    pub op: String,
    /// Fixed request params.
    #[serde(default)]
    pub params: Value,
    /// Slash-separated path where the control's value is written into
    /// `params`, e.g. `inputSettings/url`. Buttons leave this unset.
    #[serde(default)]
    pub value_path: Option<String>,
}

impl Binding {
    pub fn new(op: &str, params: Value) -> Self {
        Self {
            op: op.to_string(),
            params,
            value_path: None,
        }
    }

    pub fn with_value_path(mut self, path: &str) -> Self {
        self.value_path = Some(path.to_string());
        self
    }

    /// Build the request params for an interaction carrying `value`.
    pub fn params_for(&self, value: Option<Value>) -> Value {
        let mut params = match &self.params {
            Value::Object(map) => Value::Object(map.clone()),
            _ => Value::Object(Map::new()),
        };

        if let (Some(path), Some(value)) = (&self.value_path, value) {
            let mut cursor = &mut params;
            let mut segments = path.split('/').filter(|s| !s.is_empty()).peekable();
            while let Some(segment) = segments.next() {
                if !cursor.is_object() {
                    *cursor = Value::Object(Map::new());
                }
                let Value::Object(map) = cursor else { break };
                if segments.peek().is_none() {
                    map.insert(segment.to_string(), value);
                    break;
                }
                cursor = map
                    .entry(segment.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
        }

        params
    }
}

/// A `key=value` pair parsed from a URL query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub key: String,
    pub value: String,
}

fn default_max() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    Toggle {
        id: String,
        label: String,
        #[serde(default)]
        value: bool,
        #[serde(default)]
        binding: Option<Binding>,
    },
    Slider {
        id: String,
        label: String,
        #[serde(default)]
        min: f64,
        #[serde(default = "default_max")]
        max: f64,
        #[serde(default)]
        value: f64,
        #[serde(default)]
        binding: Option<Binding>,
    },
    Text {
        id: String,
        label: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        multiline: bool,
        #[serde(default)]
        binding: Option<Binding>,
    },
    Url {
        id: String,
        label: String,
        #[serde(default)]
        value: String,
        #[serde(default)]
        params: Vec<QueryParam>,
        #[serde(default)]
        binding: Option<Binding>,
    },
    Button {
        id: String,
        label: String,
        #[serde(default)]
        binding: Option<Binding>,
    },
}

impl Control {
    pub fn id(&self) -> &str {
        match self {
            Control::Toggle { id, .. }
            | Control::Slider { id, .. }
            | Control::Text { id, .. }
            | Control::Url { id, .. }
            | Control::Button { id, .. } => id,
        }
    }

    pub fn binding(&self) -> Option<&Binding> {
        match self {
            Control::Toggle { binding, .. }
            | Control::Slider { binding, .. }
            | Control::Text { binding, .. }
            | Control::Url { binding, .. }
            | Control::Button { binding, .. } => binding.as_ref(),
        }
    }

    /// Record a value the remote side reported, so the panel stays truthful.
    pub fn set_value(&mut self, new_value: &Value) -> bool {
        match (self, new_value) {
            (Control::Toggle { value, .. }, Value::Bool(b)) => {
                *value = *b;
                true
            }
            (Control::Slider { value, .. }, Value::Number(n)) => match n.as_f64() {
                Some(f) => {
                    *value = f;
                    true
                }
                None => false,
            },
            (Control::Text { value, .. } | Control::Url { value, .. }, Value::String(s)) => {
                *value = s.clone();
                true
            }
            _ => false,
        }
    }
}

/// Everything the providers contributed for one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub controls: Vec<Control>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Panel {
    pub fn add(&mut self, control: Control) {
        self.controls.push(control);
    }

    pub fn set_background(&mut self, color: impl Into<String>) {
        self.background = Some(color.into());
    }

    /// The first provider to claim the icon keeps it.
    pub fn set_icon(&mut self, icon: impl Into<String>) {
        if self.icon.is_none() {
            self.icon = Some(icon.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty() && self.background.is_none() && self.icon.is_none()
    }

    pub fn control(&self, id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.id() == id)
    }

    pub fn control_mut(&mut self, id: &str) -> Option<&mut Control> {
        self.controls.iter_mut().find(|c| c.id() == id)
    }

    /// Append another provider's section.
    pub fn merge(&mut self, section: Panel) {
        self.controls.extend(section.controls);
        if section.background.is_some() {
            self.background = section.background;
        }
        if let Some(icon) = section.icon {
            self.set_icon(icon);
        }
    }
}

/// Split the query string of `url` into ordered key/value pairs.
pub fn query_params(url: &str) -> Vec<QueryParam> {
    let Some((_, query)) = url.split_once('?') else {
        return Vec::new();
    };
    let query = query.split('#').next().unwrap_or_default();

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            QueryParam {
                key: key.to_string(),
                value: value.to_string(),
            }
        })
        .collect()
}
