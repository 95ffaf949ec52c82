//! Handle (port) declarations and the category compatibility relation.

use crate::Value;
use serde::{Deserialize, Serialize};

/// Key under which the single unnamed (`null` id) port is addressed in
/// input and output maps.
pub const UNNAMED_HANDLE: &str = "";

/// Map an optional handle id to its map key.
pub fn handle_key(id: Option<&str>) -> &str {
    id.unwrap_or(UNNAMED_HANDLE)
}

/// Data category carried by a handle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HandleCategory {
    Any,
    Text,
    Number,
    Boolean,
    Object,
    Array,
}

impl HandleCategory {
    /// `any` on either end accepts everything, otherwise categories must match.
    pub fn is_compatible(self, other: HandleCategory) -> bool {
        self == HandleCategory::Any || other == HandleCategory::Any || self == other
    }

    /// Whether a runtime value may be delivered to a port of this category.
    pub fn accepts_value(self, value: &Value) -> bool {
        value.is_null() || self.is_compatible(value.category())
    }
}

impl std::fmt::Display for HandleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Any => "any",
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        write!(f, "{}", s)
    }
}

/// How many incoming edges an input handle takes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// Exactly one edge.
    Required,
    /// Zero or one edge.
    Optional,
    /// Any number of edges; values arrive as an array in edge order.
    Many,
}

/// A single declared port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HandleSpec {
    pub id: Option<String>,
    pub category: HandleCategory,
    pub cardinality: Cardinality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl HandleSpec {
    fn new(id: Option<String>, category: HandleCategory, cardinality: Cardinality) -> Self {
        Self {
            id,
            category,
            cardinality,
            label: None,
            default: None,
        }
    }

    /// Input port that needs exactly one edge.
    pub fn required(id: impl Into<String>, category: HandleCategory) -> Self {
        Self::new(Some(id.into()), category, Cardinality::Required)
    }

    /// Input port that may stay unconnected.
    pub fn optional(id: impl Into<String>, category: HandleCategory) -> Self {
        Self::new(Some(id.into()), category, Cardinality::Optional)
    }

    /// Input port taking any number of edges.
    pub fn many(id: impl Into<String>, category: HandleCategory) -> Self {
        Self::new(Some(id.into()), category, Cardinality::Many)
    }

    /// The single unnamed port of a node.
    pub fn unnamed(category: HandleCategory, cardinality: Cardinality) -> Self {
        Self::new(None, category, cardinality)
    }

    /// Output port. Cardinality is meaningless for outputs and kept as `Many`.
    pub fn output(id: impl Into<String>, category: HandleCategory) -> Self {
        Self::new(Some(id.into()), category, Cardinality::Many)
    }

    pub fn unnamed_output(category: HandleCategory) -> Self {
        Self::new(None, category, Cardinality::Many)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn key(&self) -> &str {
        handle_key(self.id.as_deref())
    }

    pub fn matches(&self, id: Option<&str>) -> bool {
        self.id.as_deref() == id
    }
}

/// Resolved port lists of one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Handles {
    pub inputs: Vec<HandleSpec>,
    pub outputs: Vec<HandleSpec>,
}

impl Handles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, handle: HandleSpec) -> Self {
        self.inputs.push(handle);
        self
    }

    pub fn output(mut self, handle: HandleSpec) -> Self {
        self.outputs.push(handle);
        self
    }

    pub fn find_input(&self, id: Option<&str>) -> Option<&HandleSpec> {
        self.inputs.iter().find(|h| h.matches(id))
    }

    pub fn find_output(&self, id: Option<&str>) -> Option<&HandleSpec> {
        self.outputs.iter().find(|h| h.matches(id))
    }
}
