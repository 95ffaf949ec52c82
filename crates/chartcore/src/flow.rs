use crate::ids::IdSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Persisted flow: nodes plus the edges between their handles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpecFlow {
    #[serde(default)]
    pub nodes: Vec<SpecNode>,
    #[serde(default)]
    pub edges: Vec<SpecEdge>,
}

impl SpecFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn find_node(&self, id: &str) -> Option<&SpecNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut SpecNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a SpecEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a SpecEdge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }
}

/// Node instance in a flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SpecNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Edge from an output handle to an input handle. `None` handles address the
/// node's single unnamed port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecEdge {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    pub target: String,
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl SpecEdge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_handle: Option<&str>,
        target: impl Into<String>,
        target_handle: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_handle: source_handle.map(str::to_string),
            target: target.into(),
            target_handle: target_handle.map(str::to_string),
        }
    }
}

/// Authoring helper that draws node and edge ids from an [`IdSource`].
pub struct FlowBuilder {
    flow: SpecFlow,
    ids: Arc<dyn IdSource>,
}

impl FlowBuilder {
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            flow: SpecFlow::new(),
            ids,
        }
    }

    /// Add a node and return its fresh id.
    pub fn add_node(&mut self, node_type: impl Into<String>, data: serde_json::Value) -> String {
        let id = self.ids.next_id();
        self.flow
            .nodes
            .push(SpecNode::new(id.clone(), node_type).with_data(data));
        id
    }

    pub fn connect(
        &mut self,
        source: &str,
        source_handle: Option<&str>,
        target: &str,
        target_handle: Option<&str>,
    ) -> String {
        let id = self.ids.next_id();
        self.flow.edges.push(SpecEdge::new(
            id.clone(),
            source,
            source_handle,
            target,
            target_handle,
        ));
        id
    }

    pub fn ids(&self) -> &Arc<dyn IdSource> {
        &self.ids
    }

    pub fn build(self) -> SpecFlow {
        self.flow
    }
}
