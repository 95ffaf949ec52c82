use chartcore::{DataSchema, Handles, Node, NodeError, RegistryError, SchemaError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Everything the engine and the editor need to know about one node type.
///
/// Definitions are registered once and never mutated; `create` builds the
/// executor for one node instance from its validated data.
pub trait NodeDefinition: Send + Sync {
    /// Type identifier as stored in `SpecNode::node_type`
    fn node_type(&self) -> &str;

    fn metadata(&self) -> NodeMetadata;

    fn kind(&self) -> NodeKind {
        NodeKind::Regular
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(1)
    }

    /// Ports for a node with the given (normalized) data. Outputs may depend
    /// on the data, e.g. one per authored condition.
    fn handles(&self, data: &serde_json::Value) -> Handles;

    /// Build the executor for a node with validated data
    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError>;
}

/// Presentation metadata about a node type
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetadata {
    pub label: String,
    pub category: String,
    pub description: String,
}

impl NodeMetadata {
    pub fn new(
        label: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            category: category.into(),
            description: description.into(),
        }
    }
}

/// How the resolver and engine treat a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeKind {
    Regular,
    /// Designated start of a run
    Entry,
    /// Annotation only: never scheduled, never connected
    Visual,
    /// Iterates its body once per element of a collection
    Loop(LoopPorts),
    /// Raises break/continue; must sit inside a loop body
    LoopControl,
}

/// Handle ids of a loop construct.
///
/// The loop's executor produces the whole collection on `body`; the engine
/// rebinds that handle to one element per iteration. Edges into `next` are
/// back edges closing the body, their values are collected into `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopPorts {
    pub collection: &'static str,
    pub body: &'static str,
    pub done: &'static str,
    pub next: &'static str,
}

/// Catalog entry handed to the rendering layer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeInfo {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(flatten)]
    pub metadata: NodeMetadata,
    pub kind: NodeKind,
    pub version: u32,
    pub default_data: serde_json::Value,
    pub handles: Handles,
}

/// Migrated data of one node plus the handles it currently exposes
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub data: serde_json::Value,
    pub handles: Handles,
}

/// Registry of available node types
pub struct NodeRegistry {
    definitions: HashMap<String, Arc<dyn NodeDefinition>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Register a node definition. Types are registered exactly once.
    pub fn register(&mut self, definition: Arc<dyn NodeDefinition>) -> Result<(), RegistryError> {
        let node_type = definition.node_type().to_string();
        if self.definitions.contains_key(&node_type) {
            return Err(RegistryError::DuplicateNodeType(node_type));
        }
        tracing::info!("Registering node type: {}", node_type);
        self.definitions.insert(node_type, definition);
        Ok(())
    }

    pub fn get(&self, node_type: &str) -> Option<&Arc<dyn NodeDefinition>> {
        self.definitions.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.definitions.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.definitions.keys().cloned().collect();
        types.sort();
        types
    }

    /// Catalog of every type with its default data and default handles
    pub fn catalog(&self) -> Vec<NodeTypeInfo> {
        self.list_node_types()
            .into_iter()
            .filter_map(|node_type| {
                let definition = self.definitions.get(&node_type)?;
                let schema = definition.schema();
                let default_data = schema.defaults();
                Some(NodeTypeInfo {
                    handles: definition.handles(&default_data),
                    metadata: definition.metadata(),
                    kind: definition.kind(),
                    version: schema.current_version(),
                    default_data,
                    node_type,
                })
            })
            .collect()
    }

    /// Migrate a node's data and compute its handles. `None` if the type is
    /// unknown.
    pub fn describe(
        &self,
        node_id: &str,
        node_type: &str,
        data: &serde_json::Value,
    ) -> Option<Result<NodeView, SchemaError>> {
        let definition = self.definitions.get(node_type)?;
        Some(
            definition
                .schema()
                .normalize(node_id, data)
                .map(|data| NodeView {
                    handles: definition.handles(&data),
                    data,
                }),
        )
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<NodeRegistry>> = OnceLock::new();

/// Install the process-wide registry. Succeeds once per process.
pub fn install_global(registry: NodeRegistry) -> Result<Arc<NodeRegistry>, RegistryError> {
    let registry = Arc::new(registry);
    GLOBAL_REGISTRY
        .set(registry.clone())
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    Ok(registry)
}

/// The process-wide registry, if installed
pub fn global() -> Option<Arc<NodeRegistry>> {
    GLOBAL_REGISTRY.get().cloned()
}
