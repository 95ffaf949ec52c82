use crate::handle::HandleCategory;
use crate::run::RunTrace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A node data payload failed migration or validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("node '{node_id}': data must be a JSON object")]
    NotAnObject { node_id: String },

    #[error("node '{node_id}': data version {found} is newer than supported version {current}")]
    UnsupportedVersion {
        node_id: String,
        found: u32,
        current: u32,
    },

    #[error("node '{node_id}': migration from version {from} failed: {message}")]
    Migration {
        node_id: String,
        from: u32,
        message: String,
    },

    #[error("node '{node_id}': missing required field '{field}'")]
    MissingField { node_id: String, field: String },

    #[error("node '{node_id}': invalid field '{field}': {message}")]
    InvalidField {
        node_id: String,
        field: String,
        message: String,
    },
}

impl SchemaError {
    pub fn node_id(&self) -> &str {
        match self {
            Self::NotAnObject { node_id }
            | Self::UnsupportedVersion { node_id, .. }
            | Self::Migration { node_id, .. }
            | Self::MissingField { node_id, .. }
            | Self::InvalidField { node_id, .. } => node_id,
        }
    }
}

/// Structural problem detected while resolving a flow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Duplicate edge id: {0}")]
    DuplicateEdgeId(String),

    #[error("Node '{node_id}' has unknown node type '{type_name}'")]
    UnknownNodeType { node_id: String, type_name: String },

    #[error("Edge '{edge_id}' references missing node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("Edge '{edge_id}' connects visual node '{node_id}'")]
    VisualNodeConnected { edge_id: String, node_id: String },

    #[error("Edge '{edge_id}' uses undeclared {direction} handle {handle:?} on node '{node_id}'")]
    UnknownHandle {
        edge_id: String,
        node_id: String,
        handle: Option<String>,
        direction: HandleDirection,
    },

    #[error("Edge '{edge_id}' connects incompatible handles: {source_category} -> {target_category}")]
    IncompatibleHandles {
        edge_id: String,
        source_category: HandleCategory,
        target_category: HandleCategory,
    },

    #[error("Node '{node_id}' is missing required input {handle:?}")]
    MissingInput {
        node_id: String,
        handle: Option<String>,
    },

    #[error("Node '{node_id}' input {handle:?} takes at most one edge, found {count}")]
    TooManyInputs {
        node_id: String,
        handle: Option<String>,
        count: usize,
    },

    #[error("Cycle outside of a loop body involving node '{node_id}'")]
    Cycle { node_id: String },

    #[error("Node '{node_id}' signals loop control outside of any loop")]
    LoopControlOutsideLoop { node_id: String },

    #[error("Invalid loop edge '{edge_id}': {message}")]
    InvalidLoopEdge { edge_id: String, message: String },

    #[error("Loop '{inner}' is not properly nested inside loop '{outer}'")]
    ImproperLoopNesting { outer: String, inner: String },

    #[error("Flow has no start node")]
    MissingStart,

    #[error("Flow has several start nodes: {0:?}")]
    AmbiguousStart(Vec<String>),

    #[error("Start node not found: {0}")]
    StartNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleDirection {
    Input,
    Output,
}

impl std::fmt::Display for HandleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// A node failed during a run. The trace holds everything produced before
/// the failure.
#[derive(Error, Debug, Clone)]
#[error("Node '{node_id}' failed: {cause}")]
pub struct ExecutionError {
    pub node_id: String,
    pub cause: NodeError,
    pub trace: Box<RunTrace>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid data field '{field}': {message}")]
    InvalidData { field: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Condition evaluation failed: {0}")]
    Evaluation(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Node type already registered: {0}")]
    DuplicateNodeType(String),

    #[error("Global node registry already installed")]
    AlreadyInstalled,
}
