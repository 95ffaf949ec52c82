use crate::handle::UNNAMED_HANDLE;
use crate::{events::EventEmitter, NodeError, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type NodeId = String;

/// Runtime behaviour of one node instance.
///
/// Instances are built by their node definition from validated data and
/// invoked once per visit.
#[async_trait]
pub trait Node: Send + Sync {
    /// Type identifier this executor belongs to (e.g. "if", "jsonParse")
    fn node_type(&self) -> &str;

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError>;
}

/// Execution context passed to each node visit
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: NodeId,

    /// Resolved input values keyed by input handle id (unnamed port: "")
    pub inputs: HashMap<String, Value>,

    /// Validated, migrated node data
    pub data: serde_json::Value,

    /// Values the run was started with
    pub run_inputs: Arc<HashMap<String, Value>>,

    /// Variables shared by every node of the same run
    pub variables: Arc<RwLock<Variables>>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancellation token of the run
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl NodeContext {
    pub fn new(node_id: impl Into<NodeId>, events: EventEmitter) -> Self {
        Self {
            node_id: node_id.into(),
            inputs: HashMap::new(),
            data: serde_json::Value::Object(Default::default()),
            run_inputs: Arc::new(HashMap::new()),
            variables: Arc::new(RwLock::new(Variables::default())),
            events,
            cancellation: tokio_util::sync::CancellationToken::new(),
        }
    }

    pub fn with_input(mut self, handle: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(handle.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(name)
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    /// The unnamed input, if connected
    pub fn main_input(&self) -> Option<&Value> {
        self.inputs.get(UNNAMED_HANDLE)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, NodeError> {
        let value = self.require_input(name)?;
        value.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: name.to_string(),
            expected: "text".to_string(),
            actual: value.type_name().to_string(),
        })
    }
}

/// Run-scoped variable store
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Variables {
    pub data: HashMap<String, Value>,
}

impl Variables {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(name.into(), value)
    }
}

/// Values produced on output handles, keyed by handle id (unnamed port: "")
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct NodeOutputs {
    pub values: HashMap<String, Value>,
}

impl NodeOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(port.into(), value.into());
        self
    }

    /// Set the unnamed output
    pub fn with_main(self, value: impl Into<Value>) -> Self {
        self.with_output(UNNAMED_HANDLE, value)
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port)
    }

    pub fn main(&self) -> Option<&Value> {
        self.values.get(UNNAMED_HANDLE)
    }

    pub fn insert(&mut self, port: impl Into<String>, value: Value) {
        self.values.insert(port.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of one executor invocation. Control signals are ordinary results,
/// failures travel as `Err(NodeError)`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    /// Plain data-flow completion
    Outputs(NodeOutputs),
    /// Continue only along edges leaving `handle`
    Branch { handle: String, outputs: NodeOutputs },
    /// Leave the nearest enclosing loop
    LoopBreak,
    /// Skip the rest of the current iteration of the nearest enclosing loop
    LoopContinue,
    /// Stop the whole run successfully
    FlowEnd,
}

impl From<NodeOutputs> for NodeResult {
    fn from(outputs: NodeOutputs) -> Self {
        NodeResult::Outputs(outputs)
    }
}
