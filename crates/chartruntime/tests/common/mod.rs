#![allow(dead_code)]

use async_trait::async_trait;
use chartcore::{
    Cardinality, DataSchema, FieldKind, HandleCategory, HandleSpec, Handles, Node, NodeContext,
    NodeError, NodeOutputs, NodeResult, SpecEdge, SpecFlow, SpecNode, Value,
};
use chartruntime::{
    FlowRuntime, LoopPorts, NodeDefinition, NodeKind, NodeMetadata, NodeRegistry, RuntimeConfig,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// `(node id, input value)` of every probe visit, in visit order
pub type Log = Arc<Mutex<Vec<(String, Value)>>>;

pub const PORTS: LoopPorts = LoopPorts {
    collection: "items",
    body: "item",
    done: "done",
    next: "next",
};

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log, node_id: &str) -> Vec<Value> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(id, _)| id == node_id)
        .map(|(_, v)| v.clone())
        .collect()
}

pub fn numbers(values: &[f64]) -> Value {
    Value::Array(values.iter().map(|n| Value::Number(*n)).collect())
}

pub fn node(id: &str, node_type: &str) -> SpecNode {
    SpecNode::new(id, node_type)
}

pub fn edge(id: &str, source: &str, source_handle: Option<&str>, target: &str, target_handle: Option<&str>) -> SpecEdge {
    SpecEdge::new(id, source, source_handle, target, target_handle)
}

pub fn flow(nodes: Vec<SpecNode>, edges: Vec<SpecEdge>) -> SpecFlow {
    SpecFlow { nodes, edges }
}

pub fn registry(log: &Log) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    let definitions: Vec<Arc<dyn NodeDefinition>> = vec![
        Arc::new(Simple::Start),
        Arc::new(Simple::Emit),
        Arc::new(Simple::Flag),
        Arc::new(Simple::Upper),
        Arc::new(Simple::Join),
        Arc::new(Simple::Gate),
        Arc::new(Simple::Loop),
        Arc::new(Simple::BreakOn),
        Arc::new(Simple::ContinueOn),
        Arc::new(Simple::End),
        Arc::new(Simple::Fail),
        Arc::new(Simple::Sleep),
        Arc::new(Simple::Note),
        Arc::new(Simple::Versioned),
        Arc::new(Probe { log: log.clone() }),
    ];
    for definition in definitions {
        registry.register(definition).unwrap();
    }
    registry
}

pub fn runtime(log: &Log) -> FlowRuntime {
    runtime_with(log, RuntimeConfig::default())
}

pub fn runtime_with(log: &Log, config: RuntimeConfig) -> FlowRuntime {
    init_tracing();
    FlowRuntime::with_registry(Arc::new(registry(log)), config)
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Records its input and passes it through
struct Probe {
    log: Log,
}

struct ProbeNode {
    log: Log,
}

#[async_trait]
impl Node for ProbeNode {
    fn node_type(&self) -> &str {
        "probe"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let value = ctx.main_input().cloned().unwrap_or_default();
        self.log
            .lock()
            .unwrap()
            .push((ctx.node_id.clone(), value.clone()));
        Ok(NodeOutputs::new().with_main(value).into())
    }
}

impl NodeDefinition for Probe {
    fn node_type(&self) -> &str {
        "probe"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Probe", "test", "Records its input")
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional))
            .output(HandleSpec::unnamed_output(HandleCategory::Any))
    }

    fn create(&self, _data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(ProbeNode {
            log: self.log.clone(),
        }))
    }
}

/// Stateless test node types
#[derive(Debug, Clone, Copy, PartialEq)]
enum Simple {
    /// Entry node emitting the run inputs
    Start,
    /// Emits `data.value`
    Emit,
    /// Emits boolean true
    Flag,
    /// Upper-cases a text input
    Upper,
    /// Collects every connected value
    Join,
    /// Branches `yes` on truthy input, `no` otherwise
    Gate,
    Loop,
    /// Breaks when the input equals `data.equals`
    BreakOn,
    /// Continues when the input equals `data.equals`
    ContinueOn,
    End,
    Fail,
    /// Sleeps `data.ms` then passes the input
    Sleep,
    Note,
    /// Schema at version 3 with two migrations
    Versioned,
}

struct SimpleNode {
    kind: Simple,
    data: serde_json::Value,
}

impl Simple {
    fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Emit => "emit",
            Self::Flag => "flag",
            Self::Upper => "upper",
            Self::Join => "join",
            Self::Gate => "gate",
            Self::Loop => "loop",
            Self::BreakOn => "breakOn",
            Self::ContinueOn => "continueOn",
            Self::End => "end",
            Self::Fail => "fail",
            Self::Sleep => "sleep",
            Self::Note => "note",
            Self::Versioned => "versioned",
        }
    }
}

fn rename_x_to_y(mut data: chartcore::schema::DataMap) -> Result<chartcore::schema::DataMap, String> {
    if let Some(x) = data.remove("x") {
        data.insert("y".to_string(), x);
    }
    Ok(data)
}

fn add_z(mut data: chartcore::schema::DataMap) -> Result<chartcore::schema::DataMap, String> {
    data.entry("z").or_insert(json!("added"));
    Ok(data)
}

impl NodeDefinition for Simple {
    fn node_type(&self) -> &str {
        self.name()
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new(self.name(), "test", "")
    }

    fn kind(&self) -> NodeKind {
        match self {
            Self::Start => NodeKind::Entry,
            Self::Loop => NodeKind::Loop(PORTS),
            Self::BreakOn | Self::ContinueOn => NodeKind::LoopControl,
            Self::Note => NodeKind::Visual,
            _ => NodeKind::Regular,
        }
    }

    fn schema(&self) -> DataSchema {
        match self {
            Self::Emit => DataSchema::new(1).field("value", FieldKind::Any, json!(null)),
            Self::BreakOn | Self::ContinueOn => {
                DataSchema::new(1).required("equals", FieldKind::Number)
            }
            Self::Sleep => DataSchema::new(1).field("ms", FieldKind::Number, json!(10)),
            Self::Versioned => DataSchema::new(3)
                .required("y", FieldKind::Number)
                .migration(1, rename_x_to_y)
                .migration(2, add_z),
            _ => DataSchema::new(1),
        }
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        let any_in = HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional);
        let any_out = HandleSpec::unnamed_output(HandleCategory::Any);
        match self {
            Self::Start => Handles::new().output(any_out),
            Self::Emit | Self::Sleep | Self::Versioned => {
                Handles::new().input(any_in).output(any_out)
            }
            Self::Flag => Handles::new()
                .input(any_in)
                .output(HandleSpec::unnamed_output(HandleCategory::Boolean)),
            Self::Upper => Handles::new()
                .input(HandleSpec::unnamed(HandleCategory::Text, Cardinality::Required))
                .output(HandleSpec::unnamed_output(HandleCategory::Text)),
            Self::Join => Handles::new()
                .input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Many))
                .output(HandleSpec::unnamed_output(HandleCategory::Array)),
            Self::Gate => Handles::new()
                .input(any_in)
                .output(HandleSpec::output("yes", HandleCategory::Any))
                .output(HandleSpec::output("no", HandleCategory::Any)),
            Self::Loop => Handles::new()
                .input(HandleSpec::required(PORTS.collection, HandleCategory::Array))
                .input(HandleSpec::optional(PORTS.next, HandleCategory::Any))
                .output(HandleSpec::output(PORTS.body, HandleCategory::Any))
                .output(HandleSpec::output(PORTS.done, HandleCategory::Array)),
            Self::BreakOn | Self::ContinueOn => Handles::new()
                .input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Required))
                .output(any_out),
            Self::End | Self::Fail => Handles::new().input(any_in),
            Self::Note => Handles::new(),
        }
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SimpleNode {
            kind: *self,
            data: data.clone(),
        }))
    }
}

#[async_trait]
impl Node for SimpleNode {
    fn node_type(&self) -> &str {
        self.kind.name()
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let input = ctx.main_input().cloned().unwrap_or_default();
        let equals = self.data.get("equals").and_then(|v| v.as_f64());
        let out = |value: Value| -> Result<NodeResult, NodeError> {
            Ok(NodeResult::Outputs(NodeOutputs::new().with_main(value)))
        };

        match self.kind {
            Simple::Start => out(Value::Object(
                ctx.run_inputs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )),
            Simple::Emit => out(self.data.get("value").cloned().unwrap_or_default().into()),
            Simple::Flag => out(Value::Bool(true)),
            Simple::Upper => out(Value::String(ctx.require_str("")?.to_uppercase())),
            Simple::Join | Simple::Versioned | Simple::Note => out(input),
            Simple::Gate => {
                let handle = if input.as_bool().unwrap_or(false) { "yes" } else { "no" };
                Ok(NodeResult::Branch {
                    handle: handle.to_string(),
                    outputs: NodeOutputs::new().with_output(handle, input),
                })
            }
            Simple::Loop => Ok(NodeOutputs::new()
                .with_output(PORTS.body, ctx.require_input(PORTS.collection)?.clone())
                .into()),
            Simple::BreakOn if input.as_f64() == equals => Ok(NodeResult::LoopBreak),
            Simple::ContinueOn if input.as_f64() == equals => Ok(NodeResult::LoopContinue),
            Simple::BreakOn | Simple::ContinueOn => out(input),
            Simple::End => Ok(NodeResult::FlowEnd),
            Simple::Fail => Err(NodeError::ExecutionFailed("boom".to_string())),
            Simple::Sleep => {
                let ms = self.data.get("ms").and_then(|v| v.as_f64()).unwrap_or(10.0);
                tokio::time::sleep(std::time::Duration::from_millis(ms as u64)).await;
                out(input)
            }
        }
    }
}
