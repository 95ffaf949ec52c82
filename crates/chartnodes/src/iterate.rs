use async_trait::async_trait;
use chartcore::{
    HandleCategory, HandleSpec, Handles, Node, NodeContext, NodeError, NodeOutputs, NodeResult,
    Value,
};
use chartruntime::{LoopPorts, NodeDefinition, NodeKind, NodeMetadata};

pub const FOR_EACH_PORTS: LoopPorts = LoopPorts {
    collection: "items",
    body: "item",
    done: "done",
    next: "next",
};

/// Hands its collection to the engine, which runs the body per element
pub struct ForEachNode;

#[async_trait]
impl Node for ForEachNode {
    fn node_type(&self) -> &str {
        "forEach"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let items = match ctx.inputs.get(FOR_EACH_PORTS.collection) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(NodeError::InvalidInputType {
                    field: FOR_EACH_PORTS.collection.to_string(),
                    expected: "array".to_string(),
                    actual: other.type_name().to_string(),
                })
            }
        };

        ctx.events.info(format!("Iterating over {} items", items.len()));

        Ok(NodeOutputs::new()
            .with_output(FOR_EACH_PORTS.body, Value::Array(items))
            .into())
    }
}

pub struct ForEachDefinition;

impl NodeDefinition for ForEachDefinition {
    fn node_type(&self) -> &str {
        "forEach"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new(
            "For Each",
            "control",
            "Run the connected body once per element of a list",
        )
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Loop(FOR_EACH_PORTS)
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(HandleSpec::required(FOR_EACH_PORTS.collection, HandleCategory::Array))
            .input(
                HandleSpec::optional(FOR_EACH_PORTS.next, HandleCategory::Any)
                    .with_label("collect"),
            )
            .output(HandleSpec::output(FOR_EACH_PORTS.body, HandleCategory::Any))
            .output(HandleSpec::output(FOR_EACH_PORTS.done, HandleCategory::Array))
    }

    fn create(&self, _data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(ForEachNode))
    }
}
