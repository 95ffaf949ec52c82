use async_trait::async_trait;
use chartcore::{
    Cardinality, HandleCategory, HandleSpec, Handles, Node, NodeContext, NodeError, NodeOutputs,
    NodeResult, Value,
};
use chartruntime::{NodeDefinition, NodeKind, NodeMetadata};

/// Entry point of a run. Emits the run inputs as one object.
pub struct StartNode;

#[async_trait]
impl Node for StartNode {
    fn node_type(&self) -> &str {
        "start"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let inputs = ctx
            .run_inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(NodeOutputs::new().with_main(Value::Object(inputs)).into())
    }
}

pub struct StartDefinition;

impl NodeDefinition for StartDefinition {
    fn node_type(&self) -> &str {
        "start"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Start", "control", "Where the flow begins")
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Entry
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new().output(HandleSpec::unnamed_output(HandleCategory::Object))
    }

    fn create(&self, _data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(StartNode))
    }
}

/// Stops the whole run successfully
pub struct EndNode;

#[async_trait]
impl Node for EndNode {
    fn node_type(&self) -> &str {
        "end"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        ctx.events.info("Flow end reached");
        Ok(NodeResult::FlowEnd)
    }
}

pub struct EndDefinition;

impl NodeDefinition for EndDefinition {
    fn node_type(&self) -> &str {
        "end"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("End", "control", "Stop the flow")
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new().input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional))
    }

    fn create(&self, _data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(EndNode))
    }
}

/// Break or continue the nearest enclosing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopSignalDefinition {
    Break,
    Continue,
}

struct LoopSignalNode(LoopSignalDefinition);

#[async_trait]
impl Node for LoopSignalNode {
    fn node_type(&self) -> &str {
        self.0.node_type_name()
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeResult, NodeError> {
        Ok(match self.0 {
            LoopSignalDefinition::Break => NodeResult::LoopBreak,
            LoopSignalDefinition::Continue => NodeResult::LoopContinue,
        })
    }
}

impl LoopSignalDefinition {
    fn node_type_name(self) -> &'static str {
        match self {
            Self::Break => "break",
            Self::Continue => "continue",
        }
    }
}

impl NodeDefinition for LoopSignalDefinition {
    fn node_type(&self) -> &str {
        self.node_type_name()
    }

    fn metadata(&self) -> NodeMetadata {
        match self {
            Self::Break => NodeMetadata::new("Break", "control", "Leave the enclosing loop"),
            Self::Continue => NodeMetadata::new(
                "Continue",
                "control",
                "Skip to the next element of the enclosing loop",
            ),
        }
    }

    fn kind(&self) -> NodeKind {
        NodeKind::LoopControl
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new().input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional))
    }

    fn create(&self, _data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(LoopSignalNode(*self)))
    }
}
