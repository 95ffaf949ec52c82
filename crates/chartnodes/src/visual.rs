use async_trait::async_trait;
use chartcore::{DataSchema, FieldKind, Handles, Node, NodeContext, NodeError, NodeResult};
use chartruntime::{NodeDefinition, NodeKind, NodeMetadata};
use serde_json::json;

/// Annotation nodes. They carry data for the editor and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualDefinition {
    Group,
    Note,
}

struct VisualNode(&'static str);

#[async_trait]
impl Node for VisualNode {
    fn node_type(&self) -> &str {
        self.0
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeResult::Outputs(Default::default()))
    }
}

impl VisualDefinition {
    fn name(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Note => "note",
        }
    }
}

impl NodeDefinition for VisualDefinition {
    fn node_type(&self) -> &str {
        self.name()
    }

    fn metadata(&self) -> NodeMetadata {
        match self {
            Self::Group => NodeMetadata::new("Group", "annotation", "Frame related nodes"),
            Self::Note => NodeMetadata::new("Note", "annotation", "Free text note"),
        }
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Visual
    }

    fn schema(&self) -> DataSchema {
        match self {
            Self::Group => DataSchema::new(1)
                .field("label", FieldKind::String, json!("Group"))
                .field("width", FieldKind::Number, json!(320))
                .field("height", FieldKind::Number, json!(240)),
            Self::Note => DataSchema::new(1).field("text", FieldKind::String, json!("")),
        }
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
    }

    fn create(&self, _data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(VisualNode(self.name())))
    }
}
