use async_trait::async_trait;
use chartcore::{
    Cardinality, DataSchema, FieldKind, HandleCategory, HandleSpec, Handles, Node, NodeContext,
    NodeError, NodeOutputs, NodeResult, Value,
};
use chartruntime::{NodeDefinition, NodeMetadata};
use serde_json::json;

/// Literal value nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantDefinition {
    String,
    Number,
    Boolean,
    Json,
}

impl ConstantDefinition {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
        }
    }

    fn category(self) -> HandleCategory {
        match self {
            Self::String => HandleCategory::Text,
            Self::Number => HandleCategory::Number,
            Self::Boolean => HandleCategory::Boolean,
            Self::Json => HandleCategory::Any,
        }
    }
}

/// Emits its configured value on the unnamed output
pub struct ConstantNode {
    node_type: &'static str,
    value: Value,
}

#[async_trait]
impl Node for ConstantNode {
    fn node_type(&self) -> &str {
        self.node_type
    }

    async fn execute(&self, _ctx: NodeContext) -> Result<NodeResult, NodeError> {
        Ok(NodeOutputs::new().with_main(self.value.clone()).into())
    }
}

impl NodeDefinition for ConstantDefinition {
    fn node_type(&self) -> &str {
        self.name()
    }

    fn metadata(&self) -> NodeMetadata {
        let label = match self {
            Self::String => "Text",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Json => "JSON",
        };
        NodeMetadata::new(label, "value", format!("Constant {} value", self.name()))
    }

    fn schema(&self) -> DataSchema {
        let (kind, default) = match self {
            Self::String => (FieldKind::String, json!("")),
            Self::Number => (FieldKind::Number, json!(0)),
            Self::Boolean => (FieldKind::Boolean, json!(false)),
            Self::Json => (FieldKind::Any, json!({})),
        };
        DataSchema::new(1).field("value", kind, default)
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        // The optional input only sequences the constant after another node.
        Handles::new()
            .input(
                HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional)
                    .with_label("trigger"),
            )
            .output(HandleSpec::unnamed_output(self.category()))
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        let value = data
            .get("value")
            .cloned()
            .map(Value::from)
            .ok_or_else(|| NodeError::InvalidData {
                field: "value".to_string(),
                message: "missing".to_string(),
            })?;
        Ok(Box::new(ConstantNode {
            node_type: self.name(),
            value,
        }))
    }
}
