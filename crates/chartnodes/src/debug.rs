use crate::data::str_field;
use async_trait::async_trait;
use chartcore::schema::DataMap;
use chartcore::{
    Cardinality, DataSchema, FieldIssue, FieldKind, HandleCategory, HandleSpec, Handles, Node,
    NodeContext, NodeError, NodeOutputs, NodeResult,
};
use chartruntime::{NodeDefinition, NodeMetadata};
use serde_json::json;

/// Reports its input as a run message and passes it through
pub struct LogNode {
    message: String,
    warning: bool,
}

#[async_trait]
impl Node for LogNode {
    fn node_type(&self) -> &str {
        "log"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let value = ctx.main_input().cloned().unwrap_or_default();

        let text = match (self.message.is_empty(), value.is_null()) {
            (true, _) => value.to_display_string(),
            (false, true) => self.message.clone(),
            (false, false) => format!("{}: {}", self.message, value.to_display_string()),
        };

        if self.warning {
            ctx.events.warn(text);
        } else {
            ctx.events.info(text);
        }

        Ok(NodeOutputs::new().with_main(value).into())
    }
}

fn validate_level(data: &DataMap) -> Result<(), FieldIssue> {
    match data.get("level").and_then(|v| v.as_str()) {
        Some("info" | "warning") => Ok(()),
        other => Err(FieldIssue::new(
            "level",
            format!("expected info or warning, got {:?}", other),
        )),
    }
}

pub struct LogDefinition;

impl NodeDefinition for LogDefinition {
    fn node_type(&self) -> &str {
        "log"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Log", "debug", "Report a value while the flow runs")
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(1)
            .field("message", FieldKind::String, json!(""))
            .field("level", FieldKind::String, json!("info"))
            .validator(validate_level)
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional))
            .output(HandleSpec::unnamed_output(HandleCategory::Any))
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(LogNode {
            message: str_field(data, "message")?.to_string(),
            warning: str_field(data, "level")? == "warning",
        }))
    }
}
