use crate::data::str_field;
use async_trait::async_trait;
use chartcore::schema::DataMap;
use chartcore::{
    Cardinality, DataSchema, FieldIssue, FieldKind, HandleCategory, HandleSpec, Handles, Node,
    NodeContext, NodeError, NodeOutputs, NodeResult, Value,
};
use chartruntime::{NodeDefinition, NodeMetadata};
use serde_json::json;

fn validate_name(data: &DataMap) -> Result<(), FieldIssue> {
    match data.get("name").and_then(|v| v.as_str()) {
        Some(name) if !name.trim().is_empty() => Ok(()),
        _ => Err(FieldIssue::new("name", "variable name must not be empty")),
    }
}

/// Read a run variable, or the configured fallback when unset
pub struct GetVariableNode {
    name: String,
    fallback: Value,
}

#[async_trait]
impl Node for GetVariableNode {
    fn node_type(&self) -> &str {
        "getVariable"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let variables = ctx.variables.read().await;
        let value = variables
            .get(&self.name)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        Ok(NodeOutputs::new().with_main(value).into())
    }
}

pub struct GetVariableDefinition;

impl NodeDefinition for GetVariableDefinition {
    fn node_type(&self) -> &str {
        "getVariable"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Get Variable", "variables", "Read a run variable")
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(1)
            .required("name", FieldKind::String)
            .field("default", FieldKind::Any, json!(null))
            .validator(validate_name)
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(
                HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional)
                    .with_label("trigger"),
            )
            .output(HandleSpec::unnamed_output(HandleCategory::Any))
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(GetVariableNode {
            name: str_field(data, "name")?.to_string(),
            fallback: data.get("default").cloned().map(Value::from).unwrap_or_default(),
        }))
    }
}

/// Store the input under a run variable and pass it on
pub struct SetVariableNode {
    name: String,
}

#[async_trait]
impl Node for SetVariableNode {
    fn node_type(&self) -> &str {
        "setVariable"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let value = ctx.require_input(chartcore::UNNAMED_HANDLE)?.clone();
        ctx.variables
            .write()
            .await
            .set(self.name.clone(), value.clone());
        tracing::debug!(node_id = %ctx.node_id, name = %self.name, "Variable set");
        Ok(NodeOutputs::new().with_main(value).into())
    }
}

pub struct SetVariableDefinition;

impl NodeDefinition for SetVariableDefinition {
    fn node_type(&self) -> &str {
        "setVariable"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Set Variable", "variables", "Write a run variable")
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(1)
            .required("name", FieldKind::String)
            .validator(validate_name)
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Required))
            .output(HandleSpec::unnamed_output(HandleCategory::Any))
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SetVariableNode {
            name: str_field(data, "name")?.to_string(),
        }))
    }
}
