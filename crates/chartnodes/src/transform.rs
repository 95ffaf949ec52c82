use crate::data::{bool_field, str_field};
use async_trait::async_trait;
use chartcore::schema::DataMap;
use chartcore::{
    Cardinality, DataSchema, FieldIssue, FieldKind, HandleCategory, HandleSpec, Handles, Node,
    NodeContext, NodeError, NodeOutputs, NodeResult, Value,
};
use chartruntime::{NodeDefinition, NodeMetadata};
use serde_json::json;

/// Parse JSON text into a value
pub struct JsonParseNode;

#[async_trait]
impl Node for JsonParseNode {
    fn node_type(&self) -> &str {
        "jsonParse"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let input = ctx.require_str(chartcore::UNNAMED_HANDLE)?;

        let parsed: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(NodeOutputs::new().with_main(parsed).into())
    }
}

pub struct JsonParseDefinition;

impl NodeDefinition for JsonParseDefinition {
    fn node_type(&self) -> &str {
        "jsonParse"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Parse JSON", "transform", "Parse JSON text")
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(HandleSpec::unnamed(HandleCategory::Text, Cardinality::Required))
            .output(HandleSpec::unnamed_output(HandleCategory::Any))
    }

    fn create(&self, _data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonParseNode))
    }
}

/// Serialize a value to JSON text
pub struct JsonStringifyNode {
    pretty: bool,
}

#[async_trait]
impl Node for JsonStringifyNode {
    fn node_type(&self) -> &str {
        "jsonStringify"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let value = ctx.require_input(chartcore::UNNAMED_HANDLE)?;

        let text = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(NodeOutputs::new().with_main(text).into())
    }
}

pub struct JsonStringifyDefinition;

impl NodeDefinition for JsonStringifyDefinition {
    fn node_type(&self) -> &str {
        "jsonStringify"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Stringify JSON", "transform", "Convert a value to JSON text")
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(1).field("pretty", FieldKind::Boolean, json!(false))
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Required))
            .output(HandleSpec::unnamed_output(HandleCategory::Text))
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonStringifyNode {
            pretty: bool_field(data, "pretty")?,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Min,
    Max,
}

impl MathOperation {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "add" => Self::Add,
            "subtract" => Self::Subtract,
            "multiply" => Self::Multiply,
            "divide" => Self::Divide,
            "modulo" => Self::Modulo,
            "power" => Self::Power,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        })
    }

    /// Result of `a op b`. Non-finite results are errors: JSON has no
    /// representation for them.
    pub fn apply(self, a: f64, b: f64) -> Result<f64, NodeError> {
        let result = match self {
            Self::Add => Ok(a + b),
            Self::Subtract => Ok(a - b),
            Self::Multiply => Ok(a * b),
            Self::Divide | Self::Modulo if b == 0.0 => {
                Err(NodeError::ExecutionFailed("division by zero".to_string()))
            }
            Self::Divide => Ok(a / b),
            Self::Modulo => Ok(a % b),
            Self::Power => Ok(a.powf(b)),
            Self::Min => Ok(a.min(b)),
            Self::Max => Ok(a.max(b)),
        }?;
        if result.is_finite() {
            Ok(result)
        } else {
            Err(NodeError::ExecutionFailed(format!(
                "non-finite result of {:?}({}, {})",
                self, a, b
            )))
        }
    }
}

/// Binary arithmetic. `b` falls back to the configured operand.
pub struct MathNode {
    operation: MathOperation,
}

#[async_trait]
impl Node for MathNode {
    fn node_type(&self) -> &str {
        "math"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let operand = |name: &str| -> Result<f64, NodeError> {
            let value = ctx.require_input(name)?;
            value.as_f64().ok_or_else(|| NodeError::InvalidInputType {
                field: name.to_string(),
                expected: "number".to_string(),
                actual: value.type_name().to_string(),
            })
        };
        let result = self.operation.apply(operand("a")?, operand("b")?)?;
        Ok(NodeOutputs::new().with_main(result).into())
    }
}

fn validate_math(data: &DataMap) -> Result<(), FieldIssue> {
    let operation = data.get("operation").and_then(|v| v.as_str()).unwrap_or("");
    match MathOperation::parse(operation) {
        Some(_) => Ok(()),
        None => Err(FieldIssue::new(
            "operation",
            format!("unknown operation '{}'", operation),
        )),
    }
}

pub struct MathDefinition;

impl NodeDefinition for MathDefinition {
    fn node_type(&self) -> &str {
        "math"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Math", "transform", "Arithmetic on two numbers")
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(1)
            .field("operation", FieldKind::String, json!("add"))
            .field("b", FieldKind::Number, json!(0))
            .validator(validate_math)
    }

    fn handles(&self, data: &serde_json::Value) -> Handles {
        let b = data.get("b").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Handles::new()
            .input(HandleSpec::required("a", HandleCategory::Number))
            .input(HandleSpec::optional("b", HandleCategory::Number).with_default(b))
            .output(HandleSpec::unnamed_output(HandleCategory::Number))
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        let name = str_field(data, "operation")?;
        let operation = MathOperation::parse(name).ok_or_else(|| NodeError::InvalidData {
            field: "operation".to_string(),
            message: format!("unknown operation '{}'", name),
        })?;
        Ok(Box::new(MathNode { operation }))
    }
}

/// Shallow merge of every connected object, later edges win
pub struct MergeNode;

#[async_trait]
impl Node for MergeNode {
    fn node_type(&self) -> &str {
        "merge"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let mut merged = std::collections::BTreeMap::new();
        if let Some(values) = ctx.main_input().and_then(Value::as_array) {
            for value in values {
                if let Some(object) = value.as_object() {
                    merged.extend(object.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
        }
        Ok(NodeOutputs::new().with_main(Value::Object(merged)).into())
    }
}

pub struct MergeDefinition;

impl NodeDefinition for MergeDefinition {
    fn node_type(&self) -> &str {
        "merge"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Merge", "transform", "Merge objects into one")
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(HandleSpec::unnamed(HandleCategory::Object, Cardinality::Many))
            .output(HandleSpec::unnamed_output(HandleCategory::Object))
    }

    fn create(&self, _data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(MergeNode))
    }
}
