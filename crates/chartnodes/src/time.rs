use crate::data::f64_field;
use async_trait::async_trait;
use chartcore::schema::DataMap;
use chartcore::{
    Cardinality, DataSchema, FieldIssue, FieldKind, HandleCategory, HandleSpec, Handles, Node,
    NodeContext, NodeError, NodeOutputs, NodeResult,
};
use chartruntime::{NodeDefinition, NodeMetadata};
use serde_json::json;
use tokio::time::{sleep, Duration};

/// Wait, then pass the input on. Returns early when the run is cancelled.
pub struct DelayNode {
    delay: Duration,
}

impl DelayNode {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "delay"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        ctx.events
            .info(format!("Delaying for {}ms", self.delay.as_millis()));

        tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
            _ = sleep(self.delay) => {}
        }

        let value = ctx.main_input().cloned().unwrap_or_default();
        Ok(NodeOutputs::new().with_main(value).into())
    }
}

fn validate_ms(data: &DataMap) -> Result<(), FieldIssue> {
    match data.get("ms").and_then(|v| v.as_f64()) {
        Some(ms) if ms >= 0.0 && ms.is_finite() => Ok(()),
        _ => Err(FieldIssue::new("ms", "delay must be a non-negative number")),
    }
}

pub struct DelayDefinition;

impl NodeDefinition for DelayDefinition {
    fn node_type(&self) -> &str {
        "delay"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Delay", "time", "Delay execution for specified milliseconds")
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(1)
            .field("ms", FieldKind::Number, json!(1000))
            .validator(validate_ms)
    }

    fn handles(&self, _data: &serde_json::Value) -> Handles {
        Handles::new()
            .input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional))
            .output(HandleSpec::unnamed_output(HandleCategory::Any))
    }

    fn create(&self, data: &serde_json::Value) -> Result<Box<dyn Node>, NodeError> {
        let ms = f64_field(data, "ms")?;
        Ok(Box::new(DelayNode::new(Duration::from_millis(ms as u64))))
    }
}
