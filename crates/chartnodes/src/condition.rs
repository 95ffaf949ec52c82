//! Conditional branching with ordered, first-match conditions.

use async_trait::async_trait;
use chartcore::schema::DataMap;
use chartcore::{
    Cardinality, DataSchema, FieldIssue, FieldKind, HandleCategory, HandleSpec, Handles, IdSource,
    Node, NodeContext, NodeError, NodeOutputs, NodeResult,
};
use chartruntime::{NodeDefinition, NodeMetadata};
use rhai::{Engine, Scope, AST};
use serde_json::{json, Value as Json};
use std::sync::Arc;

/// Output taken when no condition holds
pub const FALSE_HANDLE: &str = "false";

const CONDITIONS: &str = "conditions";

/// Evaluates its conditions in authored order and branches on the first
/// that holds. The input value is passed through on the selected handle.
pub struct IfNode {
    engine: Engine,
    conditions: Vec<(String, AST)>,
}

impl IfNode {
    pub fn new(conditions: &[(String, String)]) -> Result<Self, NodeError> {
        let engine = condition_engine();
        let conditions = conditions
            .iter()
            .map(|(id, expression)| {
                engine
                    .compile_expression(expression)
                    .map(|ast| (id.clone(), ast))
                    .map_err(|e| NodeError::InvalidData {
                        field: CONDITIONS.to_string(),
                        message: format!("condition '{}' does not parse: {}", id, e),
                    })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { engine, conditions })
    }
}

fn condition_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(100_000);
    engine.set_max_expr_depths(64, 32);
    engine
}

#[async_trait]
impl Node for IfNode {
    fn node_type(&self) -> &str {
        "if"
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeError> {
        let value = ctx.main_input().cloned().unwrap_or_default();

        let mut scope = Scope::new();
        scope.push_dynamic("value", to_dynamic(&value)?);
        {
            let variables = ctx.variables.read().await;
            scope.push_dynamic("variables", to_dynamic(&variables.data)?);
        }

        for (id, ast) in &self.conditions {
            let holds = self
                .engine
                .eval_ast_with_scope::<bool>(&mut scope, ast)
                .map_err(|e| NodeError::Evaluation(format!("condition '{}': {}", id, e)))?;
            tracing::debug!(node_id = %ctx.node_id, condition = %id, holds, "Evaluated condition");
            if holds {
                return Ok(branch(id, value));
            }
        }

        Ok(branch(FALSE_HANDLE, value))
    }
}

fn branch(handle: &str, value: chartcore::Value) -> NodeResult {
    NodeResult::Branch {
        handle: handle.to_string(),
        outputs: NodeOutputs::new().with_output(handle, value),
    }
}

fn to_dynamic<T: serde::Serialize>(value: &T) -> Result<rhai::Dynamic, NodeError> {
    rhai::serde::to_dynamic(value).map_err(|e| NodeError::Evaluation(e.to_string()))
}

/// `(id, expression)` pairs of a normalized payload
fn conditions_of(data: &Json) -> Vec<(String, String)> {
    data.get(CONDITIONS)
        .and_then(Json::as_array)
        .map(|conditions| {
            conditions
                .iter()
                .filter_map(|c| {
                    let id = c.get("id")?.as_str()?;
                    let expression = c.get("expression")?.as_str()?;
                    Some((id.to_string(), expression.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Version 1 held a single `condition` expression with `true`/`false` outputs.
fn migrate_v1(mut data: DataMap) -> Result<DataMap, String> {
    let conditions = match data.remove("condition") {
        None | Some(Json::Null) => json!([]),
        Some(Json::String(expression)) => json!([{ "id": "true", "expression": expression }]),
        Some(other) => return Err(format!("condition must be a string, found {}", other)),
    };
    data.insert(CONDITIONS.to_string(), conditions);
    Ok(data)
}

fn validate(data: &DataMap) -> Result<(), FieldIssue> {
    let Some(Json::Array(conditions)) = data.get(CONDITIONS) else {
        return Err(FieldIssue::new(CONDITIONS, "expected an array"));
    };

    let mut seen = std::collections::HashSet::new();
    for condition in conditions {
        let id = condition.get("id").and_then(Json::as_str);
        let expression = condition.get("expression").and_then(Json::as_str);
        let (Some(id), Some(_)) = (id, expression) else {
            return Err(FieldIssue::new(
                CONDITIONS,
                "every condition needs a string id and expression",
            ));
        };
        if id.is_empty() || id == FALSE_HANDLE {
            return Err(FieldIssue::new(
                CONDITIONS,
                format!("condition id {:?} is reserved", id),
            ));
        }
        if !seen.insert(id) {
            return Err(FieldIssue::new(
                CONDITIONS,
                format!("duplicate condition id '{}'", id),
            ));
        }
    }
    Ok(())
}

pub struct IfDefinition;

impl NodeDefinition for IfDefinition {
    fn node_type(&self) -> &str {
        "if"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new(
            "If",
            "control",
            "Branch on the first condition that holds",
        )
    }

    fn schema(&self) -> DataSchema {
        DataSchema::new(2)
            .field(CONDITIONS, FieldKind::Array, json!([]))
            .migration(1, migrate_v1)
            .validator(validate)
    }

    fn handles(&self, data: &Json) -> Handles {
        let mut handles =
            Handles::new().input(HandleSpec::unnamed(HandleCategory::Any, Cardinality::Optional));
        for (id, expression) in conditions_of(data) {
            handles = handles.output(HandleSpec::output(id, HandleCategory::Any).with_label(expression));
        }
        handles.output(HandleSpec::output(FALSE_HANDLE, HandleCategory::Any))
    }

    fn create(&self, data: &Json) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(IfNode::new(&conditions_of(data))?))
    }
}

/// Authoring helper maintaining the ordered condition list of an `if` node
pub struct IfConditions {
    ids: Arc<dyn IdSource>,
    conditions: Vec<(String, String)>,
}

impl IfConditions {
    pub fn new(ids: Arc<dyn IdSource>) -> Self {
        Self {
            ids,
            conditions: Vec::new(),
        }
    }

    /// Conditions of existing node data
    pub fn from_data(ids: Arc<dyn IdSource>, data: &Json) -> Self {
        Self {
            ids,
            conditions: conditions_of(data),
        }
    }

    /// Append a condition and return the id of its new output handle
    pub fn add(&mut self, expression: impl Into<String>) -> String {
        let id = self.ids.next_id();
        self.conditions.push((id.clone(), expression.into()));
        id
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|(existing, _)| existing != id);
        self.conditions.len() != before
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Node data at the current schema version
    pub fn to_data(&self) -> Json {
        let conditions: Vec<Json> = self
            .conditions
            .iter()
            .map(|(id, expression)| json!({ "id": id, "expression": expression }))
            .collect();
        json!({ "_version": 2, "conditions": conditions })
    }
}
