use chartcore::{
    FlowBuilder, FlowError, NodeStatus, RegistryError, RunResult, SequentialIds, SpecFlow, Value,
};
use chartnodes::{register_all, standard_registry, IfConditions};
use chartruntime::{FlowRuntime, NodeDefinition, NodeKind, RuntimeConfig};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn runtime() -> FlowRuntime {
    FlowRuntime::with_registry(
        Arc::new(standard_registry().expect("Standard nodes register once")),
        RuntimeConfig::default(),
    )
}

async fn run(flow: &SpecFlow) -> RunResult {
    runtime()
        .execute(flow, HashMap::new())
        .await
        .expect("Flow should run")
}

fn main_of<'a>(result: &'a RunResult, node_id: &str) -> Option<&'a Value> {
    result.trace.output(node_id).and_then(|o| o.main())
}

/// start -> json [1..5] -> forEach; item -> if(`stop_at` | `skip_at`);
/// stop -> break; skip -> continue; false -> math(x10) -> forEach.next;
/// done -> log
fn loop_flow(stop_at: f64, skip_at: f64) -> (SpecFlow, HashMap<&'static str, String>) {
    let mut builder = FlowBuilder::new(Arc::new(SequentialIds::new("n")));
    let mut conditions = IfConditions::new(Arc::new(SequentialIds::new("cond")));
    let stop = conditions.add(format!("value == {:.1}", stop_at));
    let skip = conditions.add(format!("value == {:.1}", skip_at));

    let start = builder.add_node("start", json!({}));
    let items = builder.add_node("json", json!({ "value": [1, 2, 3, 4, 5] }));
    let each = builder.add_node("forEach", json!({}));
    let check = builder.add_node("if", conditions.to_data());
    let brk = builder.add_node("break", json!({}));
    let cont = builder.add_node("continue", json!({}));
    let scale = builder.add_node("math", json!({ "operation": "multiply", "b": 10 }));
    let report = builder.add_node("log", json!({ "message": "Collected" }));

    builder.connect(&start, None, &items, None);
    builder.connect(&items, None, &each, Some("items"));
    builder.connect(&each, Some("item"), &check, None);
    builder.connect(&check, Some(stop.as_str()), &brk, None);
    builder.connect(&check, Some(skip.as_str()), &cont, None);
    builder.connect(&check, Some("false"), &scale, Some("a"));
    builder.connect(&scale, None, &each, Some("next"));
    builder.connect(&each, Some("done"), &report, None);

    let ids = HashMap::from([
        ("each", each),
        ("check", check),
        ("break", brk),
        ("continue", cont),
        ("scale", scale),
        ("report", report),
    ]);
    (builder.build(), ids)
}

#[tokio::test]
async fn test_for_each_with_break_and_continue() {
    let (flow, ids) = loop_flow(4.0, 2.0);

    let result = run(&flow).await;

    assert_eq!(
        main_of(&result, &ids["report"]),
        Some(&Value::Array(vec![Value::Number(10.0), Value::Number(30.0)])),
        "2 is skipped and the loop stops at 4"
    );
    assert_eq!(result.trace.executions_of(&ids["check"]), 4);
    assert_eq!(result.trace.executions_of(&ids["scale"]), 2);
    assert_eq!(result.trace.executions_of(&ids["continue"]), 1);
    assert_eq!(result.trace.executions_of(&ids["break"]), 1);
    assert_eq!(result.trace.status(&ids["each"]), Some(NodeStatus::Completed));
}

#[tokio::test]
async fn test_for_each_without_signals_maps_every_element() {
    let (flow, ids) = loop_flow(99.0, 98.0);

    let result = run(&flow).await;

    let expected: Vec<Value> = [10.0, 20.0, 30.0, 40.0, 50.0]
        .into_iter()
        .map(Value::Number)
        .collect();
    assert_eq!(main_of(&result, &ids["report"]), Some(&Value::Array(expected)));
    assert_eq!(result.trace.status(&ids["break"]), Some(NodeStatus::Skipped));
}

#[tokio::test]
async fn test_math_uses_configured_operand() {
    let flow: SpecFlow = serde_json::from_value(json!({
        "nodes": [
            { "id": "s", "type": "start" },
            { "id": "a", "type": "number", "data": { "value": 7 } },
            { "id": "m", "type": "math", "data": { "operation": "subtract", "b": 2 } }
        ],
        "edges": [
            { "id": "e1", "source": "s", "target": "a" },
            { "id": "e2", "source": "a", "target": "m", "targetHandle": "a" }
        ]
    }))
    .unwrap();

    let result = run(&flow).await;
    assert_eq!(main_of(&result, "m"), Some(&Value::Number(5.0)));
}

#[tokio::test]
async fn test_variables_are_shared_across_nodes() {
    let flow: SpecFlow = serde_json::from_value(json!({
        "nodes": [
            { "id": "s", "type": "start" },
            { "id": "v", "type": "string", "data": { "value": "hello" } },
            { "id": "set", "type": "setVariable", "data": { "name": "greeting" } },
            { "id": "get", "type": "getVariable", "data": { "name": "greeting" } },
            { "id": "missing", "type": "getVariable", "data": { "name": "nope", "default": 0 } }
        ],
        "edges": [
            { "id": "e1", "source": "s", "target": "v" },
            { "id": "e2", "source": "v", "target": "set" },
            { "id": "e3", "source": "set", "target": "get" },
            { "id": "e4", "source": "get", "target": "missing" }
        ]
    }))
    .unwrap();

    let result = run(&flow).await;
    assert_eq!(main_of(&result, "get"), Some(&Value::from("hello")));
    assert_eq!(main_of(&result, "missing"), Some(&Value::Number(0.0)));
}

#[tokio::test]
async fn test_if_branches_on_run_inputs() {
    let mut conditions = IfConditions::new(Arc::new(SequentialIds::new("c")));
    let adult = conditions.add("value.age >= 18.0");

    let mut builder = FlowBuilder::new(Arc::new(SequentialIds::new("n")));
    let start = builder.add_node("start", json!({}));
    let check = builder.add_node("if", conditions.to_data());
    let yes = builder.add_node("string", json!({ "value": "welcome" }));
    let no = builder.add_node("string", json!({ "value": "denied" }));
    builder.connect(&start, None, &check, None);
    builder.connect(&check, Some(adult.as_str()), &yes, None);
    builder.connect(&check, Some("false"), &no, None);
    let flow = builder.build();

    let runtime = runtime();
    for (age, taken, skipped) in [(30.0, &yes, &no), (12.0, &no, &yes)] {
        let inputs = HashMap::from([("age".to_string(), Value::Number(age))]);
        let result = runtime.execute(&flow, inputs).await.unwrap();
        assert_eq!(result.trace.status(taken), Some(NodeStatus::Completed));
        assert_eq!(result.trace.status(skipped), Some(NodeStatus::Skipped));
    }
}

#[tokio::test]
async fn test_end_stops_before_downstream_nodes() {
    let flow: SpecFlow = serde_json::from_value(json!({
        "nodes": [
            { "id": "s", "type": "start" },
            { "id": "stop", "type": "end" },
            { "id": "later", "type": "log", "data": { "message": "unreachable" } }
        ],
        "edges": [
            { "id": "e1", "source": "s", "target": "stop" },
            { "id": "e2", "source": "s", "target": "later" }
        ]
    }))
    .unwrap();

    let result = run(&flow).await;
    assert!(result.ended_early());
    assert_eq!(result.trace.executions_of("later"), 0);
}

#[test]
fn test_break_outside_loop_rejected() {
    let flow: SpecFlow = serde_json::from_value(json!({
        "nodes": [
            { "id": "s", "type": "start" },
            { "id": "b", "type": "break" }
        ],
        "edges": [{ "id": "e1", "source": "s", "target": "b" }]
    }))
    .unwrap();

    assert!(matches!(
        runtime().validate(&flow),
        Err(FlowError::Graph(chartcore::GraphError::LoopControlOutsideLoop { .. }))
    ));
}

#[test]
fn test_if_with_unparsable_condition_rejected() {
    let flow: SpecFlow = serde_json::from_value(json!({
        "nodes": [
            { "id": "s", "type": "start" },
            { "id": "i", "type": "if", "data": { "condition": "value >" } }
        ],
        "edges": [{ "id": "e1", "source": "s", "target": "i" }]
    }))
    .unwrap();

    match runtime().validate(&flow) {
        Err(FlowError::Schema(e)) => assert_eq!(e.node_id(), "i"),
        other => panic!("Expected schema error, got: {:?}", other),
    }
}

#[test]
fn test_migrate_flow_upgrades_v1_if_nodes() {
    let flow: SpecFlow = serde_json::from_value(json!({
        "nodes": [
            { "id": "s", "type": "start" },
            { "id": "i", "type": "if", "data": { "condition": "value > 1.0" } },
            { "id": "note", "type": "note", "data": { "text": "explains the branch" } }
        ],
        "edges": [{ "id": "e1", "source": "s", "target": "i" }]
    }))
    .unwrap();
    let runtime = runtime();

    let migrated = runtime.migrate_flow(&flow).unwrap();
    let data = &migrated.find_node("i").unwrap().data;
    assert_eq!(data["_version"], json!(2));
    assert_eq!(data["conditions"][0]["id"], json!("true"));
    assert_eq!(
        migrated.find_node("note").unwrap().data["text"],
        json!("explains the branch")
    );
    assert_eq!(runtime.migrate_flow(&migrated).unwrap(), migrated);
}

#[test]
fn test_standard_registry_contents() {
    let registry = standard_registry().unwrap();
    assert_eq!(registry.len(), 21);

    let kind = |t: &str| registry.get(t).map(|d| d.kind());
    assert_eq!(kind("start"), Some(NodeKind::Entry));
    assert!(matches!(kind("forEach"), Some(NodeKind::Loop(_))));
    assert_eq!(kind("break"), Some(NodeKind::LoopControl));
    assert_eq!(kind("continue"), Some(NodeKind::LoopControl));
    assert_eq!(kind("group"), Some(NodeKind::Visual));
    assert_eq!(kind("note"), Some(NodeKind::Visual));
    assert_eq!(kind("math"), Some(NodeKind::Regular));

    let mut again = standard_registry().unwrap();
    assert!(matches!(
        register_all(&mut again),
        Err(RegistryError::DuplicateNodeType(_))
    ));
}

#[test]
fn test_catalog_exposes_current_versions() {
    let registry = standard_registry().unwrap();
    let catalog = registry.catalog();

    let http = catalog.iter().find(|i| i.node_type == "httpRequest").unwrap();
    assert_eq!(http.version, 2);
    assert_eq!(http.default_data["method"], json!("GET"));

    let condition = catalog.iter().find(|i| i.node_type == "if").unwrap();
    assert_eq!(condition.default_data["conditions"], json!([]));
    let outputs: Vec<&str> = condition.handles.outputs.iter().map(|h| h.key()).collect();
    assert_eq!(outputs, ["false"]);
}

#[test]
fn test_handles_follow_node_data() {
    let runtime = runtime();

    let legacy_if = runtime
        .handles_for("if", &json!({ "condition": "value > 1.0" }))
        .unwrap();
    let outputs: Vec<&str> = legacy_if.outputs.iter().map(|h| h.key()).collect();
    assert_eq!(outputs, ["true", "false"]);
    assert_eq!(legacy_if.outputs[0].label.as_deref(), Some("value > 1.0"));

    let math = runtime
        .handles_for("math", &json!({ "operation": "add", "b": 3 }))
        .unwrap();
    let b = math.find_input(Some("b")).unwrap();
    assert_eq!(b.default, Some(Value::Number(3.0)));

    assert!(matches!(
        runtime.handles_for("teleport", &json!({})),
        Err(FlowError::Graph(chartcore::GraphError::UnknownNodeType { .. }))
    ));
}
