mod common;

use chartcore::{FlowError, GraphError, HandleDirection, RegistryError, SchemaError};
use chartruntime::{NodeRegistry, ResolveOptions, Resolver};
use common::{edge, flow, new_log, node, registry, runtime};
use serde_json::json;
use std::sync::Arc;

fn graph_error(result: Result<chartruntime::ExecutionPlan, FlowError>) -> GraphError {
    match result {
        Err(FlowError::Graph(e)) => e,
        Err(other) => panic!("Expected graph error, got: {}", other),
        Ok(_) => panic!("Expected graph error, flow resolved"),
    }
}

#[test]
fn test_linear_flow_resolves() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start"), node("a", "probe"), node("b", "probe")],
        vec![edge("e1", "s", None, "a", None), edge("e2", "a", None, "b", None)],
    );

    let plan = runtime(&log).resolve(&flow).expect("Flow should resolve");

    assert_eq!(plan.start(), "s");
    assert_eq!(plan.len(), 3);
    assert_eq!(plan.region(None), ["s", "a", "b"]);
    assert!(plan.loops().next().is_none());
}

#[test]
fn test_region_order_is_depth_first() {
    let log = new_log();
    // s -> a -> c, s -> b
    let flow = flow(
        vec![
            node("s", "start"),
            node("a", "probe"),
            node("b", "probe"),
            node("c", "probe"),
        ],
        vec![
            edge("e1", "s", None, "a", None),
            edge("e2", "s", None, "b", None),
            edge("e3", "a", None, "c", None),
        ],
    );

    let plan = runtime(&log).resolve(&flow).unwrap();
    assert_eq!(plan.region(None), ["s", "a", "c", "b"]);
}

#[test]
fn test_unreachable_nodes_are_not_planned() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start"), node("a", "probe"), node("lonely", "probe")],
        vec![edge("e1", "s", None, "a", None)],
    );

    let plan = runtime(&log).resolve(&flow).unwrap();
    assert!(plan.contains("a"));
    assert!(!plan.contains("lonely"));
}

#[test]
fn test_visual_nodes_are_ignored() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start"), node("note", "note"), node("a", "probe")],
        vec![edge("e1", "s", None, "a", None)],
    );

    let plan = runtime(&log).resolve(&flow).unwrap();
    assert!(!plan.contains("note"));
}

#[test]
fn test_connected_visual_node_rejected() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start"), node("note", "note")],
        vec![edge("e1", "s", None, "note", None)],
    );

    let error = graph_error(runtime(&log).resolve(&flow));
    assert_eq!(
        error,
        GraphError::VisualNodeConnected {
            edge_id: "e1".to_string(),
            node_id: "note".to_string(),
        }
    );
}

#[test]
fn test_duplicate_ids_rejected() {
    let log = new_log();
    let nodes = flow(
        vec![node("s", "start"), node("s", "probe")],
        vec![],
    );
    assert_eq!(
        graph_error(runtime(&log).resolve(&nodes)),
        GraphError::DuplicateNodeId("s".to_string())
    );

    let edges = flow(
        vec![node("s", "start"), node("a", "probe"), node("b", "probe")],
        vec![edge("e1", "s", None, "a", None), edge("e1", "s", None, "b", None)],
    );
    assert_eq!(
        graph_error(runtime(&log).resolve(&edges)),
        GraphError::DuplicateEdgeId("e1".to_string())
    );
}

#[test]
fn test_unknown_node_type_rejected() {
    let log = new_log();
    let flow = flow(vec![node("s", "start"), node("x", "teleport")], vec![]);

    assert_eq!(
        graph_error(runtime(&log).resolve(&flow)),
        GraphError::UnknownNodeType {
            node_id: "x".to_string(),
            type_name: "teleport".to_string(),
        }
    );
}

#[test]
fn test_dangling_edge_rejected() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start")],
        vec![edge("e1", "s", None, "ghost", None)],
    );

    assert_eq!(
        graph_error(runtime(&log).resolve(&flow)),
        GraphError::DanglingEdge {
            edge_id: "e1".to_string(),
            node_id: "ghost".to_string(),
        }
    );
}

#[test]
fn test_unknown_handle_rejected() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start"), node("a", "probe")],
        vec![edge("e1", "s", None, "a", Some("nope"))],
    );

    assert_eq!(
        graph_error(runtime(&log).resolve(&flow)),
        GraphError::UnknownHandle {
            edge_id: "e1".to_string(),
            node_id: "a".to_string(),
            handle: Some("nope".to_string()),
            direction: HandleDirection::Input,
        }
    );
}

#[test]
fn test_incompatible_categories_rejected() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start"), node("f", "flag"), node("u", "upper")],
        vec![edge("e1", "s", None, "f", None), edge("e2", "f", None, "u", None)],
    );

    let error = graph_error(runtime(&log).resolve(&flow));
    assert!(
        matches!(error, GraphError::IncompatibleHandles { ref edge_id, .. } if edge_id == "e2"),
        "Boolean output must not feed a text input, got: {:?}",
        error
    );
}

#[test]
fn test_any_input_accepts_every_category() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start"), node("f", "flag"), node("p", "probe")],
        vec![edge("e1", "s", None, "f", None), edge("e2", "f", None, "p", None)],
    );

    assert!(runtime(&log).resolve(&flow).is_ok());
}

#[test]
fn test_missing_required_input_rejected() {
    let log = new_log();
    let flow = flow(vec![node("s", "start"), node("u", "upper")], vec![]);

    let registry = registry(&log);
    let result = Resolver::new(&registry).resolve(&flow, &ResolveOptions::starting_at("u"));

    assert_eq!(
        graph_error(result),
        GraphError::MissingInput {
            node_id: "u".to_string(),
            handle: None,
        }
    );
}

#[test]
fn test_too_many_inputs_rejected() {
    let log = new_log();
    let flow = flow(
        vec![
            node("s", "start"),
            node("a", "probe"),
            node("b", "probe"),
            node("c", "probe"),
        ],
        vec![
            edge("e1", "s", None, "a", None),
            edge("e2", "s", None, "b", None),
            edge("e3", "a", None, "c", None),
            edge("e4", "b", None, "c", None),
        ],
    );

    assert_eq!(
        graph_error(runtime(&log).resolve(&flow)),
        GraphError::TooManyInputs {
            node_id: "c".to_string(),
            handle: None,
            count: 2,
        }
    );
}

#[test]
fn test_many_input_takes_several_edges() {
    let log = new_log();
    let flow = flow(
        vec![
            node("s", "start"),
            node("a", "probe"),
            node("b", "probe"),
            node("j", "join"),
        ],
        vec![
            edge("e1", "s", None, "a", None),
            edge("e2", "s", None, "b", None),
            edge("e3", "b", None, "j", None),
            edge("e4", "a", None, "j", None),
        ],
    );

    let plan = runtime(&log).resolve(&flow).unwrap();
    let join = plan.node("j").unwrap();
    let sources: Vec<&str> = join.bindings.iter().map(|b| b.source.as_str()).collect();
    assert_eq!(sources, ["b", "a"], "Bindings keep edge order");
}

#[test]
fn test_cycle_outside_loop_rejected() {
    let log = new_log();
    let flow = flow(
        vec![node("s", "start"), node("j1", "join"), node("j2", "join")],
        vec![
            edge("e1", "s", None, "j1", None),
            edge("e2", "j1", None, "j2", None),
            edge("e3", "j2", None, "j1", None),
        ],
    );

    let error = graph_error(runtime(&log).resolve(&flow));
    assert!(matches!(error, GraphError::Cycle { .. }), "got: {:?}", error);
}

#[test]
fn test_start_selection() {
    let log = new_log();

    let none = flow(vec![node("a", "probe")], vec![]);
    assert_eq!(graph_error(runtime(&log).resolve(&none)), GraphError::MissingStart);

    let two = flow(vec![node("s1", "start"), node("s2", "start")], vec![]);
    assert_eq!(
        graph_error(runtime(&log).resolve(&two)),
        GraphError::AmbiguousStart(vec!["s1".to_string(), "s2".to_string()])
    );

    let registry = registry(&log);
    let resolver = Resolver::new(&registry);
    let plan = resolver
        .resolve(&two, &ResolveOptions::starting_at("s2"))
        .expect("Explicit start disambiguates");
    assert_eq!(plan.start(), "s2");

    assert!(matches!(
        resolver.resolve(&two, &ResolveOptions::starting_at("missing")),
        Err(FlowError::Graph(GraphError::StartNotFound(_)))
    ));
}

#[test]
fn test_loop_control_outside_loop_rejected() {
    let log = new_log();
    let flow = flow(
        vec![
            node("s", "start"),
            node("brk", "breakOn").with_data(json!({ "equals": 1 })),
        ],
        vec![edge("e1", "s", None, "brk", None)],
    );

    assert_eq!(
        graph_error(runtime(&log).resolve(&flow)),
        GraphError::LoopControlOutsideLoop {
            node_id: "brk".to_string(),
        }
    );
}

/// s -> list -> outer; outer.item -> inner.items; inner.item -> brk -> ip;
/// inner.done -> oa; outer.done -> after
fn nested_loops() -> chartcore::SpecFlow {
    flow(
        vec![
            node("s", "start"),
            node("list", "emit").with_data(json!({ "value": [[1, 2, 3], [4, 5]] })),
            node("outer", "loop"),
            node("inner", "loop"),
            node("brk", "breakOn").with_data(json!({ "equals": 2 })),
            node("ip", "probe"),
            node("oa", "probe"),
            node("after", "probe"),
        ],
        vec![
            edge("e1", "s", None, "list", None),
            edge("e2", "list", None, "outer", Some("items")),
            edge("e3", "outer", Some("item"), "inner", Some("items")),
            edge("e4", "inner", Some("item"), "brk", None),
            edge("e5", "brk", None, "ip", None),
            edge("e6", "inner", Some("done"), "oa", None),
            edge("e7", "outer", Some("done"), "after", None),
        ],
    )
}

#[test]
fn test_scope_stacks_follow_loop_nesting() {
    let log = new_log();
    let plan = runtime(&log).resolve(&nested_loops()).unwrap();

    assert_eq!(plan.scope("s"), [] as [&str; 0]);
    assert_eq!(plan.scope("outer"), [] as [&str; 0]);
    assert_eq!(plan.scope("inner"), ["outer"]);
    assert_eq!(plan.scope("oa"), ["outer"]);
    assert_eq!(plan.scope("brk"), ["outer", "inner"]);
    assert_eq!(plan.scope("ip"), ["outer", "inner"]);
    assert_eq!(plan.scope("after"), [] as [&str; 0]);

    assert_eq!(plan.region(None), ["s", "list", "outer", "after"]);
    assert_eq!(plan.region(Some("outer")), ["inner", "oa"]);
    assert_eq!(plan.region(Some("inner")), ["brk", "ip"]);
}

#[test]
fn test_back_edge_from_outside_body_rejected() {
    let log = new_log();
    let flow = flow(
        vec![
            node("s", "start"),
            node("list", "emit").with_data(json!({ "value": [1] })),
            node("l", "loop"),
            node("body", "probe"),
            node("outside", "probe"),
        ],
        vec![
            edge("e1", "s", None, "list", None),
            edge("e2", "list", None, "l", Some("items")),
            edge("e3", "l", Some("item"), "body", None),
            edge("e4", "s", None, "outside", None),
            edge("e5", "outside", None, "l", Some("next")),
        ],
    );

    let error = graph_error(runtime(&log).resolve(&flow));
    assert!(
        matches!(error, GraphError::InvalidLoopEdge { ref edge_id, .. } if edge_id == "e5"),
        "got: {:?}",
        error
    );
}

#[test]
fn test_loop_output_into_own_body_rejected() {
    let log = new_log();
    let flow = flow(
        vec![
            node("s", "start"),
            node("list", "emit").with_data(json!({ "value": [1] })),
            node("l", "loop"),
            node("j", "join"),
        ],
        vec![
            edge("e1", "s", None, "list", None),
            edge("e2", "list", None, "l", Some("items")),
            edge("e3", "l", Some("item"), "j", None),
            edge("e4", "l", Some("done"), "j", None),
        ],
    );

    let error = graph_error(runtime(&log).resolve(&flow));
    assert!(
        matches!(error, GraphError::InvalidLoopEdge { ref edge_id, .. } if edge_id == "e4"),
        "got: {:?}",
        error
    );
}

#[test]
fn test_overlapping_loop_bodies_rejected() {
    let log = new_log();
    let flow = flow(
        vec![
            node("s", "start"),
            node("list", "emit").with_data(json!({ "value": [1] })),
            node("l1", "loop"),
            node("l2", "loop"),
            node("shared", "join"),
        ],
        vec![
            edge("e1", "s", None, "list", None),
            edge("e2", "list", None, "l1", Some("items")),
            edge("e3", "list", None, "l2", Some("items")),
            edge("e4", "l1", Some("item"), "shared", None),
            edge("e5", "l2", Some("item"), "shared", None),
        ],
    );

    let error = graph_error(runtime(&log).resolve(&flow));
    assert!(
        matches!(error, GraphError::ImproperLoopNesting { .. }),
        "got: {:?}",
        error
    );
}

#[test]
fn test_node_data_is_migrated_during_resolution() {
    let log = new_log();
    let flow = flow(
        vec![
            node("s", "start"),
            node("v", "versioned").with_data(json!({ "x": 3 })),
        ],
        vec![edge("e1", "s", None, "v", None)],
    );

    let plan = runtime(&log).resolve(&flow).unwrap();
    let data = &plan.node("v").unwrap().data;
    assert_eq!(data["y"], json!(3));
    assert_eq!(data["z"], json!("added"));
    assert_eq!(data["_version"], json!(3));
    assert!(data.get("x").is_none());
}

#[test]
fn test_invalid_node_data_is_schema_error() {
    let log = new_log();
    let flow = flow(
        vec![
            node("s", "start"),
            node("v", "versioned").with_data(json!({ "_version": 3 })),
        ],
        vec![edge("e1", "s", None, "v", None)],
    );

    match runtime(&log).resolve(&flow) {
        Err(FlowError::Schema(SchemaError::MissingField { node_id, field })) => {
            assert_eq!(node_id, "v");
            assert_eq!(field, "y");
        }
        other => panic!("Expected missing field, got: {:?}", other.map(|p| p.len())),
    }

    let future = flow_with_version(9);
    assert!(matches!(
        runtime(&log).resolve(&future),
        Err(FlowError::Schema(SchemaError::UnsupportedVersion { found: 9, current: 3, .. }))
    ));
}

fn flow_with_version(version: u32) -> chartcore::SpecFlow {
    flow(
        vec![
            node("s", "start"),
            node("v", "versioned").with_data(json!({ "_version": version, "y": 1 })),
        ],
        vec![edge("e1", "s", None, "v", None)],
    )
}

#[test]
fn test_migrate_flow_is_idempotent() {
    let log = new_log();
    let runtime = runtime(&log);
    let flow = flow(
        vec![
            node("s", "start"),
            node("v", "versioned").with_data(json!({ "x": 7 })),
        ],
        vec![edge("e1", "s", None, "v", None)],
    );

    let once = runtime.migrate_flow(&flow).unwrap();
    let twice = runtime.migrate_flow(&once).unwrap();

    assert_eq!(once, twice);
    assert_eq!(once.edges, flow.edges);
    assert_eq!(once.find_node("v").unwrap().data["y"], json!(7));
}

#[test]
fn test_registry_rejects_duplicate_types() {
    let log = new_log();
    let mut registry = registry(&log);
    let before = registry.len();

    let probe = Arc::clone(registry.get("probe").unwrap());
    assert_eq!(
        registry.register(probe).unwrap_err(),
        RegistryError::DuplicateNodeType("probe".to_string())
    );
    assert_eq!(registry.len(), before);
    assert!(registry.get("teleport").is_none());
    assert!(NodeRegistry::new().is_empty());
}

#[test]
fn test_describe_unknown_type_fails() {
    let log = new_log();
    let result = runtime(&log).describe("n1", "teleport", &json!({}));
    assert!(matches!(
        result,
        Err(FlowError::Graph(GraphError::UnknownNodeType { .. }))
    ));
}

#[test]
fn test_catalog_lists_defaults() {
    let log = new_log();
    let registry = registry(&log);
    let catalog = registry.catalog();

    let types: Vec<&str> = catalog.iter().map(|i| i.node_type.as_str()).collect();
    let mut sorted = types.clone();
    sorted.sort();
    assert_eq!(types, sorted, "Catalog is sorted by type");

    let sleep = catalog.iter().find(|i| i.node_type == "sleep").unwrap();
    assert_eq!(sleep.default_data["ms"], json!(10));
    assert_eq!(sleep.default_data["_version"], json!(1));
}
