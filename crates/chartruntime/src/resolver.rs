//! Turns a persisted flow into an [`ExecutionPlan`].
//!
//! Resolution normalizes node data, type-checks every edge, decides which
//! nodes take part in the run, derives loop bodies and the loop-scope map,
//! binds inputs, and orders each region (the top level and every loop body)
//! depth-first in dependency order.

use crate::registry::{LoopPorts, NodeDefinition, NodeKind, NodeRegistry};
use chartcore::handle::handle_key;
use chartcore::{
    Cardinality, FlowError, GraphError, HandleDirection, Handles, Node, NodeError, NodeId,
    SchemaError, SpecEdge, SpecFlow, SpecNode,
};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Node to start from. Defaults to the flow's only entry node.
    pub start: Option<NodeId>,
}

impl ResolveOptions {
    pub fn starting_at(start: impl Into<NodeId>) -> Self {
        Self {
            start: Some(start.into()),
        }
    }
}

/// One incoming edge bound to an input handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    /// Input handle key on the bound node
    pub input: String,
    pub source: NodeId,
    /// Output handle key on the source
    pub source_handle: String,
    pub edge_id: String,
    /// Edge closing a loop body into the loop's `next` input
    pub back_edge: bool,
}

pub struct PlannedNode {
    pub id: NodeId,
    pub node_type: String,
    pub kind: NodeKind,
    pub data: serde_json::Value,
    pub handles: Handles,
    /// Ordered by declared input, then by edge order
    pub bindings: Vec<InputBinding>,
    pub(crate) executor: Arc<dyn Node>,
}

impl PlannedNode {
    pub fn loop_ports(&self) -> Option<LoopPorts> {
        match self.kind {
            NodeKind::Loop(ports) => Some(ports),
            _ => None,
        }
    }

    /// Bindings that take part in activation and input resolution
    pub fn forward_bindings(&self) -> impl Iterator<Item = &InputBinding> {
        self.bindings.iter().filter(|b| !b.back_edge)
    }

    pub fn back_binding(&self) -> Option<&InputBinding> {
        self.bindings.iter().find(|b| b.back_edge)
    }
}

impl std::fmt::Debug for PlannedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedNode")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("kind", &self.kind)
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// Execution-ready representation of a flow.
#[derive(Debug)]
pub struct ExecutionPlan {
    start: NodeId,
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, PlannedNode>,
    scopes: HashMap<NodeId, Vec<NodeId>>,
    bodies: HashMap<NodeId, HashSet<NodeId>>,
    regions: HashMap<Option<NodeId>, Vec<NodeId>>,
}

impl ExecutionPlan {
    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn node(&self, id: &str) -> Option<&PlannedNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Planned nodes in flow declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &PlannedNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Enclosing loops of a node, outermost first, innermost last
    pub fn scope(&self, id: &str) -> &[NodeId] {
        self.scopes.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn scope_map(&self) -> &HashMap<NodeId, Vec<NodeId>> {
        &self.scopes
    }

    /// Every node inside a loop's body, nested bodies included
    pub fn body(&self, loop_id: &str) -> Option<&HashSet<NodeId>> {
        self.bodies.get(loop_id)
    }

    pub fn loops(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|id| self.bodies.contains_key(*id))
            .map(String::as_str)
    }

    /// Direct members of a region in execution order. `None` is the top level.
    pub fn region(&self, loop_id: Option<&str>) -> &[NodeId] {
        self.regions
            .get(&loop_id.map(str::to_string))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

struct Prepared<'f> {
    spec: &'f SpecNode,
    definition: Arc<dyn NodeDefinition>,
    kind: NodeKind,
    data: serde_json::Value,
    handles: Handles,
}

/// Resolves flows against a registry
pub struct Resolver<'r> {
    registry: &'r NodeRegistry,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r NodeRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(
        &self,
        flow: &SpecFlow,
        options: &ResolveOptions,
    ) -> Result<ExecutionPlan, FlowError> {
        let (prepared, order) = self.prepare_nodes(flow)?;
        validate_edges(flow, &prepared)?;
        let start = find_start(&prepared, &order, options)?;

        let graph = EdgeIndex::new(flow, &prepared);
        let members = graph.plan_members(start, &prepared);
        let bodies = graph.loop_bodies(&members, &prepared)?;
        check_nesting(&bodies)?;
        let scopes = scope_map(&members, &bodies);

        graph.check_back_edges(&members, &bodies, &scopes)?;
        for id in &members {
            if prepared[id].kind == NodeKind::LoopControl && scopes[id].is_empty() {
                return Err(GraphError::LoopControlOutsideLoop {
                    node_id: id.to_string(),
                }
                .into());
            }
        }

        let plan_order: Vec<&str> = order
            .iter()
            .copied()
            .filter(|id| members.contains(id))
            .collect();
        let regions = graph.order_regions(&plan_order, &scopes)?;

        let mut nodes = HashMap::with_capacity(plan_order.len());
        for id in &plan_order {
            let node = &prepared[id];
            let bindings = graph.bind_inputs(node)?;
            let executor = node
                .definition
                .create(&node.data)
                .map_err(|e| creation_error(id, e))?;
            nodes.insert(
                id.to_string(),
                PlannedNode {
                    id: id.to_string(),
                    node_type: node.spec.node_type.clone(),
                    kind: node.kind,
                    data: node.data.clone(),
                    handles: node.handles.clone(),
                    bindings,
                    executor: Arc::from(executor),
                },
            );
        }

        tracing::debug!(
            start,
            nodes = nodes.len(),
            loops = bodies.len(),
            "Resolved flow"
        );

        Ok(ExecutionPlan {
            start: start.to_string(),
            order: plan_order.iter().map(|id| id.to_string()).collect(),
            nodes,
            scopes: scopes
                .into_iter()
                .map(|(id, scope)| {
                    (
                        id.to_string(),
                        scope.into_iter().map(str::to_string).collect(),
                    )
                })
                .collect(),
            bodies: bodies
                .into_iter()
                .map(|(id, body)| {
                    (
                        id.to_string(),
                        body.into_iter().map(str::to_string).collect(),
                    )
                })
                .collect(),
            regions,
        })
    }

    fn prepare_nodes<'f>(
        &self,
        flow: &'f SpecFlow,
    ) -> Result<(HashMap<&'f str, Prepared<'f>>, Vec<&'f str>), FlowError> {
        let mut prepared = HashMap::with_capacity(flow.nodes.len());
        let mut order = Vec::with_capacity(flow.nodes.len());

        for spec in &flow.nodes {
            if prepared.contains_key(spec.id.as_str()) {
                return Err(GraphError::DuplicateNodeId(spec.id.clone()).into());
            }
            let definition = self.registry.get(&spec.node_type).cloned().ok_or_else(|| {
                GraphError::UnknownNodeType {
                    node_id: spec.id.clone(),
                    type_name: spec.node_type.clone(),
                }
            })?;
            let data = definition.schema().normalize(&spec.id, &spec.data)?;
            let handles = definition.handles(&data);
            order.push(spec.id.as_str());
            prepared.insert(
                spec.id.as_str(),
                Prepared {
                    spec,
                    kind: definition.kind(),
                    definition,
                    data,
                    handles,
                },
            );
        }

        Ok((prepared, order))
    }
}

fn creation_error(node_id: &str, error: NodeError) -> SchemaError {
    match error {
        NodeError::InvalidData { field, message } => SchemaError::InvalidField {
            node_id: node_id.to_string(),
            field,
            message,
        },
        other => SchemaError::InvalidField {
            node_id: node_id.to_string(),
            field: "data".to_string(),
            message: other.to_string(),
        },
    }
}

fn validate_edges(flow: &SpecFlow, prepared: &HashMap<&str, Prepared<'_>>) -> Result<(), GraphError> {
    let mut edge_ids = HashSet::new();

    for edge in &flow.edges {
        if !edge_ids.insert(edge.id.as_str()) {
            return Err(GraphError::DuplicateEdgeId(edge.id.clone()));
        }
        let endpoint = |id: &str| {
            let node = prepared.get(id).ok_or_else(|| GraphError::DanglingEdge {
                edge_id: edge.id.clone(),
                node_id: id.to_string(),
            })?;
            if node.kind == NodeKind::Visual {
                return Err(GraphError::VisualNodeConnected {
                    edge_id: edge.id.clone(),
                    node_id: id.to_string(),
                });
            }
            Ok(node)
        };
        let source = endpoint(&edge.source)?;
        let target = endpoint(&edge.target)?;

        let output = source
            .handles
            .find_output(edge.source_handle.as_deref())
            .ok_or_else(|| GraphError::UnknownHandle {
                edge_id: edge.id.clone(),
                node_id: edge.source.clone(),
                handle: edge.source_handle.clone(),
                direction: HandleDirection::Output,
            })?;
        let input = target
            .handles
            .find_input(edge.target_handle.as_deref())
            .ok_or_else(|| GraphError::UnknownHandle {
                edge_id: edge.id.clone(),
                node_id: edge.target.clone(),
                handle: edge.target_handle.clone(),
                direction: HandleDirection::Input,
            })?;

        if !output.category.is_compatible(input.category) {
            return Err(GraphError::IncompatibleHandles {
                edge_id: edge.id.clone(),
                source_category: output.category,
                target_category: input.category,
            });
        }
    }

    Ok(())
}

fn find_start<'f>(
    prepared: &HashMap<&'f str, Prepared<'f>>,
    order: &[&'f str],
    options: &ResolveOptions,
) -> Result<&'f str, GraphError> {
    if let Some(start) = &options.start {
        return order
            .iter()
            .copied()
            .find(|id| *id == start && prepared[id].kind != NodeKind::Visual)
            .ok_or_else(|| GraphError::StartNotFound(start.clone()));
    }

    let entries: Vec<&str> = order
        .iter()
        .copied()
        .filter(|id| prepared[id].kind == NodeKind::Entry)
        .collect();
    match entries.as_slice() {
        [] => Err(GraphError::MissingStart),
        [only] => Ok(*only),
        many => Err(GraphError::AmbiguousStart(
            many.iter().map(|id| id.to_string()).collect(),
        )),
    }
}

/// Edge lookups by node, in edge declaration order.
struct EdgeIndex<'f> {
    outgoing: HashMap<&'f str, Vec<&'f SpecEdge>>,
    incoming: HashMap<&'f str, Vec<&'f SpecEdge>>,
    back_edges: HashSet<&'f str>,
}

impl<'f> EdgeIndex<'f> {
    fn new(flow: &'f SpecFlow, prepared: &HashMap<&'f str, Prepared<'f>>) -> Self {
        let mut outgoing: HashMap<&str, Vec<&SpecEdge>> = HashMap::new();
        let mut incoming: HashMap<&str, Vec<&SpecEdge>> = HashMap::new();
        let mut back_edges = HashSet::new();

        for edge in &flow.edges {
            outgoing.entry(edge.source.as_str()).or_default().push(edge);
            incoming.entry(edge.target.as_str()).or_default().push(edge);
            if let NodeKind::Loop(ports) = prepared[edge.target.as_str()].kind {
                if edge.target_handle.as_deref() == Some(ports.next) {
                    back_edges.insert(edge.id.as_str());
                }
            }
        }

        Self {
            outgoing,
            incoming,
            back_edges,
        }
    }

    fn outgoing(&self, id: &str) -> &[&'f SpecEdge] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn incoming(&self, id: &str) -> &[&'f SpecEdge] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn is_back_edge(&self, edge: &SpecEdge) -> bool {
        self.back_edges.contains(edge.id.as_str())
    }

    /// Nodes reachable from the start, closed under upstream dependencies
    /// and under the bodies of every participating loop.
    fn plan_members(
        &self,
        start: &'f str,
        prepared: &HashMap<&'f str, Prepared<'f>>,
    ) -> HashSet<&'f str> {
        let mut members = HashSet::new();
        self.walk_forward(vec![start], &mut members);

        loop {
            let before = members.len();

            let mut pending: Vec<&str> = members.iter().copied().collect();
            while let Some(id) = pending.pop() {
                for edge in self.incoming(id) {
                    if members.insert(edge.source.as_str()) {
                        pending.push(edge.source.as_str());
                    }
                }
            }

            let entries: Vec<&str> = members
                .iter()
                .filter_map(|id| match prepared[id].kind {
                    NodeKind::Loop(ports) => Some(self.body_entries(id, ports)),
                    _ => None,
                })
                .flatten()
                .filter(|id| !members.contains(id))
                .collect();
            self.walk_forward(entries, &mut members);

            if members.len() == before {
                return members;
            }
        }
    }

    fn walk_forward(&self, mut pending: Vec<&'f str>, seen: &mut HashSet<&'f str>) {
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            for edge in self.outgoing(id) {
                pending.push(edge.target.as_str());
            }
        }
    }

    fn body_entries(&self, loop_id: &str, ports: LoopPorts) -> Vec<&'f str> {
        self.outgoing(loop_id)
            .iter()
            .filter(|e| e.source_handle.as_deref() == Some(ports.body))
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Body of every loop: nodes reachable from its body output without
    /// crossing a back edge.
    fn loop_bodies(
        &self,
        members: &HashSet<&'f str>,
        prepared: &HashMap<&'f str, Prepared<'f>>,
    ) -> Result<HashMap<&'f str, HashSet<&'f str>>, GraphError> {
        let mut bodies = HashMap::new();

        for &loop_id in members {
            let NodeKind::Loop(ports) = prepared[loop_id].kind else {
                continue;
            };

            let mut body = HashSet::new();
            let mut pending = self.body_entries(loop_id, ports);
            while let Some(id) = pending.pop() {
                if id == loop_id {
                    return Err(GraphError::Cycle {
                        node_id: loop_id.to_string(),
                    });
                }
                if !body.insert(id) {
                    continue;
                }
                for edge in self.outgoing(id) {
                    if !self.is_back_edge(edge) {
                        pending.push(edge.target.as_str());
                    }
                }
            }

            for edge in self.outgoing(loop_id) {
                if edge.source_handle.as_deref() != Some(ports.body)
                    && body.contains(edge.target.as_str())
                {
                    return Err(GraphError::InvalidLoopEdge {
                        edge_id: edge.id.clone(),
                        message: format!(
                            "output {:?} of loop '{}' feeds the loop's own body",
                            edge.source_handle, loop_id
                        ),
                    });
                }
            }

            bodies.insert(loop_id, body);
        }

        Ok(bodies)
    }

    fn check_back_edges(
        &self,
        members: &HashSet<&'f str>,
        bodies: &HashMap<&'f str, HashSet<&'f str>>,
        scopes: &HashMap<&'f str, Vec<&'f str>>,
    ) -> Result<(), GraphError> {
        for &loop_id in bodies.keys() {
            for edge in self.incoming(loop_id) {
                if !self.is_back_edge(edge) {
                    continue;
                }
                let source = edge.source.as_str();
                let innermost = members
                    .contains(source)
                    .then(|| scopes[source].last().copied())
                    .flatten();
                if innermost != Some(loop_id) {
                    return Err(GraphError::InvalidLoopEdge {
                        edge_id: edge.id.clone(),
                        message: format!(
                            "back edge into loop '{}' must come from its own body",
                            loop_id
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    fn bind_inputs(&self, node: &Prepared<'f>) -> Result<Vec<InputBinding>, GraphError> {
        let id = node.spec.id.as_str();
        let incoming = self.incoming(id);
        let mut bindings = Vec::with_capacity(incoming.len());

        for input in &node.handles.inputs {
            let edges: Vec<&SpecEdge> = incoming
                .iter()
                .copied()
                .filter(|e| input.matches(e.target_handle.as_deref()))
                .collect();

            match (input.cardinality, edges.len()) {
                (Cardinality::Required, 0) => {
                    return Err(GraphError::MissingInput {
                        node_id: id.to_string(),
                        handle: input.id.clone(),
                    })
                }
                (Cardinality::Required | Cardinality::Optional, count) if count > 1 => {
                    return Err(GraphError::TooManyInputs {
                        node_id: id.to_string(),
                        handle: input.id.clone(),
                        count,
                    })
                }
                _ => {}
            }

            bindings.extend(edges.into_iter().map(|edge| InputBinding {
                input: input.key().to_string(),
                source: edge.source.clone(),
                source_handle: handle_key(edge.source_handle.as_deref()).to_string(),
                edge_id: edge.id.clone(),
                back_edge: self.is_back_edge(edge),
            }));
        }

        Ok(bindings)
    }

    /// Order the direct members of every region. Nested loop bodies collapse
    /// into their loop node; nodes of enclosing regions are already settled
    /// when a region runs and contribute no ordering constraint.
    fn order_regions(
        &self,
        plan_order: &[&'f str],
        scopes: &HashMap<&'f str, Vec<&'f str>>,
    ) -> Result<HashMap<Option<NodeId>, Vec<NodeId>>, GraphError> {
        let mut region_keys: Vec<Option<&str>> = vec![None];
        region_keys.extend(
            plan_order
                .iter()
                .copied()
                .filter(|id| scopes.values().any(|s| s.last() == Some(id)))
                .map(Some),
        );

        let mut regions = HashMap::new();
        for key in region_keys {
            let members: Vec<&str> = plan_order
                .iter()
                .copied()
                .filter(|id| scopes[id].last().copied() == key)
                .collect();
            let ordered = self.order_region(&members, key, plan_order, scopes)?;
            regions.insert(key.map(str::to_string), ordered);
        }
        Ok(regions)
    }

    fn order_region(
        &self,
        members: &[&'f str],
        region: Option<&str>,
        plan_order: &[&'f str],
        scopes: &HashMap<&'f str, Vec<&'f str>>,
    ) -> Result<Vec<NodeId>, GraphError> {
        let position: HashMap<&str, usize> =
            members.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(members.len(), 0);
        let indices: Vec<NodeIndex> = (0..members.len()).map(|i| graph.add_node(i)).collect();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
        let mut has_predecessor = vec![false; members.len()];

        for &id in plan_order {
            for edge in self.outgoing(id) {
                if self.is_back_edge(edge) {
                    continue;
                }
                let from = representative(edge.source.as_str(), region, scopes);
                let to = representative(edge.target.as_str(), region, scopes);
                let (Some(from), Some(to)) = (from, to) else {
                    continue;
                };
                if from == to {
                    continue;
                }
                let (Some(&from), Some(&to)) = (position.get(from), position.get(to)) else {
                    continue;
                };
                graph.add_edge(indices[from], indices[to], ());
                successors[from].push(to);
                has_predecessor[to] = true;
            }
        }

        toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
            node_id: members[graph[cycle.node_id()]].to_string(),
        })?;

        let roots: Vec<usize> = (0..members.len()).filter(|i| !has_predecessor[*i]).collect();
        Ok(depth_first_order(&successors, &roots)
            .into_iter()
            .map(|i| members[i].to_string())
            .collect())
    }
}

/// The node standing for `id` inside `region`: itself when it is a direct
/// member, the nested loop containing it when it sits deeper, `None` when it
/// lives outside the region.
fn representative<'f>(
    id: &'f str,
    region: Option<&str>,
    scopes: &HashMap<&'f str, Vec<&'f str>>,
) -> Option<&'f str> {
    let scope = scopes.get(id)?;
    let depth = match region {
        None => 0,
        Some(loop_id) => scope.iter().position(|l| *l == loop_id)? + 1,
    };
    Some(scope.get(depth).copied().unwrap_or(id))
}

fn check_nesting(bodies: &HashMap<&str, HashSet<&str>>) -> Result<(), GraphError> {
    for (&outer, outer_body) in bodies {
        for (&inner, inner_body) in bodies {
            if outer == inner {
                continue;
            }
            let nested = outer_body.contains(inner);
            let overlapping = !outer_body.is_disjoint(inner_body);
            let improper = if nested {
                inner_body.contains(outer) || !inner_body.is_subset(outer_body)
            } else {
                overlapping && !inner_body.contains(outer)
            };
            if improper {
                return Err(GraphError::ImproperLoopNesting {
                    outer: outer.to_string(),
                    inner: inner.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Enclosing loops per node, outermost first. Proper nesting guarantees an
/// outer body is strictly larger than any body nested in it.
fn scope_map<'f>(
    members: &HashSet<&'f str>,
    bodies: &HashMap<&'f str, HashSet<&'f str>>,
) -> HashMap<&'f str, Vec<&'f str>> {
    members
        .iter()
        .map(|&id| {
            let mut scope: Vec<&str> = bodies
                .iter()
                .filter(|(_, body)| body.contains(id))
                .map(|(loop_id, _)| *loop_id)
                .collect();
            scope.sort_by(|a, b| bodies[b].len().cmp(&bodies[a].len()).then(a.cmp(b)));
            (id, scope)
        })
        .collect()
}

/// Reverse postorder of a DAG. Roots and successors are explored last to
/// first so that the result follows declaration order depth-first.
fn depth_first_order(successors: &[Vec<usize>], roots: &[usize]) -> Vec<usize> {
    let mut visited = vec![false; successors.len()];
    let mut postorder = Vec::with_capacity(successors.len());

    let all = (0..successors.len()).rev();
    for root in roots.iter().rev().copied().chain(all) {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack = vec![(root, successors[root].len())];
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            if top.1 == 0 {
                postorder.push(node);
                stack.pop();
                continue;
            }
            top.1 -= 1;
            let child = successors[node][top.1];
            if !visited[child] {
                visited[child] = true;
                stack.push((child, successors[child].len()));
            }
        }
    }

    postorder.reverse();
    postorder
}
