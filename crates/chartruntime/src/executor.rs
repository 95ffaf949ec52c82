use crate::registry::LoopPorts;
use crate::resolver::{ExecutionPlan, InputBinding, PlannedNode};
use chartcore::{
    Cardinality, EventBus, ExecutionError, ExecutionEvent, ExecutionId, HandleCategory,
    NodeContext, NodeError, NodeId, NodeOutputs, NodeResult, NodeStatus, NodeVisit, RunOutcome,
    RunResult, RunTrace, Signal, Value, Variables,
};
use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Executes resolved flows sequentially along their control path
#[derive(Debug, Clone, Default)]
pub struct FlowExecutor {
    node_timeout: Option<Duration>,
}

impl FlowExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every executor invocation
    pub fn with_node_timeout(mut self, node_timeout: Option<Duration>) -> Self {
        self.node_timeout = node_timeout;
        self
    }

    /// Run a plan to completion, early end or first failure
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        event_bus: &EventBus,
        inputs: HashMap<String, Value>,
        cancellation: CancellationToken,
    ) -> Result<RunResult, ExecutionError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::RunStarted {
            execution_id,
            start_node: plan.start().to_string(),
            timestamp: Utc::now(),
        });
        tracing::info!(%execution_id, start = plan.start(), "Starting flow execution");

        let mut run = Run {
            plan,
            bus: event_bus.clone(),
            execution_id,
            run_inputs: Arc::new(inputs),
            variables: Arc::new(RwLock::new(Variables::default())),
            cancellation,
            node_timeout: self.node_timeout,
            frames: vec![Frame::new()],
            iteration: Vec::new(),
            trace: RunTrace::default(),
        };
        for node in plan.nodes() {
            run.trace.statuses.insert(node.id.clone(), NodeStatus::Pending);
        }

        let exit = run.run_region(None).await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        match exit {
            Ok(RegionExit::End(node_id)) => {
                tracing::info!(%execution_id, %node_id, duration_ms, "Flow ended early");
                event_bus.emit(ExecutionEvent::RunEnded {
                    execution_id,
                    node_id: node_id.clone(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Ok(run.finish(RunOutcome::Ended { node_id }, duration_ms))
            }
            // Loop signals never leave the top region, see `Run::visit`.
            Ok(_) => {
                tracing::info!(%execution_id, duration_ms, "Flow completed");
                event_bus.emit(ExecutionEvent::RunCompleted {
                    execution_id,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Ok(run.finish(RunOutcome::Completed, duration_ms))
            }
            Err(Failure { node_id, cause }) => {
                tracing::error!(%execution_id, %node_id, error = %cause, "Flow failed");
                event_bus.emit(ExecutionEvent::RunFailed {
                    execution_id,
                    node_id: node_id.clone(),
                    error: cause.to_string(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
                Err(ExecutionError {
                    node_id,
                    cause,
                    trace: Box::new(run.trace),
                })
            }
        }
    }
}

/// Completed visit as seen by downstream bindings
struct Completed {
    outputs: NodeOutputs,
    branch: Option<String>,
}

/// Completions of one region pass. Loop iterations push a fresh frame.
type Frame = HashMap<NodeId, Completed>;

enum RegionExit {
    Finished,
    Break,
    Continue,
    End(NodeId),
}

enum Step {
    Next,
    Exit(RegionExit),
}

struct Failure {
    node_id: NodeId,
    cause: NodeError,
}

/// State of one execution
struct Run<'p> {
    plan: &'p ExecutionPlan,
    bus: EventBus,
    execution_id: ExecutionId,
    run_inputs: Arc<HashMap<String, Value>>,
    variables: Arc<RwLock<Variables>>,
    cancellation: CancellationToken,
    node_timeout: Option<Duration>,
    frames: Vec<Frame>,
    /// Element index of every enclosing loop, outermost first
    iteration: Vec<usize>,
    trace: RunTrace,
}

impl<'p> Run<'p> {
    fn finish(self, outcome: RunOutcome, duration_ms: u64) -> RunResult {
        RunResult {
            execution_id: self.execution_id,
            outcome,
            duration_ms,
            trace: self.trace,
        }
    }

    fn run_region<'a>(
        &'a mut self,
        region: Option<&'p str>,
    ) -> BoxFuture<'a, Result<RegionExit, Failure>> {
        Box::pin(async move {
            let plan = self.plan;
            for id in plan.region(region) {
                let Some(node) = plan.node(id) else {
                    continue;
                };

                if !self.is_active(node) {
                    self.skip(node);
                    continue;
                }

                let step = match node.loop_ports() {
                    Some(ports) => self.visit_loop(node, ports).await?,
                    None => self.visit(node, region).await?,
                };
                if let Step::Exit(exit) = step {
                    return Ok(exit);
                }
            }
            Ok(RegionExit::Finished)
        })
    }

    async fn visit(
        &mut self,
        node: &'p PlannedNode,
        region: Option<&'p str>,
    ) -> Result<Step, Failure> {
        let started = self.start(node);

        let result = self.invoke(node).await.and_then(|result| match result {
            NodeResult::LoopBreak | NodeResult::LoopContinue if region.is_none() => Err(
                NodeError::ExecutionFailed("loop control signal outside of any loop".to_string()),
            ),
            NodeResult::Branch { ref handle, .. }
                if !node.handles.outputs.iter().any(|h| h.key() == handle.as_str()) =>
            {
                Err(NodeError::ExecutionFailed(format!(
                    "branch to undeclared output '{}'",
                    handle
                )))
            }
            other => Ok(other),
        });

        match result {
            Ok(NodeResult::Outputs(outputs)) => {
                self.complete(node, outputs, None, started);
                Ok(Step::Next)
            }
            Ok(NodeResult::Branch { handle, outputs }) => {
                tracing::debug!(node_id = %node.id, %handle, "Branch selected");
                self.complete(node, outputs, Some(Signal::Branch(handle)), started);
                Ok(Step::Next)
            }
            Ok(NodeResult::LoopBreak) => {
                self.complete(node, NodeOutputs::new(), Some(Signal::LoopBreak), started);
                Ok(Step::Exit(RegionExit::Break))
            }
            Ok(NodeResult::LoopContinue) => {
                self.complete(node, NodeOutputs::new(), Some(Signal::LoopContinue), started);
                Ok(Step::Exit(RegionExit::Continue))
            }
            Ok(NodeResult::FlowEnd) => {
                self.complete(node, NodeOutputs::new(), Some(Signal::FlowEnd), started);
                Ok(Step::Exit(RegionExit::End(node.id.clone())))
            }
            Err(cause) => Err(self.fail(node, cause, started)),
        }
    }

    async fn visit_loop(
        &mut self,
        node: &'p PlannedNode,
        ports: LoopPorts,
    ) -> Result<Step, Failure> {
        let started = self.start(node);

        let mut outputs = match self.invoke(node).await {
            Ok(NodeResult::Outputs(outputs)) => outputs,
            Ok(_) => {
                let cause = NodeError::ExecutionFailed(
                    "loop executors must produce outputs".to_string(),
                );
                return Err(self.fail(node, cause, started));
            }
            Err(cause) => return Err(self.fail(node, cause, started)),
        };
        let elements = match outputs.values.remove(ports.body) {
            Some(Value::Array(elements)) => elements,
            other => {
                let cause = NodeError::InvalidInputType {
                    field: ports.body.to_string(),
                    expected: "array".to_string(),
                    actual: other.as_ref().map_or("nothing", Value::type_name).to_string(),
                };
                return Err(self.fail(node, cause, started));
            }
        };

        if elements.is_empty() {
            tracing::debug!(node_id = %node.id, "Empty collection, skipping loop body");
            self.skip_body(node);
        }

        let total = elements.len();
        let back = node.back_binding();
        let mut done = Vec::with_capacity(total);
        let mut exit = None;

        for (index, element) in elements.into_iter().enumerate() {
            if self.cancellation.is_cancelled() {
                return Err(self.fail(node, NodeError::Cancelled, started));
            }

            self.bus.emit(ExecutionEvent::LoopIteration {
                execution_id: self.execution_id,
                node_id: node.id.clone(),
                index,
                total,
                timestamp: Utc::now(),
            });
            tracing::debug!(node_id = %node.id, index, total, "Loop iteration");

            let mut frame = Frame::new();
            frame.insert(
                node.id.clone(),
                Completed {
                    outputs: NodeOutputs::new().with_output(ports.body, element.clone()),
                    branch: None,
                },
            );
            self.frames.push(frame);
            self.iteration.push(index);
            let result = self.run_region(Some(&node.id)).await;
            let collected = match (&result, back) {
                (Ok(RegionExit::Finished), Some(binding)) => self.live_value(binding).cloned(),
                _ => None,
            };
            self.iteration.pop();
            self.frames.pop();

            match result? {
                RegionExit::Finished => {
                    if back.is_none() {
                        done.push(element);
                    } else if let Some(value) = collected {
                        done.push(value);
                    }
                }
                RegionExit::Continue => {
                    if back.is_none() {
                        done.push(element);
                    }
                }
                RegionExit::Break => {
                    if back.is_none() {
                        done.push(element);
                    }
                    tracing::debug!(node_id = %node.id, index, "Loop broken");
                    break;
                }
                RegionExit::End(end_node) => {
                    exit = Some(end_node);
                    break;
                }
            }
        }

        outputs.insert(ports.done, Value::Array(done));
        self.complete(node, outputs, None, started);
        Ok(match exit {
            Some(end_node) => Step::Exit(RegionExit::End(end_node)),
            None => Step::Next,
        })
    }

    async fn invoke(&self, node: &'p PlannedNode) -> Result<NodeResult, NodeError> {
        if self.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }

        let ctx = NodeContext {
            node_id: node.id.clone(),
            inputs: self.resolve_inputs(node)?,
            data: node.data.clone(),
            run_inputs: self.run_inputs.clone(),
            variables: self.variables.clone(),
            events: self.bus.create_emitter(self.execution_id, node.id.clone()),
            cancellation: self.cancellation.child_token(),
        };

        let call = async {
            match self.node_timeout {
                Some(limit) => match timeout(limit, node.executor.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(NodeError::Timeout {
                        millis: limit.as_millis() as u64,
                    }),
                },
                None => node.executor.execute(ctx).await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(NodeError::Cancelled),
            result = call => result,
        }
    }

    /// Input values keyed by input handle, in declared order
    fn resolve_inputs(&self, node: &PlannedNode) -> Result<HashMap<String, Value>, NodeError> {
        let mut inputs = HashMap::with_capacity(node.handles.inputs.len());

        for input in &node.handles.inputs {
            let key = input.key();
            let mut values = Vec::new();
            let mut live = false;
            for binding in node.forward_bindings().filter(|b| b.input == key) {
                if !self.is_live(binding) {
                    continue;
                }
                live = true;
                if let Some(value) = self.live_value(binding) {
                    values.push(value.clone());
                }
            }

            if input.cardinality == Cardinality::Many {
                for value in &values {
                    check_category(key, input.category, value)?;
                }
                inputs.insert(key.to_string(), Value::Array(values));
                continue;
            }

            match values.into_iter().next().or_else(|| input.default.clone()) {
                Some(value) => {
                    check_category(key, input.category, &value)?;
                    inputs.insert(key.to_string(), value);
                }
                None if live && input.cardinality == Cardinality::Required => {
                    return Err(NodeError::MissingInput(key.to_string()));
                }
                None => {}
            }
        }

        Ok(inputs)
    }

    fn lookup(&self, node_id: &str) -> Option<&Completed> {
        self.frames.iter().rev().find_map(|frame| frame.get(node_id))
    }

    fn is_live(&self, binding: &InputBinding) -> bool {
        self.lookup(&binding.source).is_some_and(|completed| {
            completed
                .branch
                .as_deref()
                .map_or(true, |handle| handle == binding.source_handle)
        })
    }

    fn live_value(&self, binding: &InputBinding) -> Option<&Value> {
        if !self.is_live(binding) {
            return None;
        }
        self.lookup(&binding.source)?
            .outputs
            .get(&binding.source_handle)
    }

    fn is_active(&self, node: &PlannedNode) -> bool {
        if node.forward_bindings().next().is_none() {
            return true;
        }
        let any_live = node.forward_bindings().any(|b| self.is_live(b));
        let required_live = node
            .handles
            .inputs
            .iter()
            .filter(|h| h.cardinality == Cardinality::Required)
            .all(|h| {
                node.forward_bindings()
                    .any(|b| b.input == h.key() && self.is_live(b))
            });
        any_live && required_live
    }

    fn start(&mut self, node: &PlannedNode) -> Instant {
        tracing::debug!(node_id = %node.id, node_type = %node.node_type, "Executing node");
        self.bus.emit(ExecutionEvent::NodeStarted {
            execution_id: self.execution_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            timestamp: Utc::now(),
        });
        self.trace
            .statuses
            .insert(node.id.clone(), NodeStatus::Running);
        Instant::now()
    }

    fn complete(
        &mut self,
        node: &PlannedNode,
        outputs: NodeOutputs,
        signal: Option<Signal>,
        started: Instant,
    ) {
        let duration_ms = started.elapsed().as_millis() as u64;
        self.bus.emit(ExecutionEvent::NodeCompleted {
            execution_id: self.execution_id,
            node_id: node.id.clone(),
            outputs: outputs.values.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        self.record(node, NodeStatus::Completed, signal.clone(), duration_ms);
        self.trace.outputs.insert(node.id.clone(), outputs.clone());

        let branch = match signal {
            Some(Signal::Branch(handle)) => Some(handle),
            _ => None,
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(node.id.clone(), Completed { outputs, branch });
        }
    }

    fn fail(&mut self, node: &PlannedNode, cause: NodeError, started: Instant) -> Failure {
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::warn!(node_id = %node.id, error = %cause, "Node failed");
        self.bus.emit(ExecutionEvent::NodeFailed {
            execution_id: self.execution_id,
            node_id: node.id.clone(),
            error: cause.to_string(),
            timestamp: Utc::now(),
        });
        self.record(node, NodeStatus::Failed, None, duration_ms);
        Failure {
            node_id: node.id.clone(),
            cause,
        }
    }

    fn skip(&mut self, node: &PlannedNode) {
        self.mark_skipped(&node.id);
        if node.loop_ports().is_some() {
            self.skip_body(node);
        }
    }

    fn skip_body(&mut self, node: &PlannedNode) {
        let plan = self.plan;
        let Some(body) = plan.body(&node.id) else {
            return;
        };
        for member in plan.nodes().filter(|n| body.contains(&n.id)) {
            self.mark_skipped(&member.id);
        }
    }

    fn mark_skipped(&mut self, node_id: &str) {
        tracing::debug!(node_id, "Skipping node");
        self.bus.emit(ExecutionEvent::NodeSkipped {
            execution_id: self.execution_id,
            node_id: node_id.to_string(),
            timestamp: Utc::now(),
        });
        self.trace.visits.push(NodeVisit {
            node_id: node_id.to_string(),
            iteration: self.iteration.clone(),
            status: NodeStatus::Skipped,
            signal: None,
            duration_ms: 0,
        });
        self.trace
            .statuses
            .insert(node_id.to_string(), NodeStatus::Skipped);
    }

    fn record(
        &mut self,
        node: &PlannedNode,
        status: NodeStatus,
        signal: Option<Signal>,
        duration_ms: u64,
    ) {
        self.trace.visits.push(NodeVisit {
            node_id: node.id.clone(),
            iteration: self.iteration.clone(),
            status,
            signal,
            duration_ms,
        });
        self.trace.statuses.insert(node.id.clone(), status);
    }
}

fn check_category(
    field: &str,
    category: HandleCategory,
    value: &Value,
) -> Result<(), NodeError> {
    if category.accepts_value(value) {
        return Ok(());
    }
    Err(NodeError::InvalidInputType {
        field: field.to_string(),
        expected: category.to_string(),
        actual: value.type_name().to_string(),
    })
}
