use crate::executor::FlowExecutor;
use crate::registry::{NodeRegistry, NodeView};
use crate::resolver::{ExecutionPlan, ResolveOptions, Resolver};
use chartcore::{
    EventBus, ExecutionError, ExecutionEvent, FlowError, GraphError, Handles, NoticeFilter,
    NoticeFilterConfig, Notifier, RunResult, SpecFlow, TracingNotifier, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Main entry point for validating and executing flows
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    executor: FlowExecutor,
    event_bus: EventBus,
    config: RuntimeConfig,
}

impl FlowRuntime {
    /// Create a runtime over a populated registry. Notices go to `tracing`.
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        Self::with_notifier(registry, config, Arc::new(TracingNotifier))
    }

    /// Create a runtime delivering filtered notices to `notifier`
    pub fn with_notifier(
        registry: Arc<NodeRegistry>,
        config: RuntimeConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let filter = NoticeFilter::new(config.notices.clone(), notifier);
        let event_bus = EventBus::new(config.event_buffer_size).with_notifier(Arc::new(filter));
        let executor = FlowExecutor::new().with_node_timeout(config.node_timeout());

        Self {
            registry,
            executor,
            event_bus,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Resolve a flow into an execution plan without running it
    pub fn resolve(&self, flow: &SpecFlow) -> Result<ExecutionPlan, FlowError> {
        let options = ResolveOptions {
            start: self.config.start_node.clone(),
        };
        Resolver::new(&self.registry).resolve(flow, &options)
    }

    /// Check a flow for schema and graph errors
    pub fn validate(&self, flow: &SpecFlow) -> Result<(), FlowError> {
        self.resolve(flow).map(|_| ())
    }

    /// Resolve and execute a flow
    pub async fn execute(
        &self,
        flow: &SpecFlow,
        inputs: HashMap<String, Value>,
    ) -> Result<RunResult, FlowError> {
        self.execute_with_cancel(flow, inputs, CancellationToken::new())
            .await
    }

    /// Resolve and execute a flow that stops at the next node boundary once
    /// `cancellation` fires
    pub async fn execute_with_cancel(
        &self,
        flow: &SpecFlow,
        inputs: HashMap<String, Value>,
        cancellation: CancellationToken,
    ) -> Result<RunResult, FlowError> {
        let plan = self.resolve(flow)?;
        Ok(self.execute_plan(&plan, inputs, cancellation).await?)
    }

    /// Execute an already resolved plan. Plans can be run any number of times.
    pub async fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        inputs: HashMap<String, Value>,
        cancellation: CancellationToken,
    ) -> Result<RunResult, ExecutionError> {
        self.executor
            .execute(plan, &self.event_bus, inputs, cancellation)
            .await
    }

    /// The flow with every node's data migrated and normalized to its
    /// type's current schema version
    pub fn migrate_flow(&self, flow: &SpecFlow) -> Result<SpecFlow, FlowError> {
        let mut migrated = flow.clone();
        for node in &mut migrated.nodes {
            let view = self.describe(&node.id, &node.node_type, &node.data)?;
            node.data = view.data;
        }
        Ok(migrated)
    }

    /// Migrated data and current handles of one node
    pub fn describe(
        &self,
        node_id: &str,
        node_type: &str,
        data: &serde_json::Value,
    ) -> Result<NodeView, FlowError> {
        let view = self
            .registry
            .describe(node_id, node_type, data)
            .ok_or_else(|| GraphError::UnknownNodeType {
                node_id: node_id.to_string(),
                type_name: node_type.to_string(),
            })?;
        Ok(view?)
    }

    /// Handles a node of `node_type` exposes for `data`
    pub fn handles_for(
        &self,
        node_type: &str,
        data: &serde_json::Value,
    ) -> Result<Handles, FlowError> {
        self.describe(node_type, node_type, data).map(|view| view.handles)
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    /// Upper bound for a single executor invocation
    pub node_timeout_ms: Option<u64>,
    /// Explicit start node; defaults to the flow's entry node
    pub start_node: Option<String>,
    pub notices: NoticeFilterConfig,
}

impl RuntimeConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            node_timeout_ms: None,
            start_node: None,
            notices: NoticeFilterConfig::default(),
        }
    }
}
