//! Flow execution runtime
//!
//! This crate provides the node registry, the graph resolver that turns a
//! persisted flow into an execution plan, and the engine that runs plans
//! with branch, loop and early-end semantics.

mod executor;
pub mod loader;
pub mod registry;
mod resolver;
mod runtime;

pub use executor::FlowExecutor;
pub use loader::{load_flow, load_flow_dir, save_flow};
pub use registry::{
    LoopPorts, NodeDefinition, NodeKind, NodeMetadata, NodeRegistry, NodeTypeInfo, NodeView,
};
pub use resolver::{ExecutionPlan, InputBinding, PlannedNode, ResolveOptions, Resolver};
pub use runtime::{FlowRuntime, RuntimeConfig};
