//! Core abstractions for the flowchart engine
//!
//! This crate provides the flow data model, the executor contract, the
//! handle type system and the schema/migration layer that every other
//! component depends on. It has no runtime dependencies.

mod error;
pub mod events;
pub mod flow;
pub mod handle;
pub mod ids;
mod node;
pub mod run;
pub mod schema;
mod value;

pub use error::{
    ExecutionError, FlowError, GraphError, HandleDirection, NodeError, RegistryError, SchemaError,
};
pub use events::*;
pub use flow::{FlowBuilder, SpecEdge, SpecFlow, SpecNode};
pub use handle::{Cardinality, HandleCategory, HandleSpec, Handles, UNNAMED_HANDLE};
pub use ids::{IdSource, SequentialIds, UuidSource};
pub use node::{Node, NodeContext, NodeId, NodeOutputs, NodeResult, Variables};
pub use run::{NodeStatus, NodeVisit, RunOutcome, RunResult, RunTrace, Signal};
pub use schema::{DataSchema, FieldIssue, FieldKind};
pub use value::Value;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
