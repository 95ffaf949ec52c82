//! Standard node library
//!
//! Built-in node types: control flow (start, if, forEach, break, continue,
//! end), annotations, constants, transforms, run variables and I/O.

mod condition;
mod constant;
mod control;
mod data;
mod debug;
mod http;
mod iterate;
mod time;
mod transform;
mod variables;
mod visual;

pub use condition::{IfConditions, IfDefinition, IfNode, FALSE_HANDLE};
pub use constant::{ConstantDefinition, ConstantNode};
pub use control::{EndDefinition, LoopSignalDefinition, StartDefinition};
pub use debug::{LogDefinition, LogNode};
pub use http::{HttpRequestDefinition, HttpRequestNode};
pub use iterate::{ForEachDefinition, FOR_EACH_PORTS};
pub use time::{DelayDefinition, DelayNode};
pub use transform::{
    JsonParseDefinition, JsonStringifyDefinition, MathDefinition, MathOperation, MergeDefinition,
};
pub use variables::{GetVariableDefinition, SetVariableDefinition};
pub use visual::VisualDefinition;

use chartcore::RegistryError;
use chartruntime::NodeRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(StartDefinition))?;
    registry.register(Arc::new(IfDefinition))?;
    registry.register(Arc::new(ForEachDefinition))?;
    registry.register(Arc::new(LoopSignalDefinition::Break))?;
    registry.register(Arc::new(LoopSignalDefinition::Continue))?;
    registry.register(Arc::new(EndDefinition))?;
    registry.register(Arc::new(VisualDefinition::Group))?;
    registry.register(Arc::new(VisualDefinition::Note))?;
    registry.register(Arc::new(ConstantDefinition::String))?;
    registry.register(Arc::new(ConstantDefinition::Number))?;
    registry.register(Arc::new(ConstantDefinition::Boolean))?;
    registry.register(Arc::new(ConstantDefinition::Json))?;
    registry.register(Arc::new(JsonParseDefinition))?;
    registry.register(Arc::new(JsonStringifyDefinition))?;
    registry.register(Arc::new(MathDefinition))?;
    registry.register(Arc::new(MergeDefinition))?;
    registry.register(Arc::new(GetVariableDefinition))?;
    registry.register(Arc::new(SetVariableDefinition))?;
    registry.register(Arc::new(LogDefinition))?;
    registry.register(Arc::new(DelayDefinition))?;
    registry.register(Arc::new(HttpRequestDefinition))?;
    Ok(())
}

/// A registry holding every standard node type
pub fn standard_registry() -> Result<NodeRegistry, RegistryError> {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}
