use crate::events::notify::{Level, Notice, Notifier};
use crate::{NodeId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during flow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: ExecutionId,
        start_node: NodeId,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        execution_id: ExecutionId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RunEnded {
        execution_id: ExecutionId,
        node_id: NodeId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RunFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        error: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
        node_type: String,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
        outputs: std::collections::HashMap<String, Value>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeSkipped {
        execution_id: ExecutionId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    LoopIteration {
        execution_id: ExecutionId,
        node_id: NodeId,
        index: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        execution_id: ExecutionId,
        node_id: NodeId,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Leveled notice for the notification collaborator, if this event is
    /// user-facing.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            ExecutionEvent::RunStarted { start_node, .. } => Some(Notice::new(
                Level::Info,
                "run",
                format!("Flow started at node {}", start_node),
            )),
            ExecutionEvent::RunCompleted { duration_ms, .. } => Some(Notice::new(
                Level::Success,
                "run",
                format!("Flow completed in {}ms", duration_ms),
            )),
            ExecutionEvent::RunEnded { node_id, .. } => Some(Notice::new(
                Level::Success,
                "run",
                format!("Flow ended early at node {}", node_id),
            )),
            ExecutionEvent::RunFailed { node_id, error, .. } => Some(Notice::new(
                Level::Error,
                "run",
                format!("Flow failed at node {}: {}", node_id, error),
            )),
            ExecutionEvent::NodeCompleted {
                node_id,
                duration_ms,
                ..
            } => Some(Notice::new(
                Level::Info,
                "node",
                format!("Node {} completed in {}ms", node_id, duration_ms),
            )),
            ExecutionEvent::NodeFailed { node_id, error, .. } => Some(Notice::new(
                Level::Error,
                "node",
                format!("Node {} failed: {}", node_id, error),
            )),
            ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                NodeEvent::Info { message } => Some(Notice::new(
                    Level::Info,
                    "log",
                    format!("[{}] {}", node_id, message),
                )),
                NodeEvent::Warning { message } => Some(Notice::new(
                    Level::Warning,
                    "log",
                    format!("[{}] {}", node_id, message),
                )),
            },
            _ => None,
        }
    }
}

/// Events specific to node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
}

/// Event emitter for nodes to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    node_id: NodeId,
    bus: EventBus,
}

impl EventEmitter {
    pub fn new(execution_id: ExecutionId, node_id: NodeId, bus: EventBus) -> Self {
        Self {
            execution_id,
            node_id,
            bus,
        }
    }

    /// Emitter attached to a bus nobody listens to
    pub fn detached(node_id: impl Into<NodeId>) -> Self {
        Self::new(ExecutionId::nil(), node_id.into(), EventBus::new(1))
    }

    /// Emit a node-specific event
    pub fn emit(&self, event: NodeEvent) {
        self.bus.emit(ExecutionEvent::NodeEvent {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }
}

/// Broadcast bus for run events. Cloning shares the channel.
///
/// Events are also forwarded, as leveled notices, to an optional notifier.
/// Neither delivery is awaited or required to succeed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        if let Some(notifier) = &self.notifier {
            if let Some(notice) = event.notice() {
                notifier.notify(&notice);
            }
        }
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, node_id: NodeId) -> EventEmitter {
        EventEmitter::new(execution_id, node_id, self.clone())
    }
}
