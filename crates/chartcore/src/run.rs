use crate::node::NodeOutputs;
use crate::ExecutionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
}

/// Control signal observed on a completed visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "signal", content = "handle", rename_all = "camelCase")]
pub enum Signal {
    Branch(String),
    LoopBreak,
    LoopContinue,
    FlowEnd,
}

/// One visit of one node. Nodes inside loop bodies are visited once per
/// iteration; `iteration` holds the element index of every enclosing loop,
/// outermost first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeVisit {
    pub node_id: String,
    pub iteration: Vec<usize>,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
    pub duration_ms: u64,
}

/// Everything a run produced, kept on success and on failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunTrace {
    pub visits: Vec<NodeVisit>,
    /// Latest status of every planned node.
    pub statuses: BTreeMap<String, NodeStatus>,
    /// Latest outputs of every node that completed at least once.
    pub outputs: HashMap<String, NodeOutputs>,
}

impl RunTrace {
    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.statuses.get(node_id).copied()
    }

    pub fn visits_of<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a NodeVisit> + 'a {
        self.visits.iter().filter(move |v| v.node_id == node_id)
    }

    /// Number of visits that actually ran the node's executor.
    pub fn executions_of(&self, node_id: &str) -> usize {
        self.visits_of(node_id)
            .filter(|v| matches!(v.status, NodeStatus::Completed | NodeStatus::Failed))
            .count()
    }

    pub fn output(&self, node_id: &str) -> Option<&NodeOutputs> {
        self.outputs.get(node_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunOutcome {
    /// Every reachable node was settled.
    Completed,
    /// An end node stopped the run early. Still a success.
    #[serde(rename_all = "camelCase")]
    Ended { node_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub execution_id: ExecutionId,
    pub outcome: RunOutcome,
    pub duration_ms: u64,
    pub trace: RunTrace,
}

impl RunResult {
    pub fn ended_early(&self) -> bool {
        matches!(self.outcome, RunOutcome::Ended { .. })
    }
}
