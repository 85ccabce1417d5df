//! Graph events recorded during mutations and propagation passes.
//!
//! The log is the observable trace of the scheduler: the order in which nodes
//! were dirtied, started, finished, failed or were blocked, and every
//! connector change. Enabled by [`EngineConfig::record_events`](crate::config::EngineConfig).

use serde::{Deserialize, Serialize};

use treeflow_core::id::{ConnectorId, NodeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphEvent {
    /// A node moved from `Clean` or `Failed` to `Dirty`.
    Dirtied(NodeId),
    RecomputeStarted(NodeId),
    Recomputed(NodeId),
    Failed(NodeId),
    /// A dirty node was skipped because an upstream node is not clean.
    Blocked(NodeId),
    ConnectorCreated(ConnectorId),
    ConnectorKilled(ConnectorId),
    PortsRemapped {
        node: NodeId,
        removed: usize,
        added: usize,
    },
}

impl GraphEvent {
    /// The node this event concerns, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            GraphEvent::Dirtied(id)
            | GraphEvent::RecomputeStarted(id)
            | GraphEvent::Recomputed(id)
            | GraphEvent::Failed(id)
            | GraphEvent::Blocked(id) => Some(*id),
            GraphEvent::PortsRemapped { node, .. } => Some(*node),
            GraphEvent::ConnectorCreated(_) | GraphEvent::ConnectorKilled(_) => None,
        }
    }
}
