//! The [`Node`] trait and per-node lifecycle state.
//!
//! A node declares its ports once, at creation; the graph owns the port
//! objects from then on. On recompute the node reads its inputs through a
//! [`RecomputeContext`] and returns one value per output port, which the
//! scheduler publishes atomically after the call returns.
//!
//! State machine: `Clean -> Dirty -> Recomputing -> (Clean | Failed)`. Any
//! trigger moves `Clean` or `Failed` back to `Dirty`.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use treeflow_core::id::NodeId;
use treeflow_core::port::{InputPort, PortSpec, PortValue};
use treeflow_core::value::LeafValue;

use crate::error::NodeError;
use crate::target::TargetSystem;

/// Lifecycle state of a node in the propagation scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Clean,
    Dirty,
    Recomputing,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The recompute finished but part of its work was rejected.
    Warning,
    /// The recompute failed.
    Error,
}

/// A node-scoped message for the host to show next to the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// A computation unit in the graph.
pub trait Node: fmt::Debug {
    /// Variant name, used by auxiliary-object creators to select nodes.
    fn kind(&self) -> &'static str;

    /// Input ports the node starts with.
    fn inputs(&self) -> Vec<PortSpec>;

    /// Output ports. The count is fixed for the node's lifetime.
    fn outputs(&self) -> Vec<PortSpec>;

    /// Computes one value per output port from the current inputs.
    fn recompute(
        &mut self,
        ctx: &mut RecomputeContext<'_>,
    ) -> Result<Vec<Option<PortValue>>, NodeError>;

    /// Nodes whose input ports are derived from upstream data return
    /// themselves here.
    fn dynamic_ports(&mut self) -> Option<&mut dyn DynamicPorts> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Nodes with a variable set of input ports (the parameter-mapper pattern).
///
/// The first [`structural_inputs`](Self::structural_inputs) ports are fixed;
/// every port after them is replaced wholesale on each remap.
pub trait DynamicPorts {
    /// Number of fixed leading input ports.
    fn structural_inputs(&self) -> usize;

    /// Input port whose first leaf is used as the sample.
    fn sample_port(&self) -> usize {
        0
    }

    /// Derives the ordered dynamic port set from a sampled value.
    fn derive_inputs(
        &mut self,
        sample: Option<&LeafValue>,
        target: &dyn TargetSystem,
    ) -> Result<Vec<PortSpec>, NodeError>;
}

/// Everything a node may touch while recomputing.
pub struct RecomputeContext<'a> {
    node: NodeId,
    inputs: &'a [InputPort],
    target: &'a mut dyn TargetSystem,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a> RecomputeContext<'a> {
    pub fn new(
        node: NodeId,
        inputs: &'a [InputPort],
        target: &'a mut dyn TargetSystem,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        RecomputeContext {
            node,
            inputs,
            target,
            diagnostics,
        }
    }

    /// The node being recomputed.
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// All input ports in order.
    pub fn inputs(&self) -> &'a [InputPort] {
        self.inputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// The value on input `index`, `None` if unbound or out of range.
    pub fn input(&self, index: usize) -> Option<&'a PortValue> {
        self.inputs.get(index).and_then(InputPort::value)
    }

    /// Like [`input`](Self::input), failing with
    /// [`NodeError::MissingInput`] when absent.
    pub fn require_input(&self, index: usize) -> Result<&'a PortValue, NodeError> {
        self.input(index)
            .ok_or(NodeError::MissingInput { port: index })
    }

    /// Looks up an input by port name. When several ports share a name, the
    /// last one wins.
    pub fn input_by_name(&self, name: &str) -> Option<&'a InputPort> {
        self.inputs.iter().rev().find(|port| port.spec.name == name)
    }

    /// The target-system adapter.
    pub fn target(&mut self) -> &mut dyn TargetSystem {
        &mut *self.target
    }

    /// Records a partial failure; the recompute still succeeds.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::warning(message));
    }
}

impl fmt::Debug for RecomputeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecomputeContext")
            .field("node", &self.node)
            .field("inputs", &self.inputs.len())
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}
