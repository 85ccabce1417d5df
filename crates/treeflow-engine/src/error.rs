//! Error types for the treeflow engine.
//!
//! Three layers, from the outside in:
//! - [`EngineError`]: returned by graph mutations and queries (the editor
//!   adapter surface).
//! - [`NodeError`]: returned by a node's recompute; caught at the scheduler
//!   boundary and turned into a node-scoped `Failed` state.
//! - [`TargetError`]: returned by the target-system adapter.

use thiserror::Error;

use treeflow_core::error::CoreError;
use treeflow_core::id::{ConnectorId, ExternalRef, NodeId};
use treeflow_core::value::ValueKind;

/// Errors produced by graph operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("node not found: NodeId({id})")]
    NodeNotFound { id: NodeId },

    /// The destination input already has an incoming connector; kill it first.
    #[error("input port {port} of node {node} is already bound to connector {existing}")]
    PortAlreadyBound {
        node: NodeId,
        port: usize,
        existing: ConnectorId,
    },

    #[error("node {node} has no {direction} port {port}")]
    PortIndexOutOfRange {
        node: NodeId,
        port: usize,
        direction: PortDirection,
    },

    #[error("cannot connect {source_kind} output to {target_kind} input")]
    PortTypeMismatch {
        source_kind: ValueKind,
        target_kind: ValueKind,
    },

    /// The connector would make `from` depend on itself.
    #[error("connecting node {from} to node {to} would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },

    #[error("node {id} does not support port remapping")]
    NotRemappable { id: NodeId },

    #[error("node {id} is not a {expected}")]
    WrongNodeType { id: NodeId, expected: &'static str },

    #[error("remapping node {id} failed: {source}")]
    RemapFailed {
        id: NodeId,
        #[source]
        source: NodeError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Which side of a node a port index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

impl std::fmt::Display for PortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortDirection::Input => f.write_str("input"),
            PortDirection::Output => f.write_str("output"),
        }
    }
}

/// Errors a node's recompute operation may raise.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("input port {port} has no value")]
    MissingInput { port: usize },

    #[error("input port {port}: expected {expected}, got {got}")]
    InputKind {
        port: usize,
        expected: ValueKind,
        got: ValueKind,
    },

    #[error("expected {expected} outputs, recompute produced {got}")]
    OutputArity { expected: usize, got: usize },

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("{message}")]
    Failed { message: String },
}

/// Errors raised by the target-system adapter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TargetError {
    /// The field is read-only, absent, or cannot hold the value's kind.
    #[error("object {object} rejected write to '{field}': {reason}")]
    Rejected {
        object: ExternalRef,
        field: String,
        reason: String,
    },

    #[error("object not found: {object}")]
    ObjectNotFound { object: ExternalRef },

    #[error("creation failed: {reason}")]
    CreationFailed { reason: String },
}

impl TargetError {
    /// Rejections are recorded per leaf and do not fail the whole recompute.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TargetError::Rejected { .. } | TargetError::CreationFailed { .. }
        )
    }
}
