//! Core error types for treeflow-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the value and port model.

use thiserror::Error;

use crate::id::ConnectorId;
use crate::value::ValueKind;

/// Errors produced by the treeflow-core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// An input port already has an incoming connector.
    #[error("port already bound to connector {existing}")]
    PortAlreadyBound { existing: ConnectorId },

    /// A value's kind cannot be stored in a slot of the declared kind.
    #[error("kind mismatch: expected {expected}, got {got}")]
    KindMismatch { expected: ValueKind, got: ValueKind },
}
