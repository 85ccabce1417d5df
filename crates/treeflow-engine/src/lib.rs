//! Propagation engine for treeflow dataflow graphs.
//!
//! Provides the [`Graph`] container with its editor-facing mutation
//! operations, the dirty-propagation scheduler, dynamic port remapping, the
//! [`TargetSystem`] contract through which nodes touch the external object
//! model (with [`MemoryTarget`] as a first-class in-memory backend), and the
//! [`AuxObjectDaemon`] for per-node auxiliary objects.
//!
//! # Modules
//!
//! - [`graph`]: Graph, connectors, editor-adapter operations
//! - [`schedule`]: mark_dirty, run_pass, PassReport
//! - [`remap`]: remap_ports for dynamic-port nodes
//! - [`node`]: Node and DynamicPorts traits, NodeState, RecomputeContext
//! - [`nodes`]: built-in nodes
//! - [`target`] / [`memory`]: target-system contract and in-memory backend
//! - [`auxiliary`]: AuxObjectDaemon and composite handles
//! - [`event`]: GraphEvent log entries
//! - [`config`]: EngineConfig
//! - [`error`]: EngineError, NodeError, TargetError

pub mod auxiliary;
pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod memory;
pub mod node;
pub mod nodes;
pub mod remap;
pub mod schedule;
pub mod target;

pub use auxiliary::{AuxError, AuxObject, AuxObjectDaemon, CompositeHandle, CreatorRegistry};
pub use config::EngineConfig;
pub use error::{EngineError, NodeError, PortDirection, TargetError};
pub use event::GraphEvent;
pub use graph::{Connector, Graph};
pub use memory::MemoryTarget;
pub use node::{Diagnostic, DynamicPorts, Node, NodeState, RecomputeContext, Severity};
pub use remap::RemapOutcome;
pub use schedule::PassReport;
pub use target::{FieldInfo, TargetSystem};
