//! Auxiliary-object lifecycle: per-node handles (interactive gizmos, editing
//! helpers) created by host-supplied factories and disposed explicitly.
//!
//! The daemon depends only on node identity and variant, never on graph
//! internals or the recompute cycle. Handles are not released implicitly:
//! hosts call [`AuxObjectDaemon::detach`] when they destroy a node and
//! [`AuxObjectDaemon::detach_all`] on teardown.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use treeflow_core::id::NodeId;

use crate::node::Node;

/// Error type returned by a single auxiliary object's disposal.
pub type DisposeError = Box<dyn std::error::Error + Send + Sync>;

/// An object tied to a node's lifetime.
pub trait AuxObject: fmt::Debug {
    /// Releases the object's resources. May be called more than once.
    fn dispose(&mut self) -> Result<(), DisposeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuxError {
    /// One or more parts failed to dispose. Every part was still attempted.
    #[error(
        "{} of {total} auxiliary object(s) failed to dispose: {}",
        .failures.len(),
        .failures.join("; ")
    )]
    DisposeFailed { total: usize, failures: Vec<String> },
}

/// All auxiliary objects attached to one node, disposed as a unit.
#[derive(Debug, Default)]
pub struct CompositeHandle {
    parts: Vec<Box<dyn AuxObject>>,
    disposed: bool,
}

impl CompositeHandle {
    pub fn new(parts: Vec<Box<dyn AuxObject>>) -> Self {
        CompositeHandle {
            parts,
            disposed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Disposes every part, continuing past failures.
    ///
    /// The first call attempts each part exactly once and reports all
    /// failures together; later calls do nothing.
    pub fn dispose(&mut self) -> Result<(), AuxError> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let failures: Vec<String> = self
            .parts
            .iter_mut()
            .filter_map(|part| part.dispose().err())
            .map(|err| err.to_string())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AuxError::DisposeFailed {
                total: self.parts.len(),
                failures,
            })
        }
    }
}

type Predicate = Box<dyn Fn(&dyn Node) -> bool>;
type Factory<C> = Box<dyn Fn(NodeId, &dyn Node, &C) -> Option<Box<dyn AuxObject>>>;

struct Creator<C> {
    applies: Predicate,
    create: Factory<C>,
}

/// Host-supplied factories, each guarded by a predicate on the node.
///
/// `C` is the host context passed to every factory (a view, a document
/// handle, or `()`).
pub struct CreatorRegistry<C> {
    creators: Vec<Creator<C>>,
}

impl<C> Default for CreatorRegistry<C> {
    fn default() -> Self {
        CreatorRegistry {
            creators: Vec::new(),
        }
    }
}

impl<C> CreatorRegistry<C> {
    pub fn new() -> Self {
        CreatorRegistry::default()
    }

    /// Registers a factory applied to every node matching `applies`.
    pub fn register<P, F>(&mut self, applies: P, create: F) -> &mut Self
    where
        P: Fn(&dyn Node) -> bool + 'static,
        F: Fn(NodeId, &dyn Node, &C) -> Option<Box<dyn AuxObject>> + 'static,
    {
        self.creators.push(Creator {
            applies: Box::new(applies),
            create: Box::new(create),
        });
        self
    }

    /// Registers a factory for nodes whose [`Node::kind`] equals `kind`.
    pub fn register_for_kind<F>(&mut self, kind: &'static str, create: F) -> &mut Self
    where
        F: Fn(NodeId, &dyn Node, &C) -> Option<Box<dyn AuxObject>> + 'static,
    {
        self.register(move |node: &dyn Node| node.kind() == kind, create)
    }

    pub fn len(&self) -> usize {
        self.creators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creators.is_empty()
    }

    fn create_all(&self, id: NodeId, node: &dyn Node, context: &C) -> Vec<Box<dyn AuxObject>> {
        self.creators
            .iter()
            .filter(|creator| (creator.applies)(node))
            .filter_map(|creator| (creator.create)(id, node, context))
            .collect()
    }
}

impl<C> fmt::Debug for CreatorRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatorRegistry")
            .field("creators", &self.creators.len())
            .finish()
    }
}

/// Tracks the composite handle attached to each node.
#[derive(Debug)]
pub struct AuxObjectDaemon<C> {
    registry: CreatorRegistry<C>,
    active: HashMap<NodeId, CompositeHandle>,
}

impl<C> AuxObjectDaemon<C> {
    pub fn new(registry: CreatorRegistry<C>) -> Self {
        AuxObjectDaemon {
            registry,
            active: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &CreatorRegistry<C> {
        &self.registry
    }

    /// Runs every matching factory for `node` and stores the non-empty
    /// results as its handle, replacing (and disposing) any previous one.
    ///
    /// Returns the number of auxiliary objects created. A failure while
    /// disposing the previous handle is logged, not returned.
    pub fn attach(&mut self, id: NodeId, node: &dyn Node, context: &C) -> usize {
        if let Some(mut previous) = self.active.remove(&id) {
            if let Err(err) = previous.dispose() {
                warn!(node = %id, error = %err, "disposing replaced auxiliary objects failed");
            }
        }

        let handle = CompositeHandle::new(self.registry.create_all(id, node, context));
        let created = handle.len();
        debug!(node = %id, kind = node.kind(), created, "auxiliary objects attached");
        self.active.insert(id, handle);
        created
    }

    /// Disposes and forgets the handle for `id`. Returns `Ok(false)` if none
    /// was attached.
    pub fn detach(&mut self, id: NodeId) -> Result<bool, AuxError> {
        match self.active.remove(&id) {
            Some(mut handle) => {
                debug!(node = %id, "auxiliary objects detached");
                handle.dispose().map(|()| true)
            }
            None => Ok(false),
        }
    }

    /// Disposes every tracked handle and clears the daemon. All handles are
    /// attempted; failures are reported together.
    pub fn detach_all(&mut self) -> Result<usize, AuxError> {
        let mut handles: Vec<(NodeId, CompositeHandle)> = self.active.drain().collect();
        handles.sort_by_key(|(id, _)| *id);

        let mut total = 0;
        let mut failures = Vec::new();
        for (id, handle) in &mut handles {
            total += handle.len();
            if let Err(AuxError::DisposeFailed {
                failures: mut parts,
                ..
            }) = handle.dispose()
            {
                warn!(node = %id, failed = parts.len(), "auxiliary object disposal failed");
                failures.append(&mut parts);
            }
        }
        debug!(nodes = handles.len(), "all auxiliary objects detached");

        if failures.is_empty() {
            Ok(handles.len())
        } else {
            Err(AuxError::DisposeFailed { total, failures })
        }
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn handle(&self, id: NodeId) -> Option<&CompositeHandle> {
        self.active.get(&id)
    }

    /// Number of nodes with a handle.
    pub fn attached_count(&self) -> usize {
        self.active.len()
    }
}
