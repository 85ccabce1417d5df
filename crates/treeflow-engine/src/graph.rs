//! Graph: the container of nodes and connectors, and the editor-facing
//! mutation surface.
//!
//! [`Graph`] wraps a petgraph `StableGraph` whose node weights are
//! [`NodeSlot`]s (a node plus the ports the graph owns for it) and whose edge
//! weights are [`Connector`]s. Node and connector ids come from
//! monotonically increasing counters and are never reused, so a killed
//! connector's id can be killed again as a no-op.
//!
//! All structural mutations (`create_node`, `destroy_node`,
//! `create_connector`, `kill_connector`) go through `Graph` so that port
//! bindings, adjacency, and dirty state stay consistent. The propagation
//! scheduler lives in [`crate::schedule`], port remapping in
//! [`crate::remap`].

use std::collections::{HashMap, VecDeque};

use petgraph::algo::has_path_connecting;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use tracing::debug;

use treeflow_core::error::CoreError;
use treeflow_core::id::{ConnectorId, NodeId};
use treeflow_core::port::{InputPort, OutputPort, PortValue};

use crate::config::EngineConfig;
use crate::error::{EngineError, PortDirection};
use crate::event::GraphEvent;
use crate::node::{Diagnostic, Node, NodeState};

/// A directed edge from one node's output port to another node's input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ConnectorId,
    pub source: NodeId,
    pub source_port: usize,
    pub target: NodeId,
    pub target_port: usize,
}

/// A node together with the ports and scheduler state the graph keeps for it.
#[derive(Debug)]
pub struct NodeSlot {
    pub(crate) id: NodeId,
    pub(crate) node: Box<dyn Node>,
    pub(crate) inputs: Vec<InputPort>,
    pub(crate) outputs: Vec<OutputPort>,
    pub(crate) state: NodeState,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

/// The node graph.
#[derive(Debug)]
pub struct Graph {
    pub(crate) graph: StableGraph<NodeSlot, Connector, Directed, u32>,
    nodes: HashMap<NodeId, NodeIndex<u32>>,
    connectors: HashMap<ConnectorId, EdgeIndex<u32>>,
    next_node_id: u32,
    next_connector_id: u32,
    pub(crate) config: EngineConfig,
    events: VecDeque<GraphEvent>,
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new(EngineConfig::default())
    }
}

impl Graph {
    /// Creates an empty graph.
    pub fn new(config: EngineConfig) -> Self {
        Graph {
            graph: StableGraph::new(),
            nodes: HashMap::new(),
            connectors: HashMap::new(),
            next_node_id: 0,
            next_connector_id: 0,
            config,
            events: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Node methods
    // -----------------------------------------------------------------------

    /// Adds a node. It starts `Dirty` so the next pass computes it.
    pub fn create_node(&mut self, node: impl Node + 'static) -> NodeId {
        self.create_boxed_node(Box::new(node))
    }

    /// Adds an already boxed node.
    pub fn create_boxed_node(&mut self, node: Box<dyn Node>) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let inputs = node.inputs().into_iter().map(InputPort::new).collect();
        let outputs = node.outputs().into_iter().map(OutputPort::new).collect();
        let kind = node.kind();
        let idx = self.graph.add_node(NodeSlot {
            id,
            node,
            inputs,
            outputs,
            state: NodeState::Dirty,
            diagnostics: Vec::new(),
        });
        self.nodes.insert(id, idx);

        debug!(node = %id, kind, "node created");
        self.record(GraphEvent::Dirtied(id));
        id
    }

    /// Removes a node, killing every connector attached to it first.
    ///
    /// Downstream nodes lose their bound values and become dirty. Returns the
    /// removed node; the host is responsible for detaching any auxiliary
    /// objects it attached for this id.
    pub fn destroy_node(&mut self, id: NodeId) -> Result<Box<dyn Node>, EngineError> {
        let idx = self.index_of(id)?;

        let attached: Vec<ConnectorId> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .chain(self.graph.edges_directed(idx, Direction::Outgoing))
            .map(|edge| edge.weight().id)
            .collect();
        for connector in attached {
            self.kill_connector(connector);
        }

        self.nodes.remove(&id);
        let slot = self
            .graph
            .remove_node(idx)
            .ok_or(EngineError::NodeNotFound { id })?;
        debug!(node = %id, "node destroyed");
        Ok(slot.node)
    }

    /// Returns the node object.
    pub fn node(&self, id: NodeId) -> Result<&dyn Node, EngineError> {
        Ok(self.slot(id)?.node.as_ref())
    }

    /// Returns the node downcast to its concrete type.
    pub fn node_as<N: Node + 'static>(&self, id: NodeId) -> Result<&N, EngineError> {
        self.node(id)?
            .as_any()
            .downcast_ref::<N>()
            .ok_or(EngineError::WrongNodeType {
                id,
                expected: std::any::type_name::<N>(),
            })
    }

    /// Edits a node's internal state and marks it (and its dependents) dirty.
    pub fn edit_node<N, R>(
        &mut self,
        id: NodeId,
        edit: impl FnOnce(&mut N) -> R,
    ) -> Result<R, EngineError>
    where
        N: Node + 'static,
    {
        let idx = self.index_of(id)?;
        let node = self.graph[idx]
            .node
            .as_any_mut()
            .downcast_mut::<N>()
            .ok_or(EngineError::WrongNodeType {
                id,
                expected: std::any::type_name::<N>(),
            })?;
        let result = edit(node);
        self.mark_dirty_from(idx);
        Ok(result)
    }

    /// Current scheduler state of a node.
    pub fn state(&self, id: NodeId) -> Result<NodeState, EngineError> {
        Ok(self.slot(id)?.state)
    }

    /// Diagnostics from the node's last recompute.
    pub fn diagnostics(&self, id: NodeId) -> Result<&[Diagnostic], EngineError> {
        Ok(&self.slot(id)?.diagnostics)
    }

    /// The node's input ports.
    pub fn inputs(&self, id: NodeId) -> Result<&[InputPort], EngineError> {
        Ok(&self.slot(id)?.inputs)
    }

    /// The node's output ports.
    pub fn outputs(&self, id: NodeId) -> Result<&[OutputPort], EngineError> {
        Ok(&self.slot(id)?.outputs)
    }

    /// The value last published on output `port`.
    pub fn query_output(&self, id: NodeId, port: usize) -> Result<Option<&PortValue>, EngineError> {
        let slot = self.slot(id)?;
        let output = slot
            .outputs
            .get(port)
            .ok_or(EngineError::PortIndexOutOfRange {
                node: id,
                port,
                direction: PortDirection::Output,
            })?;
        Ok(output.value())
    }

    // -----------------------------------------------------------------------
    // Connector methods
    // -----------------------------------------------------------------------

    /// Connects output `source_port` of `source` to input `target_port` of
    /// `target`.
    ///
    /// Rejects the connector if the input already has one
    /// ([`EngineError::PortAlreadyBound`]; kill it first), if the declared
    /// kinds are incompatible, or if it would introduce a cycle. On success
    /// the source's current output is written through to the input and the
    /// target becomes dirty.
    pub fn create_connector(
        &mut self,
        source: NodeId,
        source_port: usize,
        target: NodeId,
        target_port: usize,
    ) -> Result<ConnectorId, EngineError> {
        let source_idx = self.index_of(source)?;
        let target_idx = self.index_of(target)?;

        let source_kind = self.graph[source_idx]
            .outputs
            .get(source_port)
            .ok_or(EngineError::PortIndexOutOfRange {
                node: source,
                port: source_port,
                direction: PortDirection::Output,
            })?
            .spec
            .kind;
        let target_kind = self.graph[target_idx]
            .inputs
            .get(target_port)
            .ok_or(EngineError::PortIndexOutOfRange {
                node: target,
                port: target_port,
                direction: PortDirection::Input,
            })?
            .spec
            .kind;

        if !target_kind.compatible_with(source_kind) {
            return Err(EngineError::PortTypeMismatch {
                source_kind,
                target_kind,
            });
        }

        // A path target ->* source means source already depends on target.
        if source_idx == target_idx
            || has_path_connecting(&self.graph, target_idx, source_idx, None)
        {
            return Err(EngineError::CycleDetected {
                from: source,
                to: target,
            });
        }

        let id = ConnectorId(self.next_connector_id);
        self.graph[target_idx].inputs[target_port]
            .bind(id)
            .map_err(|err| match err {
                CoreError::PortAlreadyBound { existing } => EngineError::PortAlreadyBound {
                    node: target,
                    port: target_port,
                    existing,
                },
                other => EngineError::Core(other),
            })?;
        self.next_connector_id += 1;

        let connector = Connector {
            id,
            source,
            source_port,
            target,
            target_port,
        };
        let edge = self.graph.add_edge(source_idx, target_idx, connector);
        self.connectors.insert(id, edge);

        let current = self.graph[source_idx].outputs[source_port].value().cloned();
        self.graph[target_idx].inputs[target_port].deliver(current);

        debug!(connector = %id, %source, source_port, %target, target_port, "connector created");
        self.record(GraphEvent::ConnectorCreated(id));
        self.mark_dirty_from(target_idx);
        Ok(id)
    }

    /// Removes a connector, unbinding the destination input and dirtying the
    /// destination node.
    ///
    /// Idempotent: killing an unknown or already killed connector does
    /// nothing and returns `false`.
    pub fn kill_connector(&mut self, id: ConnectorId) -> bool {
        let Some(edge) = self.connectors.remove(&id) else {
            return false;
        };
        let Some(target_idx) = self.graph.edge_endpoints(edge).map(|(_, t)| t) else {
            return false;
        };
        let Some(connector) = self.graph.remove_edge(edge) else {
            return false;
        };

        if let Some(port) = self.graph[target_idx].inputs.get_mut(connector.target_port) {
            port.unbind();
        }

        debug!(connector = %id, target = %connector.target, "connector killed");
        self.record(GraphEvent::ConnectorKilled(id));
        self.mark_dirty_from(target_idx);
        true
    }

    /// Looks up a live connector.
    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors
            .get(&id)
            .and_then(|&edge| self.graph.edge_weight(edge))
    }

    /// All connectors attached to a node, incoming first.
    pub fn connectors_of(&self, id: NodeId) -> Result<Vec<Connector>, EngineError> {
        let idx = self.index_of(id)?;
        Ok(self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .chain(self.graph.edges_directed(idx, Direction::Outgoing))
            .map(|edge| *edge.weight())
            .collect())
    }

    // -----------------------------------------------------------------------
    // Query methods
    // -----------------------------------------------------------------------

    /// Nodes this node depends on (sources of its incoming connectors).
    pub fn dependencies(&self, id: NodeId) -> Result<Vec<NodeId>, EngineError> {
        self.neighbor_ids(id, Direction::Incoming)
    }

    /// Nodes depending on this node (targets of its outgoing connectors).
    pub fn dependents(&self, id: NodeId) -> Result<Vec<NodeId>, EngineError> {
        self.neighbor_ids(id, Direction::Outgoing)
    }

    /// All node ids in allocation order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connector_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    // -----------------------------------------------------------------------
    // Event log
    // -----------------------------------------------------------------------

    /// Recorded events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &GraphEvent> {
        self.events.iter()
    }

    /// Drains the event log.
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        self.events.drain(..).collect()
    }

    pub(crate) fn record(&mut self, event: GraphEvent) {
        if !self.config.record_events || self.config.max_event_log == 0 {
            return;
        }
        if self.events.len() >= self.config.max_event_log {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    pub(crate) fn index_of(&self, id: NodeId) -> Result<NodeIndex<u32>, EngineError> {
        self.nodes
            .get(&id)
            .copied()
            .ok_or(EngineError::NodeNotFound { id })
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot, EngineError> {
        let idx = self.index_of(id)?;
        self.graph
            .node_weight(idx)
            .ok_or(EngineError::NodeNotFound { id })
    }

    fn neighbor_ids(&self, id: NodeId, dir: Direction) -> Result<Vec<NodeId>, EngineError> {
        let idx = self.index_of(id)?;
        let mut ids: Vec<NodeId> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}
