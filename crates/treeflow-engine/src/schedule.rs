//! Dirty propagation and the propagation pass.
//!
//! Dirtying is eager: marking a node walks every transitive dependent (BFS
//! over outgoing connectors) and moves each one to `Dirty`. Recomputation is
//! deferred until [`Graph::run_pass`], which visits dirty nodes in
//! topological order so that a node never starts before all of its upstream
//! nodes are clean.

use std::collections::{HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use tracing::{debug, warn};

use treeflow_core::error::CoreError;
use treeflow_core::id::{ExternalRef, NodeId};
use treeflow_core::port::PortValue;

use crate::error::{EngineError, NodeError};
use crate::event::GraphEvent;
use crate::graph::{Graph, NodeSlot};
use crate::node::{Diagnostic, NodeState, RecomputeContext, Severity};
use crate::target::TargetSystem;

/// What a propagation pass did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    /// Nodes that recomputed successfully, in execution order.
    pub recomputed: Vec<NodeId>,
    /// Subset of `recomputed` that finished with warnings.
    pub partial: Vec<NodeId>,
    /// Nodes whose recompute failed, with the error message.
    pub failed: Vec<(NodeId, String)>,
    /// Dirty nodes left dirty because an upstream node is not clean.
    pub blocked: Vec<NodeId>,
}

impl PassReport {
    /// Returns `true` if nothing failed or was blocked.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

impl Graph {
    /// Marks a node and all of its transitive dependents dirty.
    ///
    /// Returns the nodes that transitioned to `Dirty`; nodes already dirty are
    /// walked through but not reported again.
    pub fn mark_dirty(&mut self, id: NodeId) -> Result<Vec<NodeId>, EngineError> {
        let idx = self.index_of(id)?;
        Ok(self.mark_dirty_from(idx))
    }

    pub(crate) fn mark_dirty_from(&mut self, start: NodeIndex<u32>) -> Vec<NodeId> {
        let mut dirtied = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(idx) = queue.pop_front() {
            if !visited.insert(idx) {
                continue;
            }
            if let Some(slot) = self.graph.node_weight_mut(idx) {
                if slot.state != NodeState::Dirty {
                    slot.state = NodeState::Dirty;
                    dirtied.push(slot.id);
                }
            }
            queue.extend(self.graph.neighbors_directed(idx, Direction::Outgoing));
        }

        for &id in &dirtied {
            self.record(GraphEvent::Dirtied(id));
        }
        if !dirtied.is_empty() {
            debug!(count = dirtied.len(), "nodes marked dirty");
        }
        dirtied
    }

    /// Marks dirty every node holding an input that references one of
    /// `objects`, plus their dependents.
    ///
    /// Hosts call this when objects change outside the graph.
    pub fn notify_external_change(&mut self, objects: &[ExternalRef]) -> Vec<NodeId> {
        let affected: Vec<NodeIndex<u32>> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph[idx].inputs.iter().any(|port| {
                    port.value()
                        .is_some_and(|value| objects.iter().any(|&o| value.contains_ref(o)))
                })
            })
            .collect();

        let mut dirtied = Vec::new();
        for idx in affected {
            dirtied.extend(self.mark_dirty_from(idx));
        }
        debug!(objects = objects.len(), dirtied = dirtied.len(), "external change");
        dirtied
    }

    /// Recomputes every dirty node whose upstream nodes are all clean, in
    /// topological order.
    ///
    /// A failing node moves to `Failed` and its dependents stay dirty and are
    /// reported as blocked. Failed nodes are not retried until something
    /// dirties them again.
    pub fn run_pass(&mut self, target: &mut dyn TargetSystem) -> PassReport {
        let mut report = PassReport::default();

        let order = match toposort(&self.graph, None) {
            Ok(order) => order,
            Err(cycle) => {
                // Unreachable through create_connector; kept for graphs built
                // by other means.
                let idx = cycle.node_id();
                let id = self.graph[idx].id;
                let message = format!("dependency cycle through node {id}");
                warn!(node = %id, "{message}");
                self.fail(idx, message.clone());
                report.failed.push((id, message));
                return report;
            }
        };

        for idx in order {
            if self.graph[idx].state != NodeState::Dirty {
                continue;
            }
            let id = self.graph[idx].id;

            if !self.upstream_clean(idx) {
                warn!(node = %id, "blocked on upstream");
                self.record(GraphEvent::Blocked(id));
                report.blocked.push(id);
                continue;
            }

            self.graph[idx].state = NodeState::Recomputing;
            self.record(GraphEvent::RecomputeStarted(id));

            match self.recompute_slot(idx, target) {
                Ok(()) => {
                    self.graph[idx].state = NodeState::Clean;
                    self.forward_outputs(idx);
                    self.record(GraphEvent::Recomputed(id));
                    report.recomputed.push(id);

                    let warnings = self.graph[idx]
                        .diagnostics
                        .iter()
                        .filter(|d| d.severity == Severity::Warning)
                        .count();
                    if warnings > 0 {
                        debug!(node = %id, warnings, "recomputed with warnings");
                        report.partial.push(id);
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(node = %id, error = %message, "recompute failed");
                    self.fail(idx, message.clone());
                    report.failed.push((id, message));
                }
            }
        }

        debug!(
            recomputed = report.recomputed.len(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            "propagation pass finished"
        );
        report
    }

    fn upstream_clean(&self, idx: NodeIndex<u32>) -> bool {
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .all(|up| self.graph[up].state == NodeState::Clean)
    }

    /// Runs one node's recompute and publishes its outputs on success.
    /// Outputs are left untouched on failure.
    fn recompute_slot(
        &mut self,
        idx: NodeIndex<u32>,
        target: &mut dyn TargetSystem,
    ) -> Result<(), NodeError> {
        let validate = self.config.validate_port_values;
        let NodeSlot {
            id,
            node,
            inputs,
            outputs,
            diagnostics,
            ..
        } = &mut self.graph[idx];

        diagnostics.clear();

        if validate {
            for (port, input) in inputs.iter().enumerate() {
                if let Some(Err(CoreError::KindMismatch { expected, got })) =
                    input.value().map(|v| v.check_kind(input.spec.kind))
                {
                    return Err(NodeError::InputKind {
                        port,
                        expected,
                        got,
                    });
                }
            }
        }

        let mut ctx = RecomputeContext::new(*id, inputs.as_slice(), &mut *target, diagnostics);
        let values = node.recompute(&mut ctx)?;

        if values.len() != outputs.len() {
            return Err(NodeError::OutputArity {
                expected: outputs.len(),
                got: values.len(),
            });
        }
        for (port, value) in outputs.iter_mut().zip(values) {
            port.publish(value);
        }
        Ok(())
    }

    /// Copies each published output into the inputs it is connected to.
    fn forward_outputs(&mut self, idx: NodeIndex<u32>) {
        let deliveries: Vec<(NodeIndex<u32>, usize, Option<PortValue>)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| {
                let connector = edge.weight();
                let value = self.graph[idx]
                    .outputs
                    .get(connector.source_port)
                    .and_then(|port| port.value().cloned());
                (edge.target(), connector.target_port, value)
            })
            .collect();

        for (dest, port, value) in deliveries {
            if let Some(input) = self.graph[dest].inputs.get_mut(port) {
                input.deliver(value);
            }
        }
    }

    fn fail(&mut self, idx: NodeIndex<u32>, message: String) {
        let slot = &mut self.graph[idx];
        slot.state = NodeState::Failed;
        slot.diagnostics.push(Diagnostic::error(message));
        let id = slot.id;
        self.record(GraphEvent::Failed(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTarget;
    use crate::nodes::{Constant, FirstLeaf};
    use treeflow_core::tree::{Branch, ValueTree};
    use treeflow_core::value::{LeafValue, ValueKind};

    /// A node that always fails.
    #[derive(Debug)]
    struct Broken;

    impl crate::node::Node for Broken {
        fn kind(&self) -> &'static str {
            "Broken"
        }
        fn inputs(&self) -> Vec<treeflow_core::port::PortSpec> {
            vec![treeflow_core::port::PortSpec::new("in", ValueKind::Any)]
        }
        fn outputs(&self) -> Vec<treeflow_core::port::PortSpec> {
            vec![treeflow_core::port::PortSpec::new("out", ValueKind::Any)]
        }
        fn recompute(
            &mut self,
            _ctx: &mut RecomputeContext<'_>,
        ) -> Result<Vec<Option<PortValue>>, NodeError> {
            Err(NodeError::Failed {
                message: "broken on purpose".into(),
            })
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn chain(graph: &mut Graph, len: usize) -> Vec<NodeId> {
        let tree = ValueTree::from_trunk(Branch::with_leaves([1.0f64, 2.0]));
        let mut ids = vec![graph.create_node(Constant::new(
            ValueKind::Any,
            Some(PortValue::tree(tree)),
        ))];
        for _ in 1..len {
            let next = graph.create_node(FirstLeaf);
            let prev = *ids.last().unwrap();
            graph.create_connector(prev, 0, next, 0).unwrap();
            ids.push(next);
        }
        ids
    }

    #[test]
    fn pass_runs_in_dependency_order() {
        let mut graph = Graph::default();
        let ids = chain(&mut graph, 3);
        let report = graph.run_pass(&mut MemoryTarget::new());

        assert_eq!(report.recomputed, ids);
        assert!(report.is_clean());
        for id in &ids {
            assert_eq!(graph.state(*id).unwrap(), NodeState::Clean);
        }
        assert_eq!(
            graph.query_output(ids[2], 0).unwrap(),
            Some(&PortValue::Scalar(LeafValue::Number(1.0)))
        );
    }

    #[test]
    fn marking_dirty_reaches_transitive_dependents() {
        let mut graph = Graph::default();
        let ids = chain(&mut graph, 4);
        graph.run_pass(&mut MemoryTarget::new());

        let dirtied = graph.mark_dirty(ids[1]).unwrap();
        assert_eq!(dirtied, vec![ids[1], ids[2], ids[3]]);
        assert_eq!(graph.state(ids[0]).unwrap(), NodeState::Clean);

        // Already dirty: no transitions, nothing reported.
        assert!(graph.mark_dirty(ids[1]).unwrap().is_empty());
    }

    #[test]
    fn clean_pass_is_a_no_op() {
        let mut graph = Graph::default();
        chain(&mut graph, 2);
        graph.run_pass(&mut MemoryTarget::new());
        let report = graph.run_pass(&mut MemoryTarget::new());
        assert_eq!(report, PassReport::default());
    }

    #[test]
    fn failure_blocks_dependents_and_is_not_retried() {
        let mut graph = Graph::default();
        let source = graph.create_node(Constant::new(
            ValueKind::Number,
            Some(PortValue::scalar(1.0)),
        ));
        let broken = graph.create_node(Broken);
        let after = graph.create_node(FirstLeaf);
        graph.create_connector(source, 0, broken, 0).unwrap();
        graph.create_connector(broken, 0, after, 0).unwrap();

        let report = graph.run_pass(&mut MemoryTarget::new());
        assert_eq!(report.recomputed, vec![source]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, broken);
        assert_eq!(report.blocked, vec![after]);
        assert_eq!(graph.state(broken).unwrap(), NodeState::Failed);
        assert_eq!(graph.state(after).unwrap(), NodeState::Dirty);
        assert_eq!(graph.diagnostics(broken).unwrap()[0].severity, Severity::Error);

        let again = graph.run_pass(&mut MemoryTarget::new());
        assert!(again.failed.is_empty());
        assert_eq!(again.blocked, vec![after]);
    }

    #[test]
    fn input_validation_fails_mismatched_values() {
        let mut graph = Graph::default();
        let text = graph.create_node(Constant::new(
            ValueKind::Any,
            Some(PortValue::scalar("wall")),
        ));
        let creator = graph.create_node(crate::nodes::InstanceCreator::new());
        let number = graph.create_node(Constant::new(ValueKind::Any, Some(PortValue::scalar(2.0))));
        graph.create_connector(text, 0, creator, 0).unwrap();
        // Template port is Text; the Any-typed source connects but carries a Number.
        graph.create_connector(number, 0, creator, 1).unwrap();

        let report = graph.run_pass(&mut MemoryTarget::new());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, creator);
        assert!(report.failed[0].1.contains("expected Text"));
    }

    #[test]
    fn external_change_dirties_referencing_nodes() {
        let mut graph = Graph::default();
        let mut store = MemoryTarget::new();
        let wall = store.insert_object("Wall");
        let source = graph.create_node(Constant::new(
            ValueKind::Any,
            Some(PortValue::scalar(wall)),
        ));
        let reader = graph.create_node(FirstLeaf);
        let unrelated = graph.create_node(Constant::new(
            ValueKind::Number,
            Some(PortValue::scalar(1.0)),
        ));
        graph.create_connector(source, 0, reader, 0).unwrap();
        graph.run_pass(&mut store);

        let dirtied = graph.notify_external_change(&[wall]);
        assert_eq!(dirtied, vec![reader]);
        assert_eq!(graph.state(unrelated).unwrap(), NodeState::Clean);
        assert!(graph.notify_external_change(&[ExternalRef(999)]).is_empty());
    }
}
