//! Dynamic input-port remapping for nodes implementing
//! [`DynamicPorts`](crate::node::DynamicPorts).

use tracing::debug;

use treeflow_core::id::{ConnectorId, NodeId};
use treeflow_core::port::{InputPort, PortSpec};

use crate::error::EngineError;
use crate::event::GraphEvent;
use crate::graph::{Graph, NodeSlot};
use crate::target::TargetSystem;

/// Result of [`Graph::remap_ports`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemapOutcome {
    /// Specs of the dynamic ports that were removed, in port order.
    pub removed: Vec<PortSpec>,
    /// Connectors severed, highest port first.
    pub killed: Vec<ConnectorId>,
    /// Specs of the ports that replaced them, in port order.
    pub added: Vec<PortSpec>,
}

impl Graph {
    /// Rebuilds a node's dynamic input ports from the first leaf of its
    /// sample input.
    ///
    /// The new port set is derived before anything is touched, so a failed
    /// derivation leaves the node as it was. Otherwise every connector
    /// feeding a dynamic port is killed from the last port to the first,
    /// the dynamic ports are replaced wholesale, and the node is dirtied.
    ///
    /// An unbound sample port leaves the node untouched and returns an empty
    /// outcome. A sample without an object reference clears the dynamic set.
    pub fn remap_ports(
        &mut self,
        id: NodeId,
        target: &dyn TargetSystem,
    ) -> Result<RemapOutcome, EngineError> {
        let idx = self.index_of(id)?;

        let (structural, added) = {
            let NodeSlot { node, inputs, .. } = &mut self.graph[idx];
            let dynamic = node
                .dynamic_ports()
                .ok_or(EngineError::NotRemappable { id })?;
            let structural = dynamic.structural_inputs().min(inputs.len());
            let Some(value) = inputs.get(dynamic.sample_port()).and_then(InputPort::value) else {
                debug!(node = %id, "remap skipped, sample port unbound");
                return Ok(RemapOutcome {
                    removed: Vec::new(),
                    killed: Vec::new(),
                    added: Vec::new(),
                });
            };
            let sample = value.first_leaf().cloned();
            let added = dynamic
                .derive_inputs(sample.as_ref(), target)
                .map_err(|source| EngineError::RemapFailed { id, source })?;
            (structural, added)
        };

        let killed: Vec<ConnectorId> = self.graph[idx].inputs[structural..]
            .iter()
            .rev()
            .filter_map(InputPort::connector)
            .collect();
        for &connector in &killed {
            self.kill_connector(connector);
        }

        let slot = &mut self.graph[idx];
        let removed: Vec<PortSpec> = slot
            .inputs
            .drain(structural..)
            .map(|port| port.spec)
            .collect();
        slot.inputs.extend(added.iter().cloned().map(InputPort::new));

        debug!(
            node = %id,
            removed = removed.len(),
            added = added.len(),
            killed = killed.len(),
            "ports remapped"
        );
        self.record(GraphEvent::PortsRemapped {
            node: id,
            removed: removed.len(),
            added: added.len(),
        });
        self.mark_dirty_from(idx);

        Ok(RemapOutcome {
            removed,
            killed,
            added,
        })
    }
}
