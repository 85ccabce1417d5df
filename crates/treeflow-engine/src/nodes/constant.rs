use std::any::Any;

use treeflow_core::port::{PortSpec, PortValue};
use treeflow_core::value::ValueKind;

use crate::error::NodeError;
use crate::node::{Node, RecomputeContext};

/// Publishes a value set by the user (a type selector, a slider, a number
/// box). Edit it with [`Graph::edit_node`](crate::graph::Graph::edit_node).
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    kind: ValueKind,
    value: Option<PortValue>,
}

impl Constant {
    pub const KIND: &'static str = "Constant";

    /// A constant whose output port is declared as `kind`.
    pub fn new(kind: ValueKind, value: Option<PortValue>) -> Self {
        Constant { kind, value }
    }

    pub fn value(&self) -> Option<&PortValue> {
        self.value.as_ref()
    }

    /// Replaces the value, returning the old one.
    pub fn set(&mut self, value: Option<PortValue>) -> Option<PortValue> {
        std::mem::replace(&mut self.value, value)
    }
}

impl Node for Constant {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn inputs(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("value", self.kind)]
    }

    fn recompute(
        &mut self,
        _ctx: &mut RecomputeContext<'_>,
    ) -> Result<Vec<Option<PortValue>>, NodeError> {
        Ok(vec![self.value.clone()])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
