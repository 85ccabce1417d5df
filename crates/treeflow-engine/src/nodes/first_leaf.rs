use std::any::Any;

use treeflow_core::port::{PortSpec, PortValue};
use treeflow_core::value::ValueKind;

use crate::error::NodeError;
use crate::node::{Node, RecomputeContext};

/// Outputs the first leaf of its input as a scalar, or nothing when the
/// input holds no leaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FirstLeaf;

impl FirstLeaf {
    pub const KIND: &'static str = "FirstLeaf";
}

impl Node for FirstLeaf {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("tree", ValueKind::Any).with_description("Any value or tree.")]
    }

    fn outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("first", ValueKind::Any)
            .with_description("The first leaf, depth first.")]
    }

    fn recompute(
        &mut self,
        ctx: &mut RecomputeContext<'_>,
    ) -> Result<Vec<Option<PortValue>>, NodeError> {
        let input = ctx.require_input(0)?;
        Ok(vec![input.first_leaf().cloned().map(PortValue::Scalar)])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
