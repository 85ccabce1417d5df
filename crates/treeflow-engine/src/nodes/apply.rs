use std::any::Any;

use indexmap::IndexMap;
use tracing::debug;

use treeflow_core::port::{PortSpec, PortValue};
use treeflow_core::tree::broadcast_apply;
use treeflow_core::value::{LeafValue, ValueKind};

use crate::error::NodeError;
use crate::node::{Node, RecomputeContext};

use super::FieldWriter;

/// Applies a fixed, ordered set of field values to every object in a tree.
///
/// The parameters are node state rather than ports; change them with
/// [`Graph::edit_node`](crate::graph::Graph::edit_node).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterApply {
    parameters: IndexMap<String, LeafValue>,
}

impl ParameterApply {
    pub const KIND: &'static str = "ParameterApply";

    pub fn new() -> Self {
        ParameterApply::default()
    }

    /// Sets a parameter, keeping its original position if it already exists.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<LeafValue>,
    ) -> Option<LeafValue> {
        self.parameters.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<LeafValue> {
        self.parameters.shift_remove(name)
    }

    pub fn parameters(&self) -> &IndexMap<String, LeafValue> {
        &self.parameters
    }
}

impl Node for ParameterApply {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("objects", ValueKind::Any)
            .with_nickname("fi")
            .with_description("The objects to update.")]
    }

    fn outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("objects", ValueKind::Any).with_nickname("fi")]
    }

    fn recompute(
        &mut self,
        ctx: &mut RecomputeContext<'_>,
    ) -> Result<Vec<Option<PortValue>>, NodeError> {
        let objects_value = ctx.require_input(0)?;
        let objects = objects_value.to_tree();

        let mut writer = FieldWriter::new(ctx.target());
        for (name, value) in &self.parameters {
            broadcast_apply(&objects, value, |object, v| writer.write(object, name, v));
        }
        let (written, rejected) = writer.finish()?;

        debug!(
            node = %ctx.node_id(),
            parameters = self.parameters.len(),
            written,
            "parameters applied"
        );
        super::report_rejections(ctx, rejected);
        Ok(vec![Some(objects_value.clone())])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::memory::MemoryTarget;
    use crate::node::NodeState;
    use crate::nodes::Constant;
    use treeflow_core::tree::{Branch, ValueTree};

    #[test]
    fn applies_every_parameter_to_every_nested_object() {
        let mut store = MemoryTarget::new();
        let walls: Vec<_> = (0..3)
            .map(|_| {
                let wall = store.insert_object("Wall");
                store.set_field_raw(wall, "Height", 3.0, false);
                store.set_field_raw(wall, "Comment", "", false);
                wall
            })
            .collect();
        let tree = ValueTree::from_trunk(
            Branch::with_leaves([walls[0]]).with_branch(Branch::with_leaves([walls[1], walls[2]])),
        );

        let mut graph = Graph::default();
        let source = graph.create_node(Constant::new(ValueKind::Any, Some(PortValue::tree(tree))));
        let apply = graph.create_node(ParameterApply::new());
        graph.create_connector(source, 0, apply, 0).unwrap();
        graph
            .edit_node(apply, |node: &mut ParameterApply| {
                node.set("Height", 4.5);
                node.set("Comment", "raised");
            })
            .unwrap();

        let report = graph.run_pass(&mut store);
        assert!(report.is_clean());
        assert!(report.partial.is_empty());
        for wall in &walls {
            assert_eq!(store.field(*wall, "Height"), Some(&LeafValue::Number(4.5)));
            assert_eq!(store.field(*wall, "Comment"), Some(&LeafValue::from("raised")));
        }
    }

    #[test]
    fn editing_parameters_dirties_the_node() {
        let mut store = MemoryTarget::new();
        let wall = store.insert_object("Wall");
        let mut graph = Graph::default();
        let source = graph.create_node(Constant::new(
            ValueKind::Any,
            Some(PortValue::scalar(wall)),
        ));
        let apply = graph.create_node(ParameterApply::new());
        graph.create_connector(source, 0, apply, 0).unwrap();
        graph.run_pass(&mut store);
        assert_eq!(graph.state(apply).unwrap(), NodeState::Clean);

        graph
            .edit_node(apply, |node: &mut ParameterApply| node.set("Missing", 1.0))
            .unwrap();
        assert_eq!(graph.state(apply).unwrap(), NodeState::Dirty);

        let report = graph.run_pass(&mut store);
        assert_eq!(report.partial, vec![apply]);
        assert_eq!(graph.diagnostics(apply).unwrap().len(), 1);
    }

    #[test]
    fn set_keeps_insertion_order() {
        let mut node = ParameterApply::new();
        node.set("b", 1.0);
        node.set("a", 2.0);
        node.set("b", 3.0);
        let names: Vec<&String> = node.parameters().keys().collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(node.remove("b"), Some(LeafValue::Number(3.0)));
    }
}
