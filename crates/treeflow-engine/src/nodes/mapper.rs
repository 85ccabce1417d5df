use std::any::Any;

use tracing::debug;

use treeflow_core::port::{PortSpec, PortValue};
use treeflow_core::tree::{broadcast_apply, zip_apply};
use treeflow_core::value::{LeafValue, ValueKind};

use crate::error::NodeError;
use crate::node::{DynamicPorts, Node, RecomputeContext};
use crate::target::TargetSystem;

use super::FieldWriter;

const OBJECTS: usize = 0;

/// Writes per-field values onto a tree of objects, with one input port per
/// writable field of a sampled object.
///
/// Port 0 takes the objects. The remaining ports are derived by
/// [`Graph::remap_ports`](crate::graph::Graph::remap_ports) from the first
/// object's writable Number, Integer and Text fields, in the target's field
/// order. On recompute each connected field port is applied to the objects:
/// a tree value is zipped leaf by leaf against the object tree (objects
/// without a counterpart are left alone), a scalar is broadcast to every
/// object. The object tree is passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMapper {
    mapped: Vec<String>,
}

impl ParameterMapper {
    pub const KIND: &'static str = "ParameterMapper";

    pub fn new() -> Self {
        ParameterMapper::default()
    }

    /// Field names from the last successful remap.
    pub fn mapped_fields(&self) -> &[String] {
        &self.mapped
    }
}

impl Node for ParameterMapper {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("objects", ValueKind::Any)
            .with_nickname("fi")
            .with_description("The objects to map.")]
    }

    fn outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("objects", ValueKind::Any)
            .with_nickname("fi")
            .with_description("The mapped objects.")]
    }

    fn recompute(
        &mut self,
        ctx: &mut RecomputeContext<'_>,
    ) -> Result<Vec<Option<PortValue>>, NodeError> {
        let objects_value = ctx.require_input(OBJECTS)?;
        let objects = objects_value.to_tree();
        let assignments: Vec<(&str, &PortValue)> = ctx
            .inputs()
            .iter()
            .skip(OBJECTS + 1)
            .filter_map(|port| port.value().map(|value| (port.spec.name.as_str(), value)))
            .collect();

        let node = ctx.node_id();
        let mut writer = FieldWriter::new(ctx.target());
        for &(field, value) in &assignments {
            let mut write = |object: &LeafValue, v: &LeafValue| writer.write(object, field, v);
            match value {
                PortValue::Tree(values) => {
                    let summary = zip_apply(&objects, values, &mut write);
                    if summary.is_truncated() {
                        debug!(
                            node = %node,
                            field,
                            skipped = summary.skipped_leaves,
                            "value tree shorter than objects"
                        );
                    }
                }
                PortValue::Scalar(v) => {
                    broadcast_apply(&objects, v, &mut write);
                }
            }
        }
        let (written, rejected) = writer.finish()?;

        debug!(
            node = %node,
            fields = assignments.len(),
            written,
            "parameters mapped"
        );
        super::report_rejections(ctx, rejected);
        Ok(vec![Some(objects_value.clone())])
    }

    fn dynamic_ports(&mut self) -> Option<&mut dyn DynamicPorts> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl DynamicPorts for ParameterMapper {
    fn structural_inputs(&self) -> usize {
        OBJECTS + 1
    }

    fn derive_inputs(
        &mut self,
        sample: Option<&LeafValue>,
        target: &dyn TargetSystem,
    ) -> Result<Vec<PortSpec>, NodeError> {
        let specs: Vec<PortSpec> = match sample.and_then(LeafValue::as_external_ref) {
            Some(object) => target
                .fields(object)?
                .into_iter()
                .filter(|field| !field.read_only)
                .filter(|field| {
                    matches!(
                        field.kind,
                        ValueKind::Number | ValueKind::Integer | ValueKind::Text
                    )
                })
                .map(|field| PortSpec::derived(&field.name, field.kind))
                .collect(),
            None => Vec::new(),
        };
        self.mapped = specs.iter().map(|spec| spec.name.clone()).collect();
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::memory::MemoryTarget;
    use crate::nodes::Constant;
    use treeflow_core::id::{ExternalRef, NodeId};
    use treeflow_core::tree::{Branch, ValueTree};

    fn door(store: &mut MemoryTarget) -> ExternalRef {
        let door = store.insert_object("Door");
        store.set_field_raw(door, "Width", 0.9, false);
        store.set_field_raw(door, "Level", 2i64, false);
        store.set_field_raw(door, "Mark", "D", false);
        store.set_field_raw(door, "Area", 1.8, true);
        store.set_field_raw(door, "Host", ExternalRef(0), false);
        door
    }

    /// Objects constant wired into a remapped mapper.
    fn mapped(store: &mut MemoryTarget, objects: Vec<ExternalRef>) -> (Graph, NodeId) {
        let tree = ValueTree::from_trunk(Branch::with_leaves(objects));
        let mut graph = Graph::default();
        let source = graph.create_node(Constant::new(ValueKind::Any, Some(PortValue::tree(tree))));
        let mapper = graph.create_node(ParameterMapper::new());
        graph.create_connector(source, 0, mapper, OBJECTS).unwrap();
        graph.run_pass(store);
        graph.remap_ports(mapper, store).unwrap();
        (graph, mapper)
    }

    #[test]
    fn derives_writable_scalar_fields_in_order() {
        let mut store = MemoryTarget::new();
        let d = door(&mut store);
        let (graph, mapper) = mapped(&mut store, vec![d]);

        let names: Vec<&str> = graph.inputs(mapper).unwrap()[1..]
            .iter()
            .map(|p| p.spec.name.as_str())
            .collect();
        assert_eq!(names, vec!["Width", "Level", "Mark"]);
        assert_eq!(graph.inputs(mapper).unwrap()[1].spec.nickname, "Wid");
        assert_eq!(
            graph.node_as::<ParameterMapper>(mapper).unwrap().mapped_fields(),
            ["Width", "Level", "Mark"]
        );
    }

    #[test]
    fn scalar_broadcasts_and_tree_zips() {
        let mut store = MemoryTarget::new();
        let doors: Vec<ExternalRef> = (0..3).map(|_| door(&mut store)).collect();
        let (mut graph, mapper) = mapped(&mut store, doors.clone());

        let width = graph.create_node(Constant::new(
            ValueKind::Number,
            Some(PortValue::scalar(1.2)),
        ));
        let marks = graph.create_node(Constant::new(
            ValueKind::Any,
            Some(PortValue::tree(ValueTree::from_trunk(Branch::with_leaves(["A", "B"])))),
        ));
        graph.create_connector(width, 0, mapper, 1).unwrap();
        graph.create_connector(marks, 0, mapper, 3).unwrap();

        let report = graph.run_pass(&mut store);
        assert_eq!(report.recomputed.last(), Some(&mapper));
        assert!(report.partial.is_empty());

        for d in &doors {
            assert_eq!(store.field(*d, "Width"), Some(&LeafValue::Number(1.2)));
        }
        assert_eq!(store.field(doors[0], "Mark"), Some(&LeafValue::from("A")));
        assert_eq!(store.field(doors[1], "Mark"), Some(&LeafValue::from("B")));
        assert_eq!(store.field(doors[2], "Mark"), Some(&LeafValue::from("D")));
        assert!(graph.diagnostics(mapper).unwrap().is_empty());
    }

    #[test]
    fn rejected_leaf_is_a_warning() {
        let mut store = MemoryTarget::new();
        let doors = vec![door(&mut store), door(&mut store)];
        let (mut graph, mapper) = mapped(&mut store, doors.clone());
        store.set_field_raw(doors[1], "Width", 0.9, true);

        let width = graph.create_node(Constant::new(
            ValueKind::Number,
            Some(PortValue::scalar(1.5)),
        ));
        graph.create_connector(width, 0, mapper, 1).unwrap();

        let report = graph.run_pass(&mut store);
        assert!(report.failed.is_empty());
        assert_eq!(report.partial, vec![mapper]);
        assert_eq!(store.field(doors[0], "Width"), Some(&LeafValue::Number(1.5)));
        assert_eq!(store.field(doors[1], "Width"), Some(&LeafValue::Number(0.9)));
    }

    #[test]
    fn missing_object_fails_the_node() {
        let mut store = MemoryTarget::new();
        let d = door(&mut store);
        let (mut graph, mapper) = mapped(&mut store, vec![d]);
        let width = graph.create_node(Constant::new(
            ValueKind::Number,
            Some(PortValue::scalar(1.0)),
        ));
        graph.create_connector(width, 0, mapper, 1).unwrap();

        store.remove_object(d);
        let report = graph.run_pass(&mut store);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, mapper);
    }

    #[test]
    fn output_passes_objects_through() {
        let mut store = MemoryTarget::new();
        let d = door(&mut store);
        let (mut graph, mapper) = mapped(&mut store, vec![d]);
        graph.run_pass(&mut store);
        let output = graph.query_output(mapper, 0).unwrap().unwrap();
        assert_eq!(output.first_leaf(), Some(&LeafValue::ExternalRef(d)));
    }
}
