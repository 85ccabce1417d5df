//! End-to-end tests for the editor-adapter surface: building graphs,
//! propagating changes, remapping ports and attaching auxiliary objects.
//!
//! Tests cover:
//! - Producer/consumer propagation with a reshaped tree
//! - Transitive dirtying and recompute ordering
//! - Idempotent connector kill
//! - Failure isolation between sibling subgraphs
//! - Port remapping that shrinks the dynamic port set
//! - Auxiliary-object replacement on repeated attach

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use treeflow_core::id::NodeId;
use treeflow_core::port::PortValue;
use treeflow_core::tree::ValueTree;
use treeflow_core::value::{LeafValue, ValueKind};

use treeflow_engine::auxiliary::DisposeError;
use treeflow_engine::nodes::{Constant, FirstLeaf, InstanceCreator, ParameterMapper};
use treeflow_engine::{
    AuxObject, AuxObjectDaemon, CreatorRegistry, Graph, GraphEvent, MemoryTarget, NodeState,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tree(json: &str) -> ValueTree {
    serde_json::from_str(json).unwrap()
}

fn constant_tree(json: &str) -> Constant {
    Constant::new(ValueKind::Any, Some(PortValue::tree(tree(json))))
}

fn dirtied(events: &[GraphEvent], id: NodeId) -> usize {
    events
        .iter()
        .filter(|e| **e == GraphEvent::Dirtied(id))
        .count()
}

fn position(events: &[GraphEvent], wanted: &GraphEvent) -> usize {
    events.iter().position(|e| e == wanted).unwrap()
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

#[test]
fn consumer_sees_first_leaf_after_producer_reshapes() {
    let mut graph = Graph::default();
    let mut store = MemoryTarget::new();

    let p = graph.create_node(constant_tree(
        r#"{"leaves":[{"Text":"A"},{"Text":"B"}],"branches":[{"leaves":[{"Text":"C"}]}]}"#,
    ));
    let q = graph.create_node(FirstLeaf);
    graph.create_connector(p, 0, q, 0).unwrap();
    graph.run_pass(&mut store);
    assert_eq!(graph.state(q).unwrap(), NodeState::Clean);

    let reshaped = tree(r#"{"leaves":[{"Text":"A"},{"Text":"B"}]}"#);
    graph
        .edit_node(p, |c: &mut Constant| c.set(Some(PortValue::tree(reshaped))))
        .unwrap();
    assert_eq!(graph.state(q).unwrap(), NodeState::Dirty);

    let report = graph.run_pass(&mut store);
    assert_eq!(report.recomputed, vec![p, q]);
    assert_eq!(
        graph.query_output(q, 0).unwrap(),
        Some(&PortValue::Scalar(LeafValue::from("A")))
    );
    assert_eq!(
        graph.inputs(q).unwrap()[0].value().unwrap().to_tree().branch_count(),
        0
    );
}

#[test]
fn dirtying_reaches_chain_and_respects_order() {
    let mut graph = Graph::default();
    let mut store = MemoryTarget::new();
    let n = graph.create_node(constant_tree(r#"{"leaves":[{"Number":1.0}]}"#));
    let d1 = graph.create_node(FirstLeaf);
    let d2 = graph.create_node(FirstLeaf);
    graph.create_connector(n, 0, d1, 0).unwrap();
    graph.create_connector(d1, 0, d2, 0).unwrap();
    graph.run_pass(&mut store);
    graph.take_events();

    let marked = graph.mark_dirty(n).unwrap();
    assert_eq!(marked, vec![n, d1, d2]);
    for id in [n, d1, d2] {
        assert_eq!(graph.state(id).unwrap(), NodeState::Dirty);
    }

    graph.run_pass(&mut store);
    let events = graph.take_events();
    assert!(
        position(&events, &GraphEvent::Recomputed(d1))
            < position(&events, &GraphEvent::RecomputeStarted(d2))
    );
}

#[test]
fn killing_twice_fires_one_dirty_event() {
    let mut graph = Graph::default();
    let mut store = MemoryTarget::new();
    let p = graph.create_node(constant_tree(r#"{"leaves":[{"Integer":3}]}"#));
    let q = graph.create_node(FirstLeaf);
    let c = graph.create_connector(p, 0, q, 0).unwrap();
    graph.run_pass(&mut store);
    graph.take_events();

    assert!(graph.kill_connector(c));
    assert!(!graph.kill_connector(c));

    let events = graph.take_events();
    assert_eq!(dirtied(&events, q), 1);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, GraphEvent::ConnectorKilled(_)))
            .count(),
        1
    );
}

#[test]
fn failure_does_not_block_sibling_subgraphs() {
    let mut graph = Graph::default();
    let mut store = MemoryTarget::new();
    store.register_template("Column", ValueKind::Number, vec![]);

    // The creator's template input is left unbound, so it fails.
    let points = graph.create_node(constant_tree(r#"{"leaves":[{"Number":1.0}]}"#));
    let creator = graph.create_node(InstanceCreator::new());
    let after_creator = graph.create_node(FirstLeaf);
    graph.create_connector(points, 0, creator, 0).unwrap();
    graph.create_connector(creator, 0, after_creator, 0).unwrap();

    let sibling = graph.create_node(FirstLeaf);
    graph.create_connector(points, 0, sibling, 0).unwrap();

    let report = graph.run_pass(&mut store);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, creator);
    assert_eq!(report.blocked, vec![after_creator]);
    assert!(report.recomputed.contains(&sibling));
    assert_eq!(graph.state(sibling).unwrap(), NodeState::Clean);

    // Binding the template dirties the creator again and unblocks the chain.
    let template = graph.create_node(Constant::new(
        ValueKind::Text,
        Some(PortValue::scalar("Column")),
    ));
    graph.create_connector(template, 0, creator, 1).unwrap();
    let report = graph.run_pass(&mut store);
    assert!(report.is_clean());
    assert_eq!(graph.state(after_creator).unwrap(), NodeState::Clean);
    assert_eq!(store.object_count(), 1);
}

// ---------------------------------------------------------------------------
// Port remapping
// ---------------------------------------------------------------------------

#[test]
fn remap_from_three_fields_to_one() {
    let mut graph = Graph::default();
    let mut store = MemoryTarget::new();
    let wide = store.insert_object("Window");
    for field in ["Width", "Height", "Sill"] {
        store.set_field_raw(wide, field, 1.0, false);
    }
    let narrow = store.insert_object("Opening");
    store.set_field_raw(narrow, "Depth", 0.2, false);

    let objects = graph.create_node(Constant::new(ValueKind::Any, Some(PortValue::scalar(wide))));
    let mapper = graph.create_node(ParameterMapper::new());
    graph.create_connector(objects, 0, mapper, 0).unwrap();
    graph.run_pass(&mut store);
    graph.remap_ports(mapper, &store).unwrap();
    assert_eq!(graph.inputs(mapper).unwrap().len(), 4);

    let values: Vec<NodeId> = (0..3)
        .map(|i| {
            let v = graph.create_node(Constant::new(
                ValueKind::Number,
                Some(PortValue::scalar(i as f64)),
            ));
            graph.create_connector(v, 0, mapper, i + 1).unwrap();
            v
        })
        .collect();
    graph.run_pass(&mut store);
    assert_eq!(graph.connector_count(), 4);

    graph
        .edit_node(objects, |c: &mut Constant| {
            c.set(Some(PortValue::scalar(narrow)))
        })
        .unwrap();
    graph.run_pass(&mut store);
    graph.take_events();

    let outcome = graph.remap_ports(mapper, &store).unwrap();
    let inputs = graph.inputs(mapper).unwrap();
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[1].spec.name, "Depth");
    assert!(!inputs[1].is_bound());
    assert_eq!(outcome.killed.len(), 3);
    assert_eq!(graph.connector_count(), 1);
    for v in values {
        assert!(graph.dependents(v).unwrap().is_empty());
    }

    let events = graph.take_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, GraphEvent::ConnectorKilled(_)))
            .count(),
        3
    );
    assert_eq!(dirtied(&events, mapper), 1);
    assert!(events.contains(&GraphEvent::PortsRemapped {
        node: mapper,
        removed: 3,
        added: 1
    }));
}

// ---------------------------------------------------------------------------
// Auxiliary objects
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Handle(Rc<Cell<usize>>);

impl AuxObject for Handle {
    fn dispose(&mut self) -> Result<(), DisposeError> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

#[test]
fn attach_twice_disposes_first_handle_once() {
    let mut graph = Graph::default();
    let node = graph.create_node(ParameterMapper::new());

    let disposals: Rc<RefCell<Vec<Rc<Cell<usize>>>>> = Rc::default();
    let mut registry: CreatorRegistry<()> = CreatorRegistry::new();
    let sink = Rc::clone(&disposals);
    registry.register_for_kind(ParameterMapper::KIND, move |_, _, _| {
        let counter = Rc::new(Cell::new(0));
        sink.borrow_mut().push(Rc::clone(&counter));
        Some(Box::new(Handle(counter)) as Box<dyn AuxObject>)
    });
    let mut daemon = AuxObjectDaemon::new(registry);

    assert_eq!(daemon.attach(node, graph.node(node).unwrap(), &()), 1);
    assert_eq!(daemon.attach(node, graph.node(node).unwrap(), &()), 1);

    let counts: Vec<usize> = disposals.borrow().iter().map(|c| c.get()).collect();
    assert_eq!(counts, vec![1, 0]);

    graph.destroy_node(node).unwrap();
    assert_eq!(daemon.detach(node), Ok(true));
    let counts: Vec<usize> = disposals.borrow().iter().map(|c| c.get()).collect();
    assert_eq!(counts, vec![1, 1]);
    assert_eq!(daemon.attached_count(), 0);
}
