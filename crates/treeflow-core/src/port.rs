//! Typed ports: the named attachment points of a node.
//!
//! An [`InputPort`] holds the value most recently delivered to it and at most
//! one incoming connector. An [`OutputPort`] holds the value its node last
//! published. Published tree values are shared behind an `Arc`, so a
//! downstream port holds a snapshot of the last publication and never a live
//! alias into the producer's working state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{ConnectorId, ExternalRef};
use crate::tree::ValueTree;
use crate::value::{LeafValue, ValueKind};

/// Length of the short label derived from a field name.
const NICKNAME_LEN: usize = 3;

/// Declared identity and type of a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Lookup key. For derived ports this is the full field name.
    pub name: String,
    /// Short label shown on the node.
    pub nickname: String,
    /// Tooltip text.
    pub description: String,
    /// Declared kind of the leaves this port carries.
    pub kind: ValueKind,
}

impl PortSpec {
    /// Creates a spec whose nickname and description equal its name.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        PortSpec {
            nickname: name.clone(),
            description: name.clone(),
            name,
            kind,
        }
    }

    /// Creates a spec for a port derived from an external field: the nickname
    /// is the first three characters of the field name, the description is
    /// the full name.
    pub fn derived(field: &str, kind: ValueKind) -> Self {
        PortSpec {
            name: field.to_string(),
            nickname: field.chars().take(NICKNAME_LEN).collect(),
            description: field.to_string(),
            kind,
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A value bound to a port: a single scalar or a whole tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PortValue {
    Scalar(LeafValue),
    Tree(Arc<ValueTree>),
}

impl PortValue {
    /// Wraps a freshly built tree for publication.
    pub fn tree(tree: ValueTree) -> Self {
        PortValue::Tree(Arc::new(tree))
    }

    pub fn scalar(value: impl Into<LeafValue>) -> Self {
        PortValue::Scalar(value.into())
    }

    /// Returns the scalar, if this is one.
    pub fn as_scalar(&self) -> Option<&LeafValue> {
        match self {
            PortValue::Scalar(v) => Some(v),
            PortValue::Tree(_) => None,
        }
    }

    /// Returns the tree, if this is one.
    pub fn as_tree(&self) -> Option<&ValueTree> {
        match self {
            PortValue::Tree(t) => Some(t.as_ref()),
            PortValue::Scalar(_) => None,
        }
    }

    /// Views the value as a tree; a scalar becomes a one-leaf trunk.
    pub fn to_tree(&self) -> Arc<ValueTree> {
        match self {
            PortValue::Tree(t) => Arc::clone(t),
            PortValue::Scalar(v) => Arc::new(ValueTree::from_leaf(v.clone())),
        }
    }

    /// A representative leaf: the scalar itself, or the tree's first leaf.
    pub fn first_leaf(&self) -> Option<&LeafValue> {
        match self {
            PortValue::Scalar(v) => Some(v),
            PortValue::Tree(t) => t.first_leaf(),
        }
    }

    /// Returns `true` if every leaf may be stored in a slot of `kind`.
    pub fn conforms_to(&self, kind: ValueKind) -> bool {
        self.check_kind(kind).is_ok()
    }

    /// Like [`conforms_to`](Self::conforms_to), reporting the first offending
    /// leaf kind.
    pub fn check_kind(&self, kind: ValueKind) -> Result<(), CoreError> {
        let offending = match self {
            PortValue::Scalar(v) => Some(v.kind()).filter(|got| !kind.accepts(*got)),
            PortValue::Tree(t) => t.leaves().map(LeafValue::kind).find(|got| !kind.accepts(*got)),
        };
        match offending {
            Some(got) => Err(CoreError::KindMismatch {
                expected: kind,
                got,
            }),
            None => Ok(()),
        }
    }

    /// Returns `true` if any leaf references `object`.
    pub fn contains_ref(&self, object: ExternalRef) -> bool {
        match self {
            PortValue::Scalar(v) => v.as_external_ref() == Some(object),
            PortValue::Tree(t) => t.contains_ref(object),
        }
    }
}

impl From<ValueTree> for PortValue {
    fn from(tree: ValueTree) -> Self {
        PortValue::tree(tree)
    }
}

impl From<LeafValue> for PortValue {
    fn from(value: LeafValue) -> Self {
        PortValue::Scalar(value)
    }
}

/// An input slot of a node.
#[derive(Debug, Clone)]
pub struct InputPort {
    pub spec: PortSpec,
    value: Option<PortValue>,
    connector: Option<ConnectorId>,
}

impl InputPort {
    pub fn new(spec: PortSpec) -> Self {
        InputPort {
            spec,
            value: None,
            connector: None,
        }
    }

    /// The value last delivered to this port, `None` when unbound.
    pub fn value(&self) -> Option<&PortValue> {
        self.value.as_ref()
    }

    /// The incoming connector, if any.
    pub fn connector(&self) -> Option<ConnectorId> {
        self.connector
    }

    pub fn is_bound(&self) -> bool {
        self.connector.is_some()
    }

    /// Attaches an incoming connector.
    ///
    /// Fails with [`CoreError::PortAlreadyBound`] if another connector is
    /// attached; the caller must kill that one first.
    pub fn bind(&mut self, connector: ConnectorId) -> Result<(), CoreError> {
        match self.connector {
            Some(existing) => Err(CoreError::PortAlreadyBound { existing }),
            None => {
                self.connector = Some(connector);
                Ok(())
            }
        }
    }

    /// Detaches the incoming connector and reverts the value to absent.
    /// Returns the detached connector.
    pub fn unbind(&mut self) -> Option<ConnectorId> {
        self.value = None;
        self.connector.take()
    }

    /// Replaces the delivered value.
    pub fn deliver(&mut self, value: Option<PortValue>) {
        self.value = value;
    }

    /// Returns `true` if `value` is assignable to this port's declared kind.
    pub fn accepts(&self, value: &PortValue) -> bool {
        value.conforms_to(self.spec.kind)
    }
}

/// An output slot of a node.
#[derive(Debug, Clone)]
pub struct OutputPort {
    pub spec: PortSpec,
    value: Option<PortValue>,
}

impl OutputPort {
    pub fn new(spec: PortSpec) -> Self {
        OutputPort { spec, value: None }
    }

    /// The value last published on this port.
    pub fn value(&self) -> Option<&PortValue> {
        self.value.as_ref()
    }

    /// Replaces the published value.
    pub fn publish(&mut self, value: Option<PortValue>) {
        self.value = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Branch;

    #[test]
    fn derived_spec_uses_three_char_nickname() {
        let spec = PortSpec::derived("Height Offset", ValueKind::Number);
        assert_eq!(spec.nickname, "Hei");
        assert_eq!(spec.description, "Height Offset");
        assert_eq!(spec.name, "Height Offset");
    }

    #[test]
    fn derived_spec_keeps_short_names() {
        assert_eq!(PortSpec::derived("W", ValueKind::Integer).nickname, "W");
    }

    #[test]
    fn bind_rejects_second_connector() {
        let mut port = InputPort::new(PortSpec::new("in", ValueKind::Any));
        port.bind(ConnectorId(1)).unwrap();
        let err = port.bind(ConnectorId(2)).unwrap_err();
        assert_eq!(
            err,
            CoreError::PortAlreadyBound {
                existing: ConnectorId(1)
            }
        );
        assert_eq!(port.connector(), Some(ConnectorId(1)));
    }

    #[test]
    fn unbind_clears_value() {
        let mut port = InputPort::new(PortSpec::new("in", ValueKind::Any));
        port.bind(ConnectorId(4)).unwrap();
        port.deliver(Some(PortValue::scalar(1.0)));
        assert_eq!(port.unbind(), Some(ConnectorId(4)));
        assert!(port.value().is_none());
        assert!(!port.is_bound());
        assert_eq!(port.unbind(), None);
    }

    #[test]
    fn tree_value_conformance_checks_every_leaf() {
        let tree = ValueTree::from_trunk(
            Branch::with_leaves([1.0f64]).with_branch(Branch::with_leaves(["oops"])),
        );
        let value = PortValue::tree(tree);
        assert!(!value.conforms_to(ValueKind::Number));
        assert!(value.conforms_to(ValueKind::Any));
        assert_eq!(
            value.check_kind(ValueKind::Number),
            Err(CoreError::KindMismatch {
                expected: ValueKind::Number,
                got: ValueKind::Text
            })
        );
    }

    #[test]
    fn scalar_views_as_single_leaf_tree() {
        let value = PortValue::scalar(3i64);
        let tree = value.to_tree();
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(value.first_leaf(), Some(&LeafValue::Integer(3)));
    }
}
