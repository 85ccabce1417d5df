//! Stable ID newtypes for graph entities and external objects.
//!
//! All IDs are distinct newtype wrappers, so a `NodeId` cannot be used where a
//! `ConnectorId` is expected. Node and connector ids are allocated from
//! monotonically increasing counters and are never reused within a graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Stable connector identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectorId(pub u32);

/// Opaque handle to an object owned by the target system.
///
/// The core never interprets the number; it only hands it back to the
/// target adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalRef(pub u64);

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "7");
    }

    #[test]
    fn connector_id_display() {
        assert_eq!(format!("{}", ConnectorId(99)), "99");
    }

    #[test]
    fn external_ref_display_is_prefixed() {
        assert_eq!(format!("{}", ExternalRef(12)), "#12");
    }

    #[test]
    fn ids_order_by_allocation() {
        assert!(NodeId(1) < NodeId(2));
        assert!(ConnectorId(0) < ConnectorId(10));
    }

    #[test]
    fn external_ref_serializes_as_number() {
        let json = serde_json::to_string(&ExternalRef(42)).unwrap();
        assert_eq!(json, "42");
    }
}
