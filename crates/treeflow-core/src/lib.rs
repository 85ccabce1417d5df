pub mod error;
pub mod id;
pub mod port;
pub mod tree;
pub mod value;

// Re-export commonly used types
pub use error::CoreError;
pub use id::{ConnectorId, ExternalRef, NodeId};
pub use port::{InputPort, OutputPort, PortSpec, PortValue};
pub use tree::{broadcast_apply, find_first_leaf, zip_apply, Branch, ValueTree, ZipSummary};
pub use value::{LeafValue, ValueKind};
