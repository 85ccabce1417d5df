//! The [`TargetSystem`] trait: the narrow interface through which node
//! recomputes read and mutate the external object model.
//!
//! The engine only selects candidate leaf values and hands them over; the
//! adapter decides whether a write is acceptable and reports
//! [`TargetError::Rejected`] otherwise.

use serde::{Deserialize, Serialize};

use treeflow_core::id::ExternalRef;
use treeflow_core::value::{LeafValue, ValueKind};

use crate::error::TargetError;

/// Description of one named field on an external object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Storage kind of the field.
    pub kind: ValueKind,
    pub read_only: bool,
}

/// The external object model consumed by node recomputes.
///
/// The trait is synchronous: every call runs to completion before the
/// scheduler moves on, and the engine provides no cancellation.
pub trait TargetSystem {
    /// Lists the fields of `object` in the target's own order.
    fn fields(&self, object: ExternalRef) -> Result<Vec<FieldInfo>, TargetError>;

    /// Sets field `field` of `object` to `value`.
    ///
    /// Fails with [`TargetError::Rejected`] if the field is read-only, absent,
    /// or cannot hold the value.
    fn set_field(
        &mut self,
        object: ExternalRef,
        field: &str,
        value: &LeafValue,
    ) -> Result<(), TargetError>;

    /// Creates a new object from `template` at `placement`.
    fn create_instance(
        &mut self,
        template: &LeafValue,
        placement: &LeafValue,
    ) -> Result<ExternalRef, TargetError>;

    /// Deletes `object`. Fails with [`TargetError::ObjectNotFound`] if it is
    /// already gone.
    fn delete_object(&mut self, object: ExternalRef) -> Result<(), TargetError>;
}
