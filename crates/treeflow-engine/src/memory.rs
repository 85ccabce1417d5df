//! In-memory implementation of [`TargetSystem`].
//!
//! [`MemoryTarget`] is a first-class backend for tests, demos, and anywhere a
//! real host document isn't available. Objects hold ordered, typed fields
//! that may be read-only; templates describe the fields an instance starts
//! with.

use std::collections::HashMap;

use indexmap::IndexMap;

use treeflow_core::id::ExternalRef;
use treeflow_core::value::{LeafValue, ValueKind};

use crate::error::TargetError;
use crate::target::{FieldInfo, TargetSystem};

/// Name of the read-only field every created instance receives.
pub const PLACEMENT_FIELD: &str = "Placement";

/// A single stored field.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryField {
    pub value: LeafValue,
    pub read_only: bool,
}

/// A stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryObject {
    pub kind: String,
    pub fields: IndexMap<String, MemoryField>,
}

/// Blueprint used by [`TargetSystem::create_instance`].
#[derive(Debug, Clone)]
struct Template {
    placement_kind: ValueKind,
    fields: IndexMap<String, MemoryField>,
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    objects: HashMap<ExternalRef, MemoryObject>,
    templates: HashMap<String, Template>,
    next_ref: u64,
}

impl MemoryTarget {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryTarget::default()
    }

    /// Inserts an object with no fields and returns its reference.
    pub fn insert_object(&mut self, kind: &str) -> ExternalRef {
        let object = ExternalRef(self.next_ref);
        self.next_ref += 1;
        self.objects.insert(
            object,
            MemoryObject {
                kind: kind.to_string(),
                fields: IndexMap::new(),
            },
        );
        object
    }

    /// Adds or replaces a field. Returns `false` if the object doesn't exist.
    pub fn set_field_raw(
        &mut self,
        object: ExternalRef,
        name: &str,
        value: impl Into<LeafValue>,
        read_only: bool,
    ) -> bool {
        match self.objects.get_mut(&object) {
            Some(obj) => {
                obj.fields.insert(
                    name.to_string(),
                    MemoryField {
                        value: value.into(),
                        read_only,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Registers a template. Instances created from it copy `fields` and get
    /// a read-only [`PLACEMENT_FIELD`] holding the placement, which must be
    /// of `placement_kind`.
    pub fn register_template(
        &mut self,
        name: &str,
        placement_kind: ValueKind,
        fields: Vec<(&str, LeafValue, bool)>,
    ) {
        let fields = fields
            .into_iter()
            .map(|(field, value, read_only)| (field.to_string(), MemoryField { value, read_only }))
            .collect();
        self.templates.insert(
            name.to_string(),
            Template {
                placement_kind,
                fields,
            },
        );
    }

    /// Looks up an object.
    pub fn object(&self, object: ExternalRef) -> Option<&MemoryObject> {
        self.objects.get(&object)
    }

    /// Reads one field.
    pub fn field(&self, object: ExternalRef, name: &str) -> Option<&LeafValue> {
        self.objects
            .get(&object)
            .and_then(|obj| obj.fields.get(name))
            .map(|f| &f.value)
    }

    /// Removes an object, returning it.
    pub fn remove_object(&mut self, object: ExternalRef) -> Option<MemoryObject> {
        self.objects.remove(&object)
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl TargetSystem for MemoryTarget {
    fn fields(&self, object: ExternalRef) -> Result<Vec<FieldInfo>, TargetError> {
        let obj = self
            .objects
            .get(&object)
            .ok_or(TargetError::ObjectNotFound { object })?;
        Ok(obj
            .fields
            .iter()
            .map(|(name, field)| FieldInfo {
                name: name.clone(),
                kind: field.value.kind(),
                read_only: field.read_only,
            })
            .collect())
    }

    fn set_field(
        &mut self,
        object: ExternalRef,
        field: &str,
        value: &LeafValue,
    ) -> Result<(), TargetError> {
        let obj = self
            .objects
            .get_mut(&object)
            .ok_or(TargetError::ObjectNotFound { object })?;
        let rejected = |reason: String| TargetError::Rejected {
            object,
            field: field.to_string(),
            reason,
        };

        let slot = obj
            .fields
            .get_mut(field)
            .ok_or_else(|| rejected("no such field".into()))?;
        if slot.read_only {
            return Err(rejected("field is read-only".into()));
        }
        slot.value = value
            .coerce_to(slot.value.kind())
            .map_err(|e| rejected(e.to_string()))?;
        Ok(())
    }

    fn create_instance(
        &mut self,
        template: &LeafValue,
        placement: &LeafValue,
    ) -> Result<ExternalRef, TargetError> {
        let name = template.as_text().ok_or_else(|| TargetError::CreationFailed {
            reason: format!("template must be a name, got {}", template.kind()),
        })?;
        let blueprint = self
            .templates
            .get(name)
            .ok_or_else(|| TargetError::CreationFailed {
                reason: format!("unknown template '{name}'"),
            })?;
        if !blueprint.placement_kind.accepts(placement.kind()) {
            return Err(TargetError::CreationFailed {
                reason: format!(
                    "template '{name}' needs a {} placement, got {}",
                    blueprint.placement_kind,
                    placement.kind()
                ),
            });
        }

        let mut fields = blueprint.fields.clone();
        fields.insert(
            PLACEMENT_FIELD.to_string(),
            MemoryField {
                value: placement.clone(),
                read_only: true,
            },
        );

        let object = ExternalRef(self.next_ref);
        self.next_ref += 1;
        self.objects.insert(
            object,
            MemoryObject {
                kind: name.to_string(),
                fields,
            },
        );
        Ok(object)
    }

    fn delete_object(&mut self, object: ExternalRef) -> Result<(), TargetError> {
        self.objects
            .remove(&object)
            .map(|_| ())
            .ok_or(TargetError::ObjectNotFound { object })
    }
}
