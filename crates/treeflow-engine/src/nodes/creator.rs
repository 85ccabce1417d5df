use std::any::Any;

use tracing::debug;

use treeflow_core::port::{PortSpec, PortValue};
use treeflow_core::tree::ValueTree;
use treeflow_core::value::{LeafValue, ValueKind};

use crate::error::{NodeError, TargetError};
use crate::node::{Node, RecomputeContext};
use crate::target::TargetSystem;

const PLACEMENTS: usize = 0;
const TEMPLATE: usize = 1;

/// Creates one target object per placement leaf.
///
/// The output tree mirrors the placement tree: each leaf becomes a reference
/// to the object created for it. A placement the target refuses is dropped
/// from its branch and reported as a warning.
///
/// The node owns what it created. Each recompute deletes the previous
/// instances before creating new ones, so the target never holds more than
/// one generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceCreator {
    instances: ValueTree,
}

impl InstanceCreator {
    pub const KIND: &'static str = "InstanceCreator";

    pub fn new() -> Self {
        Self::default()
    }

    /// Objects created by the last recompute.
    pub fn instances(&self) -> &ValueTree {
        &self.instances
    }

    /// Deletes every instance from the last recompute and returns how many
    /// were deleted. Objects already gone from the target are skipped.
    pub fn retire(&mut self, target: &mut dyn TargetSystem) -> Result<usize, TargetError> {
        let mut deleted = 0;
        for object in self.instances.leaves().filter_map(LeafValue::as_external_ref) {
            match target.delete_object(object) {
                Ok(()) => deleted += 1,
                Err(TargetError::ObjectNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        self.instances.clear();
        Ok(deleted)
    }
}

impl Node for InstanceCreator {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn inputs(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("placements", ValueKind::Any)
                .with_nickname("pt")
                .with_description("Placement of each instance, one per leaf."),
            PortSpec::new("template", ValueKind::Text)
                .with_nickname("typ")
                .with_description("Template to instantiate."),
        ]
    }

    fn outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::new("instances", ValueKind::ExternalRef)
            .with_nickname("fi")
            .with_description("Created instances, shaped like the placements.")]
    }

    fn recompute(
        &mut self,
        ctx: &mut RecomputeContext<'_>,
    ) -> Result<Vec<Option<PortValue>>, NodeError> {
        let placements = ctx.require_input(PLACEMENTS)?.to_tree();
        let template = ctx
            .require_input(TEMPLATE)?
            .first_leaf()
            .cloned()
            .ok_or(NodeError::MissingInput { port: TEMPLATE })?;

        let retired = self.retire(ctx.target())?;

        let mut rejected = Vec::new();
        let mut fatal: Option<TargetError> = None;
        let target = ctx.target();
        let created = placements.map_leaves(|placement| {
            if fatal.is_some() {
                return None;
            }
            match target.create_instance(&template, placement) {
                Ok(object) => Some(LeafValue::ExternalRef(object)),
                Err(err) if err.is_rejection() => {
                    rejected.push(format!("placement {placement}: {err}"));
                    None
                }
                Err(err) => {
                    fatal = Some(err);
                    None
                }
            }
        });

        self.instances = created.clone();
        if let Some(err) = fatal {
            return Err(err.into());
        }
        debug!(
            node = %ctx.node_id(),
            retired,
            created = created.leaf_count(),
            rejected = rejected.len(),
            "instances created"
        );
        super::report_rejections(ctx, rejected);
        Ok(vec![Some(PortValue::tree(created))])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
