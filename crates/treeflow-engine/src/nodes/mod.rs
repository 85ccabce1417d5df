//! Built-in nodes.
//!
//! These cover the generic patterns hosts build on: a user-set value, an
//! instance creator that fans out one object per placement leaf, the
//! dynamic-port parameter mapper, a fixed parameter applier, and a
//! first-leaf sampler.

mod apply;
mod constant;
mod creator;
mod first_leaf;
mod mapper;

pub use apply::ParameterApply;
pub use constant::Constant;
pub use creator::InstanceCreator;
pub use first_leaf::FirstLeaf;
pub use mapper::ParameterMapper;

use tracing::warn;

use treeflow_core::value::LeafValue;

use crate::error::{NodeError, TargetError};
use crate::node::RecomputeContext;
use crate::target::TargetSystem;

/// Writes fields onto object leaves, sorting target errors into per-leaf
/// rejections and the first fatal error.
struct FieldWriter<'t> {
    target: &'t mut dyn TargetSystem,
    written: usize,
    rejected: Vec<String>,
    fatal: Option<TargetError>,
}

impl<'t> FieldWriter<'t> {
    fn new(target: &'t mut dyn TargetSystem) -> Self {
        FieldWriter {
            target,
            written: 0,
            rejected: Vec::new(),
            fatal: None,
        }
    }

    /// Sets `field` on the object referenced by `object`. Leaves that are not
    /// object references are rejected without calling the target.
    fn write(&mut self, object: &LeafValue, field: &str, value: &LeafValue) {
        if self.fatal.is_some() {
            return;
        }
        let Some(object_ref) = object.as_external_ref() else {
            self.rejected
                .push(format!("cannot set '{field}' on non-object leaf {object}"));
            return;
        };
        match self.target.set_field(object_ref, field, value) {
            Ok(()) => self.written += 1,
            Err(err) if err.is_rejection() => self.rejected.push(err.to_string()),
            Err(err) => self.fatal = Some(err),
        }
    }

    /// Ends the batch. A fatal error fails the node; otherwise returns the
    /// write count and the rejection messages.
    fn finish(self) -> Result<(usize, Vec<String>), NodeError> {
        match self.fatal {
            Some(err) => Err(err.into()),
            None => Ok((self.written, self.rejected)),
        }
    }
}

/// Turns per-leaf rejections into node warnings.
fn report_rejections(ctx: &mut RecomputeContext<'_>, rejected: Vec<String>) {
    for message in rejected {
        warn!(node = %ctx.node_id(), "{message}");
        ctx.warn(message);
    }
}
