//! Leaf values carried by value trees and ports.
//!
//! [`LeafValue`] is a closed tagged union: every operation over leaves matches
//! exhaustively instead of testing runtime types. [`ValueKind`] is the
//! declared counterpart used by ports and by the target system's field
//! descriptions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::ExternalRef;

/// The declared semantic kind of a port or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Number,
    Integer,
    Text,
    ExternalRef,
    /// Accepts and produces any leaf kind.
    Any,
}

impl ValueKind {
    /// Returns `true` if a leaf of kind `got` may be stored in a slot of this
    /// kind.
    ///
    /// `Any` accepts everything and numeric slots accept integers (widening).
    /// Everything else requires an exact match.
    pub fn accepts(self, got: ValueKind) -> bool {
        match (self, got) {
            (ValueKind::Any, _) => true,
            (ValueKind::Number, ValueKind::Integer) => true,
            (expected, got) => expected == got,
        }
    }

    /// Returns `true` if an output of kind `source` may feed an input of this
    /// kind. An `Any` on either side defers the check to delivery time.
    pub fn compatible_with(self, source: ValueKind) -> bool {
        source == ValueKind::Any || self.accepts(source)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "Number",
            ValueKind::Integer => "Integer",
            ValueKind::Text => "Text",
            ValueKind::ExternalRef => "ExternalRef",
            ValueKind::Any => "Any",
        };
        f.write_str(name)
    }
}

/// A single opaque value stored at a leaf of a value tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LeafValue {
    Number(f64),
    Integer(i64),
    Text(String),
    ExternalRef(ExternalRef),
}

impl LeafValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            LeafValue::Number(_) => ValueKind::Number,
            LeafValue::Integer(_) => ValueKind::Integer,
            LeafValue::Text(_) => ValueKind::Text,
            LeafValue::ExternalRef(_) => ValueKind::ExternalRef,
        }
    }

    /// Returns the referenced external object, if this is a reference leaf.
    pub fn as_external_ref(&self) -> Option<ExternalRef> {
        match self {
            LeafValue::ExternalRef(r) => Some(*r),
            _ => None,
        }
    }

    /// Returns the text, if this is a text leaf.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            LeafValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a numeric view of number and integer leaves.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LeafValue::Number(v) => Some(*v),
            LeafValue::Integer(v) => Some(*v as f64),
            LeafValue::Text(_) | LeafValue::ExternalRef(_) => None,
        }
    }

    /// Converts this value for storage in a slot of kind `target`.
    ///
    /// Integers widen to numbers; any other mismatch is an error.
    pub fn coerce_to(&self, target: ValueKind) -> Result<LeafValue, CoreError> {
        match (target, self) {
            (ValueKind::Number, LeafValue::Integer(v)) => Ok(LeafValue::Number(*v as f64)),
            (target, value) if target.accepts(value.kind()) => Ok(value.clone()),
            (target, value) => Err(CoreError::KindMismatch {
                expected: target,
                got: value.kind(),
            }),
        }
    }
}

impl fmt::Display for LeafValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafValue::Number(v) => write!(f, "{v}"),
            LeafValue::Integer(v) => write!(f, "{v}"),
            LeafValue::Text(s) => write!(f, "{s:?}"),
            LeafValue::ExternalRef(r) => write!(f, "{r}"),
        }
    }
}

impl From<f64> for LeafValue {
    fn from(v: f64) -> Self {
        LeafValue::Number(v)
    }
}

impl From<i64> for LeafValue {
    fn from(v: i64) -> Self {
        LeafValue::Integer(v)
    }
}

impl From<&str> for LeafValue {
    fn from(v: &str) -> Self {
        LeafValue::Text(v.to_string())
    }
}

impl From<String> for LeafValue {
    fn from(v: String) -> Self {
        LeafValue::Text(v)
    }
}

impl From<ExternalRef> for LeafValue {
    fn from(r: ExternalRef) -> Self {
        LeafValue::ExternalRef(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(LeafValue::Number(1.5).kind(), ValueKind::Number);
        assert_eq!(LeafValue::Integer(3).kind(), ValueKind::Integer);
        assert_eq!(LeafValue::from("w").kind(), ValueKind::Text);
        assert_eq!(
            LeafValue::ExternalRef(ExternalRef(1)).kind(),
            ValueKind::ExternalRef
        );
    }

    #[test]
    fn number_slot_accepts_integer() {
        assert!(ValueKind::Number.accepts(ValueKind::Integer));
        assert!(!ValueKind::Integer.accepts(ValueKind::Number));
        assert!(ValueKind::Any.accepts(ValueKind::Text));
        assert!(!ValueKind::Text.accepts(ValueKind::Any));
    }

    #[test]
    fn any_source_is_compatible_with_every_input() {
        assert!(ValueKind::Text.compatible_with(ValueKind::Any));
        assert!(!ValueKind::Text.compatible_with(ValueKind::Number));
    }

    #[test]
    fn coerce_widens_integer() {
        let v = LeafValue::Integer(4).coerce_to(ValueKind::Number).unwrap();
        assert_eq!(v, LeafValue::Number(4.0));
    }

    #[test]
    fn coerce_rejects_text_into_number() {
        let err = LeafValue::from("tall").coerce_to(ValueKind::Number).unwrap_err();
        assert_eq!(
            err,
            CoreError::KindMismatch {
                expected: ValueKind::Number,
                got: ValueKind::Text
            }
        );
    }

    #[test]
    fn display_quotes_text() {
        assert_eq!(LeafValue::from("a").to_string(), "\"a\"");
        assert_eq!(LeafValue::ExternalRef(ExternalRef(3)).to_string(), "#3");
    }
}
