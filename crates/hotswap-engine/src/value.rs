//! Runtime values
//!
//! Objects and closures are reference values: two `Value`s holding the
//! same instance compare equal, two distinct instances never do, whatever
//! their contents.

use crate::object::{ClosureInstance, Instance};
use hotswap_unit::TypeDesc;
use std::fmt;
use std::sync::Arc;

/// A value on the operand stack, in a local, field or captured slot
#[derive(Clone)]
pub enum Value {
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 64-bit float
    F64(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Instance of a reloadable type
    Object(Arc<Instance>),
    /// Closure created at a capture site
    Closure(Arc<ClosureInstance>),
}

impl Value {
    /// Zero value of a declared type
    pub fn default_for(descriptor: &TypeDesc) -> Self {
        match descriptor {
            TypeDesc::Bool => Value::Bool(false),
            TypeDesc::I32 => Value::I32(0),
            TypeDesc::I64 => Value::I64(0),
            TypeDesc::F64 => Value::F64(0.0),
            TypeDesc::Void | TypeDesc::Str | TypeDesc::Object(_) => Value::Null,
        }
    }

    /// Build a string value
    pub fn string(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Whether this is the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload, if any
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Long payload, if any
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload, if any
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Instance payload, if any
    pub fn as_object(&self) -> Option<&Arc<Instance>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Closure payload, if any
    pub fn as_closure(&self) -> Option<&Arc<ClosureInstance>> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    /// Short kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Closure(_) => "closure",
        }
    }

    /// Whether the value may be stored in a slot of the given type
    pub fn conforms_to(&self, descriptor: &TypeDesc) -> bool {
        match (self, descriptor) {
            (Value::Bool(_), TypeDesc::Bool)
            | (Value::I32(_), TypeDesc::I32)
            | (Value::I64(_), TypeDesc::I64)
            | (Value::F64(_), TypeDesc::F64)
            | (Value::Null | Value::Str(_), TypeDesc::Str) => true,
            (Value::Null | Value::Closure(_), TypeDesc::Object(_)) => true,
            (Value::Object(o), TypeDesc::Object(name)) => o.type_name() == name.as_str(),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}i32", v),
            Value::I64(v) => write!(f, "{}i64", v),
            Value::F64(v) => write!(f, "{}f64", v),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(o) => write!(f, "{}@{}", o.type_name(), o.id()),
            Value::Closure(c) => write!(f, "closure@{}", c.id()),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(Value::default_for(&TypeDesc::I32), Value::I32(0));
        assert_eq!(Value::default_for(&TypeDesc::Bool), Value::Bool(false));
        assert_eq!(
            Value::default_for(&TypeDesc::Object("basic.Point".into())),
            Value::Null
        );
    }

    #[test]
    fn test_primitive_equality() {
        assert_eq!(Value::I32(8), Value::from(8));
        assert_ne!(Value::I32(8), Value::I64(8));
        assert_eq!(Value::string("a"), Value::string("a"));
    }

    #[test]
    fn test_conformance() {
        assert!(Value::I32(1).conforms_to(&TypeDesc::I32));
        assert!(!Value::I32(1).conforms_to(&TypeDesc::I64));
        assert!(Value::Null.conforms_to(&TypeDesc::Str));
        assert!(!Value::Null.conforms_to(&TypeDesc::I32));
    }
}
