//! Type-erased property values.
//!
//! Reflected getters return a [`Value`] and setters accept one. The matching
//! [`ValueType`] tag is what a [`PropertyDescriptor`](super::PropertyDescriptor)
//! declares, so callers (a console, an inspector, a replicator) can check a
//! value before handing it to a setter.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::instance::Instance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    String,
    Uuid,
    Instance,
    Instances,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Uuid => "uuid",
            ValueType::Instance => "Instance",
            ValueType::Instances => "Instance[]",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    /// A (possibly absent) reference into the instance tree.
    Instance(Option<Instance>),
    Instances(Vec<Instance>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Uuid(_) => ValueType::Uuid,
            Value::Instance(_) => ValueType::Instance,
            Value::Instances(_) => ValueType::Instances,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Ints widen to floats; nothing else converts.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<Option<Instance>> {
        match self {
            Value::Instance(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Option<Instance>> for Value {
    fn from(i: Option<Instance>) -> Self {
        Value::Instance(i)
    }
}

impl From<Instance> for Value {
    fn from(i: Instance) -> Self {
        Value::Instance(Some(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_matches_variant() {
        assert_eq!(Value::from(true).value_type(), ValueType::Bool);
        assert_eq!(Value::from(3_i64).value_type(), ValueType::Int);
        assert_eq!(Value::from("a").value_type(), ValueType::String);
        assert_eq!(Value::from(None::<Instance>).value_type(), ValueType::Instance);
        assert_eq!(Value::Instances(Vec::new()).value_type(), ValueType::Instances);
    }

    #[test]
    fn ints_widen_to_float_but_not_back() {
        assert_eq!(Value::Int(2).as_float(), Some(2.0));
        assert_eq!(Value::Float(2.5).as_float(), Some(2.5));
        assert_eq!(Value::Float(2.0).as_int(), None);
        assert_eq!(Value::Bool(true).as_float(), None);
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert_eq!(Value::Int(1).as_str(), None);
    }
}
