use serde::{Deserialize, Serialize};

use crate::ast::Lit;
use crate::registry::CallableId;

/// An f64 wrapper that is Eq/Ord/Hash via total ordering, so floats can sit
/// inside tree nodes that derive those traits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValueFloat {
    pub value: f64,
}

impl ValueFloat {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl PartialEq for ValueFloat {
    fn eq(&self, other: &Self) -> bool {
        self.value.total_cmp(&other.value) == std::cmp::Ordering::Equal
    }
}

impl Eq for ValueFloat {}

impl PartialOrd for ValueFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValueFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.total_cmp(&other.value)
    }
}

impl std::hash::Hash for ValueFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.to_bits().hash(state);
    }
}

impl std::fmt::Display for ValueFloat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<f64> for ValueFloat {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

common_enum! {
    /// A value known at specialization time. The enum is closed: the variant
    /// IS the runtime type, and any operand combination not covered by a fold
    /// rule is left in the tree rather than guessed at.
    pub enum Value {
        Int(i64),
        Float(ValueFloat),
        Str(String),
        Bool(bool),
        Callable(CallableId),
    }
}

impl Value {
    pub fn int(v: i64) -> Self {
        Value::Int(v)
    }

    pub fn float(v: f64) -> Self {
        Value::Float(ValueFloat::new(v))
    }

    pub fn str(v: impl Into<String>) -> Self {
        Value::Str(v.into())
    }

    pub fn bool(v: bool) -> Self {
        Value::Bool(v)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
            Value::Callable(_) => "callable",
        }
    }

    /// Truthiness under the source language's rules: zero, the empty string
    /// and `false` are falsy; callables are always truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Float(v) => v.value != 0.0,
            Value::Str(v) => !v.is_empty(),
            Value::Bool(v) => *v,
            Value::Callable(_) => true,
        }
    }

    /// The literal form of this value, if it has one. Callables do not: a
    /// known callable can drive inlining or folding but never substitutes
    /// into the tree as a literal.
    pub fn as_lit(&self) -> Option<Lit> {
        match self {
            Value::Int(v) => Some(Lit::Int(*v)),
            Value::Float(v) => Some(Lit::Float(*v)),
            Value::Str(v) => Some(Lit::Str(v.clone())),
            Value::Bool(v) => Some(Lit::Bool(*v)),
            Value::Callable(_) => None,
        }
    }

    pub fn from_lit(lit: &Lit) -> Self {
        match lit {
            Lit::Int(v) => Value::Int(*v),
            Lit::Float(v) => Value::Float(*v),
            Lit::Str(v) => Value::Str(v.clone()),
            Lit::Bool(v) => Value::Bool(*v),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(v.value),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{:?}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Callable(id) => write!(f, "<callable #{}>", id.0),
        }
    }
}
