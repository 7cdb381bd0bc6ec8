//! The callable registry: a side table mapping names to callables and
//! carrying the pure/inline flags the rewriter consults. The tree itself
//! never stores function objects, only [`CallableId`]s.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ast::{Ident, StmtFunctionDef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct CallableId(pub u32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallableFlags {
    /// Safe to evaluate at specialization time when every argument is known.
    pub pure: bool,
    /// Body may be expanded at call sites.
    pub inline: bool,
}

impl CallableFlags {
    pub fn pure_fn() -> Self {
        Self {
            pure: true,
            inline: false,
        }
    }

    pub fn inline_fn() -> Self {
        Self {
            pure: false,
            inline: true,
        }
    }
}

/// A native call failed (bad arity, bad operand kind, unparsable string).
/// This is not a rewrite error: the caller leaves the call in the tree so
/// the runtime raises at the original site.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct InvokeError {
    pub message: String,
}

impl InvokeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type NativeImpl = Arc<dyn Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync>;

#[derive(Clone)]
pub struct BuiltinFn {
    pub name: Ident,
    func: NativeImpl,
}

impl BuiltinFn {
    pub fn new(
        name: impl Into<Ident>,
        func: impl Fn(&[Value]) -> Result<Value, InvokeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value, InvokeError> {
        (self.func)(args)
    }
}

impl std::fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("BuiltinFn").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub enum CallableKind {
    Native(BuiltinFn),
    Defined(StmtFunctionDef),
}

#[derive(Debug, Clone)]
pub struct CallableEntry {
    pub name: Ident,
    pub kind: CallableKind,
    pub flags: CallableFlags,
}

use CallableKind::*;

impl CallableEntry {
    /// Declared parameter count, for defined callables. Natives check their
    /// own arity at invoke time.
    pub fn arity(&self) -> Option<usize> {
        match &self.kind {
            Native(_) => None,
            Defined(def) => Some(def.params.len()),
        }
    }
}

/// Names resolvable in any function being specialized, before the caller's
/// own constants are layered on.
pub const PURE_BUILTINS: &[&str] = &[
    "abs",
    "len",
    "min",
    "max",
    "bool",
    "int",
    "float",
    "str",
    "round",
    "is_int",
    "is_float",
    "is_str",
    "is_bool",
    "is_callable",
];

#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<CallableEntry>,
    by_name: HashMap<Ident, CallableId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the pure builtin functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for builtin in builtins() {
            registry.register_native(builtin, CallableFlags::pure_fn());
        }
        registry
    }

    pub fn register_native(&mut self, builtin: BuiltinFn, flags: CallableFlags) -> CallableId {
        let name = builtin.name.clone();
        self.insert(CallableEntry {
            name,
            kind: Native(builtin),
            flags,
        })
    }

    pub fn register_defined(&mut self, def: StmtFunctionDef, flags: CallableFlags) -> CallableId {
        self.insert(CallableEntry {
            name: def.name.clone(),
            kind: Defined(def),
            flags,
        })
    }

    fn insert(&mut self, entry: CallableEntry) -> CallableId {
        let id = CallableId(self.entries.len() as u32);
        self.by_name.insert(entry.name.clone(), id);
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: CallableId) -> Option<&CallableEntry> {
        self.entries.get(id.0 as usize)
    }

    pub fn lookup(&self, name: &Ident) -> Option<CallableId> {
        self.by_name.get(name).copied()
    }

    pub fn is_pure(&self, id: CallableId) -> bool {
        self.get(id).map(|e| e.flags.pure).unwrap_or(false)
    }

    pub fn is_inlinable(&self, id: CallableId) -> bool {
        self.get(id).map(|e| e.flags.inline).unwrap_or(false)
    }

    /// Invoke a native callable with fully known arguments.
    pub fn invoke(&self, id: CallableId, args: &[Value]) -> Result<Value, InvokeError> {
        match self.get(id).map(|e| &e.kind) {
            Some(Native(builtin)) => builtin.invoke(args),
            Some(Defined(def)) => Err(InvokeError::new(format!(
                "{} is not a native callable",
                def.name
            ))),
            None => Err(InvokeError::new(format!("unknown callable #{}", id.0))),
        }
    }
}

fn arity_error(name: &str, want: &str, got: usize) -> InvokeError {
    InvokeError::new(format!("{}() takes {} arguments, got {}", name, want, got))
}

fn one_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, InvokeError> {
    match args {
        [v] => Ok(v),
        _ => Err(arity_error(name, "1", args.len())),
    }
}

fn kind_error(name: &str, value: &Value) -> InvokeError {
    InvokeError::new(format!("{}() does not accept {}", name, value.type_name()))
}

fn builtin_abs(args: &[Value]) -> Result<Value, InvokeError> {
    match one_arg("abs", args)? {
        Value::Int(v) => v
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| InvokeError::new("abs() overflow")),
        Value::Float(v) => Ok(Value::float(v.value.abs())),
        other => Err(kind_error("abs", other)),
    }
}

fn builtin_len(args: &[Value]) -> Result<Value, InvokeError> {
    match one_arg("len", args)? {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        other => Err(kind_error("len", other)),
    }
}

fn builtin_extremum(name: &'static str, keep_left: fn(std::cmp::Ordering) -> bool) -> BuiltinFn {
    BuiltinFn::new(name, move |args| {
        if args.len() < 2 {
            return Err(arity_error(name, "at least 2", args.len()));
        }
        let mut best = args[0].clone();
        for arg in &args[1..] {
            let folded = crate::ops::fold_compare(crate::ast::CompareOp::Lt, &best, arg)
                .ok_or_else(|| {
                    InvokeError::new(format!(
                        "{}() cannot compare {} with {}",
                        name,
                        best.type_name(),
                        arg.type_name()
                    ))
                })?;
            let ord = if folded {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            };
            if !keep_left(ord) {
                best = arg.clone();
            }
        }
        Ok(best)
    })
}

fn builtin_bool(args: &[Value]) -> Result<Value, InvokeError> {
    Ok(Value::Bool(one_arg("bool", args)?.truthy()))
}

fn builtin_int(args: &[Value]) -> Result<Value, InvokeError> {
    match one_arg("int", args)? {
        Value::Int(v) => Ok(Value::Int(*v)),
        Value::Bool(v) => Ok(Value::Int(*v as i64)),
        Value::Float(v) => {
            let t = v.value.trunc();
            if t >= i64::MIN as f64 && t <= i64::MAX as f64 {
                Ok(Value::Int(t as i64))
            } else {
                Err(InvokeError::new("int() out of range"))
            }
        }
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| InvokeError::new(format!("int() cannot parse {:?}", s))),
        other => Err(kind_error("int", other)),
    }
}

fn builtin_float(args: &[Value]) -> Result<Value, InvokeError> {
    match one_arg("float", args)? {
        Value::Int(v) => Ok(Value::float(*v as f64)),
        Value::Bool(v) => Ok(Value::float(if *v { 1.0 } else { 0.0 })),
        Value::Float(v) => Ok(Value::Float(*v)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::float)
            .map_err(|_| InvokeError::new(format!("float() cannot parse {:?}", s))),
        other => Err(kind_error("float", other)),
    }
}

fn format_float(v: f64) -> String {
    let s = format!("{}", v);
    if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{}.0", s)
    }
}

fn builtin_str(args: &[Value]) -> Result<Value, InvokeError> {
    match one_arg("str", args)? {
        Value::Int(v) => Ok(Value::Str(v.to_string())),
        Value::Float(v) => Ok(Value::Str(format_float(v.value))),
        Value::Bool(v) => Ok(Value::Str(if *v { "True" } else { "False" }.into())),
        Value::Str(s) => Ok(Value::Str(s.clone())),
        other => Err(kind_error("str", other)),
    }
}

fn builtin_round(args: &[Value]) -> Result<Value, InvokeError> {
    match one_arg("round", args)? {
        Value::Int(v) => Ok(Value::Int(*v)),
        Value::Float(v) => {
            let r = v.value.round_ties_even();
            if r >= i64::MIN as f64 && r <= i64::MAX as f64 {
                Ok(Value::Int(r as i64))
            } else {
                Err(InvokeError::new("round() out of range"))
            }
        }
        other => Err(kind_error("round", other)),
    }
}

fn builtin_predicate(name: &'static str, pred: fn(&Value) -> bool) -> BuiltinFn {
    BuiltinFn::new(name, move |args| Ok(Value::Bool(pred(one_arg(name, args)?))))
}

fn builtins() -> Vec<BuiltinFn> {
    vec![
        BuiltinFn::new("abs", builtin_abs),
        BuiltinFn::new("len", builtin_len),
        builtin_extremum("min", |ord| ord == std::cmp::Ordering::Less),
        builtin_extremum("max", |ord| ord == std::cmp::Ordering::Greater),
        BuiltinFn::new("bool", builtin_bool),
        BuiltinFn::new("int", builtin_int),
        BuiltinFn::new("float", builtin_float),
        BuiltinFn::new("str", builtin_str),
        BuiltinFn::new("round", builtin_round),
        builtin_predicate("is_int", |v| matches!(v, Value::Int(_))),
        builtin_predicate("is_float", |v| matches!(v, Value::Float(_))),
        builtin_predicate("is_str", |v| matches!(v, Value::Str(_))),
        builtin_predicate("is_bool", |v| matches!(v, Value::Bool(_))),
        builtin_predicate("is_callable", |v| matches!(v, Value::Callable(_))),
    ]
}
