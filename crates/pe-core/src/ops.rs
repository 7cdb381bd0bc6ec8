//! Constant folding over [`Value`]s.
//!
//! Every fold returns `Option`: `None` means "cannot fold safely", and the
//! caller leaves the original expression in the tree so the residual program
//! reproduces whatever the runtime would have done (including raising).
//! Integer arithmetic follows the source language: `%` takes the sign of the
//! divisor, `//` floors, `/` is true division, and anything that would
//! overflow an `i64` is left unfolded.

use crate::ast::{BinaryOp, CompareOp, UnaryOp, Value};

/// Remainder with the divisor's sign. `None` on a zero divisor or on the
/// `i64::MIN % -1` edge.
pub fn py_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        r.checked_add(b)
    } else {
        Some(r)
    }
}

/// Division rounding toward negative infinity. `None` on a zero divisor or
/// on `i64::MIN // -1`.
pub fn py_floordiv(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    let r = a.checked_rem(b)?;
    if r != 0 && (a < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn int_pow(base: i64, exp: i64) -> Option<Value> {
    if exp < 0 {
        // Negative exponent produces a float at runtime.
        return float_binop(BinaryOp::Pow, base as f64, exp as f64);
    }
    let exp = u32::try_from(exp).ok()?;
    base.checked_pow(exp).map(Value::Int)
}

fn int_binop(op: BinaryOp, a: i64, b: i64) -> Option<Value> {
    match op {
        BinaryOp::Add => a.checked_add(b).map(Value::Int),
        BinaryOp::Sub => a.checked_sub(b).map(Value::Int),
        BinaryOp::Mul => a.checked_mul(b).map(Value::Int),
        // True division always yields a float.
        BinaryOp::Div => {
            if b == 0 {
                None
            } else {
                Some(Value::float(a as f64 / b as f64))
            }
        }
        BinaryOp::FloorDiv => py_floordiv(a, b).map(Value::Int),
        BinaryOp::Mod => py_mod(a, b).map(Value::Int),
        BinaryOp::Pow => int_pow(a, b),
        BinaryOp::BitAnd => Some(Value::Int(a & b)),
        BinaryOp::BitOr => Some(Value::Int(a | b)),
        BinaryOp::BitXor => Some(Value::Int(a ^ b)),
        BinaryOp::Shl => {
            if !(0..=62).contains(&b) {
                return None;
            }
            let shifted = a.checked_shl(b as u32)?;
            // checked_shl only guards the shift amount, not lost bits.
            if shifted >> (b as u32) != a {
                return None;
            }
            Some(Value::Int(shifted))
        }
        BinaryOp::Shr => {
            if !(0..=62).contains(&b) {
                return None;
            }
            Some(Value::Int(a >> (b as u32)))
        }
    }
}

fn float_binop(op: BinaryOp, a: f64, b: f64) -> Option<Value> {
    let v = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return None;
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return None;
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return None;
            }
            a - b * (a / b).floor()
        }
        BinaryOp::Pow => a.powf(b),
        // Bit operations are undefined on floats.
        _ => return None,
    };
    if v.is_nan() && !a.is_nan() && !b.is_nan() {
        return None;
    }
    Some(Value::float(v))
}

/// Fold a binary operation on two known operands, or `None` when the operand
/// kinds (or the particular values) have no safe compile-time result. `Bool`
/// operands are deliberately excluded from arithmetic even though the runtime
/// coerces them.
pub fn fold_binary(op: BinaryOp, left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_binop(op, *a, *b),
        (Value::Float(a), Value::Float(b)) => float_binop(op, a.value, b.value),
        (Value::Int(a), Value::Float(b)) => float_binop(op, *a as f64, b.value),
        (Value::Float(a), Value::Int(b)) => float_binop(op, a.value, *b as f64),
        // Anything non-numeric (including strings) keeps runtime operator
        // semantics; only the plain numeric kinds fold.
        _ => None,
    }
}

fn cmp_ordering(op: CompareOp, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CompareOp::Eq => ord == Equal,
        CompareOp::NotEq => ord != Equal,
        CompareOp::Lt => ord == Less,
        CompareOp::LtE => ord != Greater,
        CompareOp::Gt => ord == Greater,
        CompareOp::GtE => ord != Less,
    }
}

fn cmp_float(op: CompareOp, a: f64, b: f64) -> Option<bool> {
    let ord = a.partial_cmp(&b)?;
    Some(cmp_ordering(op, ord))
}

/// Compare two known operands. Only same-kind comparisons (plus int/float
/// mixes) fold; anything cross-kind is left for the runtime to complain
/// about.
pub fn fold_compare(op: CompareOp, left: &Value, right: &Value) -> Option<bool> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(cmp_ordering(op, a.cmp(b))),
        (Value::Float(a), Value::Float(b)) => cmp_float(op, a.value, b.value),
        (Value::Int(a), Value::Float(b)) => cmp_float(op, *a as f64, b.value),
        (Value::Float(a), Value::Int(b)) => cmp_float(op, a.value, *b as f64),
        (Value::Str(a), Value::Str(b)) => Some(cmp_ordering(op, a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Some(cmp_ordering(op, a.cmp(b))),
        _ => None,
    }
}

/// Fold a unary operation. `not` works on every value through truthiness;
/// negation is numeric only.
pub fn fold_unary(op: UnaryOp, operand: &Value) -> Option<Value> {
    match op {
        UnaryOp::Not => Some(Value::Bool(!operand.truthy())),
        UnaryOp::Neg => match operand {
            Value::Int(v) => v.checked_neg().map(Value::Int),
            Value::Float(v) => Some(Value::float(-v.value)),
            _ => None,
        },
    }
}
