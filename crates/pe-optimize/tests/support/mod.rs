#![allow(dead_code)]

pub mod exec;

use pe_core::ast::{
    AssignTarget, BinaryOp, BoolOpKind, CallArg, CompareOp, Expr, ExprAttribute, ExprBool,
    ExprCall, ExprCompare, Ident, Stmt, StmtAssign, StmtFunctionDef, StmtIf, StmtRaise, StmtReturn,
    StmtWhile, UnaryOp, Value,
};
use pe_core::registry::Registry;
use pe_optimize::env::Bindings;
use pe_optimize::orchestrators::{SpecializationOrchestrator, SpecializationOutcome};

pub fn name(n: &str) -> Expr {
    Expr::name(n)
}

pub fn int(v: i64) -> Expr {
    Expr::int(v)
}

pub fn float(v: f64) -> Expr {
    Expr::float(v)
}

pub fn bool_(v: bool) -> Expr {
    Expr::bool(v)
}

pub fn str_(v: &str) -> Expr {
    Expr::str(v)
}

pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

pub fn neg(operand: Expr) -> Expr {
    Expr::unary(UnaryOp::Neg, operand)
}

pub fn not_(operand: Expr) -> Expr {
    Expr::unary(UnaryOp::Not, operand)
}

pub fn boolop(op: BoolOpKind, operands: Vec<Expr>) -> Expr {
    Expr::Bool(ExprBool { op, operands })
}

pub fn cmp(left: Expr, comparators: Vec<(CompareOp, Expr)>) -> Expr {
    Expr::Compare(ExprCompare {
        left: left.into(),
        comparators,
    })
}

pub fn eq(left: Expr, right: Expr) -> Expr {
    cmp(left, vec![(CompareOp::Eq, right)])
}

pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
    call_expr(name(callee), args)
}

pub fn call_expr(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call(ExprCall::new(
        callee,
        args.into_iter().map(CallArg::Positional).collect(),
    ))
}

pub fn call_args(callee: &str, args: Vec<CallArg>) -> Expr {
    Expr::Call(ExprCall::new(name(callee), args))
}

pub fn kw(key: &str, value: Expr) -> CallArg {
    CallArg::Keyword {
        name: Ident::new(key),
        value,
    }
}

pub fn method_call(receiver: &str, method: &str, args: Vec<Expr>) -> Expr {
    call_expr(
        Expr::Attribute(ExprAttribute {
            base: name(receiver).into(),
            attr: Ident::new(method),
        }),
        args,
    )
}

pub fn assign(target: &str, value: Expr) -> Stmt {
    Stmt::Assign(StmtAssign {
        target: AssignTarget::Name(Ident::new(target)),
        value,
    })
}

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(expr)
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return(StmtReturn { value: Some(value) })
}

pub fn ret_bare() -> Stmt {
    Stmt::Return(StmtReturn { value: None })
}

pub fn raise_(exc: Expr) -> Stmt {
    Stmt::Raise(StmtRaise { exc: Some(exc) })
}

pub fn if_(test: Expr, then: Vec<Stmt>, orelse: Vec<Stmt>) -> Stmt {
    Stmt::If(StmtIf { test, then, orelse })
}

pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While(StmtWhile { test, body })
}

pub fn pass_() -> Stmt {
    Stmt::Pass
}

pub fn fndef(name: &str, params: &[&str], body: Vec<Stmt>) -> StmtFunctionDef {
    StmtFunctionDef::new(name, params.iter().map(|p| Ident::new(*p)).collect(), body)
}

pub fn consts(pairs: Vec<(&str, Value)>) -> Bindings {
    pairs
        .into_iter()
        .map(|(name, value)| (Ident::new(name), value))
        .collect()
}

pub fn specialize(
    registry: &Registry,
    func: &StmtFunctionDef,
    constants: &Bindings,
) -> pe_core::Result<SpecializationOutcome> {
    SpecializationOrchestrator::new(registry).specialize(func, constants)
}

/// A name the optimizer synthesizes; mirrors its numbering.
pub fn gen(n: u32) -> Ident {
    Ident::new(format!("__pe_var_{}", n))
}

pub fn gen_name(n: u32) -> Expr {
    Expr::Name(gen(n))
}

pub fn gen_assign(n: u32, value: Expr) -> Stmt {
    Stmt::Assign(StmtAssign {
        target: AssignTarget::Name(gen(n)),
        value,
    })
}

pub fn contains_call(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_has_call)
}

fn stmt_has_call(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Assign(s) => expr_has_call(&s.value),
        Stmt::Expr(e) => expr_has_call(e),
        Stmt::Return(s) => s.value.as_ref().is_some_and(expr_has_call),
        Stmt::Raise(s) => s.exc.as_ref().is_some_and(expr_has_call),
        Stmt::If(s) => {
            expr_has_call(&s.test) || contains_call(&s.then) || contains_call(&s.orelse)
        }
        Stmt::While(s) => expr_has_call(&s.test) || contains_call(&s.body),
        Stmt::For(s) => expr_has_call(&s.iter) || contains_call(&s.body),
        Stmt::FunctionDef(def) => contains_call(&def.body),
        Stmt::Break | Stmt::Pass => false,
    }
}

fn expr_has_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call(_) => true,
        Expr::Binary(b) => expr_has_call(&b.left) || expr_has_call(&b.right),
        Expr::Unary(u) => expr_has_call(&u.operand),
        Expr::Bool(b) => b.operands.iter().any(expr_has_call),
        Expr::Compare(c) => {
            expr_has_call(&c.left) || c.comparators.iter().any(|(_, e)| expr_has_call(e))
        }
        Expr::Attribute(a) => expr_has_call(&a.base),
        Expr::Subscript(s) => expr_has_call(&s.base) || expr_has_call(&s.index),
        Expr::Name(_) | Expr::Literal(_) => false,
    }
}

pub fn contains_branching(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::If(_) | Stmt::While(_) | Stmt::For(_) => true,
        _ => false,
    })
}
