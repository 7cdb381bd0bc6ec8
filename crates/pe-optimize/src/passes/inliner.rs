//! Call-site expansion of a defined function body.
//!
//! Every local of the callee is renamed to a fresh name so the expansion can
//! sit inside the caller without capture; `return` becomes an assignment to a
//! fresh result variable. A body whose only return is its final statement
//! expands to a flat block; any other return shape gets a one-iteration
//! `while` wrapper so `break` can stand in for the early exit.

use std::collections::{HashMap, HashSet};

use pe_core::ast::{
    AssignTarget, CallArg, Expr, ExprAttribute, ExprBool, ExprCall, ExprCompare, ExprSubscript,
    ExprUnary, Ident, Stmt, StmtAssign, StmtFor, StmtFunctionDef, StmtIf, StmtReturn, StmtWhile,
};
use pe_core::{bail, Error, Result};

use crate::env::NameSupply;

/// The statements a call site is replaced with, plus the name the call's
/// value lives in afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineExpansion {
    pub stmts: Vec<Stmt>,
    pub result: Ident,
}

pub struct Inliner<'a> {
    names: &'a mut NameSupply,
    mangled: HashMap<Ident, Ident>,
    result: Ident,
}

impl<'a> Inliner<'a> {
    pub fn new(names: &'a mut NameSupply) -> Self {
        Self {
            names,
            mangled: HashMap::new(),
            result: Ident::new(""),
        }
    }

    /// Expand `def` applied to `args` (already rewritten, positional, one
    /// per parameter). Errors abort the whole specialization: a partially
    /// inlined call is worse than none.
    pub fn expand(mut self, def: &StmtFunctionDef, args: Vec<Expr>) -> Result<InlineExpansion> {
        if args.len() != def.params.len() {
            bail!(
                "{}() expects {} arguments, got {}",
                def.name,
                def.params.len(),
                args.len()
            );
        }
        check_returns(&def.body)?;

        // First-appearance order keeps the renaming deterministic, so every
        // attempt over the same tree numbers its fresh names identically.
        let mut seen = HashSet::new();
        let mut locals = Vec::new();
        for param in &def.params {
            if seen.insert(param.clone()) {
                locals.push(param.clone());
            }
        }
        collect_locals(&def.body, &mut seen, &mut locals)?;
        for local in &locals {
            let fresh = self.names.fresh();
            self.mangled.insert(local.clone(), fresh);
        }
        self.result = self.names.fresh();

        let mut stmts: Vec<Stmt> = def
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                Stmt::Assign(StmtAssign {
                    target: AssignTarget::Name(self.rename(param)),
                    value: arg,
                })
            })
            .collect();

        let mut body = self.rewrite_block(&def.body);
        if ends_in_only_return(&def.body) {
            // The final return becomes a plain assignment; no early exits
            // exist, so no wrapper is needed.
            stmts.append(&mut body);
        } else {
            body.push(Stmt::Break);
            stmts.push(Stmt::While(StmtWhile {
                test: Expr::bool(true),
                body,
            }));
        }
        Ok(InlineExpansion {
            stmts,
            result: self.result,
        })
    }

    fn rename(&self, name: &Ident) -> Ident {
        self.mangled.get(name).cloned().unwrap_or_else(|| name.clone())
    }

    /// Rewrite a block, dropping anything after a return: once the return
    /// becomes an assignment, trailing statements would wrongly execute.
    fn rewrite_block(&self, body: &[Stmt]) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            let is_return = matches!(stmt, Stmt::Return(_));
            out.push(self.rewrite_stmt(stmt));
            if is_return {
                break;
            }
        }
        out
    }

    fn rewrite_stmt(&self, stmt: &Stmt) -> Stmt {
        match stmt {
            Stmt::Return(StmtReturn { value: Some(value) }) => Stmt::Assign(StmtAssign {
                target: AssignTarget::Name(self.result.clone()),
                value: self.rewrite_expr(value),
            }),
            // Bare returns were rejected up front.
            Stmt::Return(StmtReturn { value: None }) => Stmt::Pass,
            Stmt::Assign(assign) => Stmt::Assign(StmtAssign {
                target: self.rewrite_target(&assign.target),
                value: self.rewrite_expr(&assign.value),
            }),
            Stmt::If(stmt) => {
                let mut then = self.rewrite_block(&stmt.then);
                let mut orelse = self.rewrite_block(&stmt.orelse);
                // A branch ending in a rewritten return must still leave the
                // wrapper loop.
                if branch_returned(&stmt.then) {
                    then.push(Stmt::Break);
                }
                if branch_returned(&stmt.orelse) {
                    orelse.push(Stmt::Break);
                }
                Stmt::If(StmtIf {
                    test: self.rewrite_expr(&stmt.test),
                    then,
                    orelse,
                })
            }
            Stmt::For(stmt) => Stmt::For(StmtFor {
                target: self.rename(&stmt.target),
                iter: self.rewrite_expr(&stmt.iter),
                body: self.rewrite_block(&stmt.body),
            }),
            Stmt::While(stmt) => Stmt::While(StmtWhile {
                test: self.rewrite_expr(&stmt.test),
                body: self.rewrite_block(&stmt.body),
            }),
            Stmt::Raise(stmt) => Stmt::Raise(pe_core::ast::StmtRaise {
                exc: stmt.exc.as_ref().map(|e| self.rewrite_expr(e)),
            }),
            Stmt::Expr(expr) => Stmt::Expr(self.rewrite_expr(expr)),
            Stmt::Break => Stmt::Break,
            Stmt::Pass => Stmt::Pass,
            // Rejected by collect_locals.
            Stmt::FunctionDef(def) => Stmt::FunctionDef(def.clone()),
        }
    }

    fn rewrite_target(&self, target: &AssignTarget) -> AssignTarget {
        match target {
            AssignTarget::Name(name) => AssignTarget::Name(self.rename(name)),
            AssignTarget::Attribute(attr) => AssignTarget::Attribute(ExprAttribute {
                base: self.rewrite_expr(&attr.base).into(),
                attr: attr.attr.clone(),
            }),
            AssignTarget::Subscript(sub) => AssignTarget::Subscript(ExprSubscript {
                base: self.rewrite_expr(&sub.base).into(),
                index: self.rewrite_expr(&sub.index).into(),
            }),
        }
    }

    fn rewrite_expr(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::Name(name) => Expr::Name(self.rename(name)),
            Expr::Literal(lit) => Expr::Literal(lit.clone()),
            Expr::Binary(bin) => Expr::binary(
                bin.op,
                self.rewrite_expr(&bin.left),
                self.rewrite_expr(&bin.right),
            ),
            Expr::Unary(un) => Expr::Unary(ExprUnary {
                op: un.op,
                operand: self.rewrite_expr(&un.operand).into(),
            }),
            Expr::Bool(b) => Expr::Bool(ExprBool {
                op: b.op,
                operands: b.operands.iter().map(|e| self.rewrite_expr(e)).collect(),
            }),
            Expr::Compare(cmp) => Expr::Compare(ExprCompare {
                left: self.rewrite_expr(&cmp.left).into(),
                comparators: cmp
                    .comparators
                    .iter()
                    .map(|(op, e)| (*op, self.rewrite_expr(e)))
                    .collect(),
            }),
            Expr::Call(call) => Expr::Call(ExprCall {
                callee: self.rewrite_expr(&call.callee).into(),
                args: call.args.iter().map(|arg| self.rewrite_arg(arg)).collect(),
            }),
            Expr::Attribute(attr) => Expr::Attribute(ExprAttribute {
                base: self.rewrite_expr(&attr.base).into(),
                attr: attr.attr.clone(),
            }),
            Expr::Subscript(sub) => Expr::Subscript(ExprSubscript {
                base: self.rewrite_expr(&sub.base).into(),
                index: self.rewrite_expr(&sub.index).into(),
            }),
        }
    }

    fn rewrite_arg(&self, arg: &CallArg) -> CallArg {
        match arg {
            CallArg::Positional(e) => CallArg::Positional(self.rewrite_expr(e)),
            CallArg::Keyword { name, value } => CallArg::Keyword {
                name: name.clone(),
                value: self.rewrite_expr(value),
            },
            CallArg::Starred(e) => CallArg::Starred(self.rewrite_expr(e)),
            CallArg::StarredKeyword(e) => CallArg::StarredKeyword(self.rewrite_expr(e)),
        }
    }
}

/// Whether a block's last statement is its only return. If so the body can
/// be inlined flat, without the loop wrapper.
fn ends_in_only_return(body: &[Stmt]) -> bool {
    let Some((last, rest)) = body.split_last() else {
        return false;
    };
    matches!(last, Stmt::Return(StmtReturn { value: Some(_) }))
        && !rest.iter().any(stmt_contains_return)
}

/// Whether this block itself (not a nested branch) contains a return, which
/// after rewriting needs a `break` appended to leave the wrapper loop.
fn branch_returned(body: &[Stmt]) -> bool {
    body.iter()
        .any(|s| matches!(s, Stmt::Return(StmtReturn { value: Some(_) })))
}

fn stmt_contains_return(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(_) => true,
        Stmt::If(s) => {
            s.then.iter().any(stmt_contains_return) || s.orelse.iter().any(stmt_contains_return)
        }
        Stmt::For(s) => s.body.iter().any(stmt_contains_return),
        Stmt::While(s) => s.body.iter().any(stmt_contains_return),
        _ => false,
    }
}

/// Reject return shapes the expansion cannot express: a bare `return` has no
/// value to bind, and a return inside the callee's own loop would need a
/// multi-level break.
fn check_returns(body: &[Stmt]) -> Result<()> {
    for stmt in body {
        match stmt {
            Stmt::Return(StmtReturn { value: None }) => {
                return Err(Error::unsupported("cannot inline a bare return"));
            }
            Stmt::If(s) => {
                check_returns(&s.then)?;
                check_returns(&s.orelse)?;
            }
            Stmt::For(s) => {
                if s.body.iter().any(stmt_contains_return) {
                    return Err(Error::unsupported("cannot inline a return inside a loop"));
                }
            }
            Stmt::While(s) => {
                if s.body.iter().any(stmt_contains_return) {
                    return Err(Error::unsupported("cannot inline a return inside a loop"));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Gather every name the body binds, in first-appearance order: assignment
/// targets, loop targets. A nested def is rejected outright, renaming around
/// closures is not worth the subtlety.
fn collect_locals(body: &[Stmt], seen: &mut HashSet<Ident>, locals: &mut Vec<Ident>) -> Result<()> {
    let mut record = |name: &Ident, seen: &mut HashSet<Ident>, locals: &mut Vec<Ident>| {
        if seen.insert(name.clone()) {
            locals.push(name.clone());
        }
    };
    for stmt in body {
        match stmt {
            Stmt::Assign(StmtAssign {
                target: AssignTarget::Name(name),
                ..
            }) => {
                record(name, seen, locals);
            }
            Stmt::For(s) => {
                record(&s.target, seen, locals);
                collect_locals(&s.body, seen, locals)?;
            }
            Stmt::While(s) => collect_locals(&s.body, seen, locals)?,
            Stmt::If(s) => {
                collect_locals(&s.then, seen, locals)?;
                collect_locals(&s.orelse, seen, locals)?;
            }
            Stmt::FunctionDef(def) => {
                return Err(Error::unsupported(format!(
                    "cannot inline a body with a nested def {}",
                    def.name
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
