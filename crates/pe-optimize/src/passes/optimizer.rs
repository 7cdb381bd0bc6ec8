//! The specializing rewriter.
//!
//! One `Optimizer` performs one attempt over one tree: it substitutes known
//! values, folds constant expressions, prunes decided branches, expands
//! inlinable calls and evaluates pure calls. Whenever it discovers that a
//! name it already trusted can be written through (an opaque call argument,
//! a method receiver, a reassignment), the attempt is abandoned with
//! [`Walk::Rollback`] carrying the offending name; the driver retries on a
//! fresh clone with that name barred from folding. Rewriting is strictly
//! source order, so every substitution made before a rollback was already
//! unsound to keep, and the partially rewritten tree is simply discarded.

use std::collections::HashSet;

use pe_core::ast::{
    AssignTarget, BoolOpKind, CallArg, CompareOp, Expr, ExprCall, ExprCompare, Ident, Lit, Stmt,
    StmtFunctionDef, Value,
};
use pe_core::ops;
use pe_core::registry::{CallableId, CallableKind, Registry};
use pe_core::Result;

use crate::env::{Bindings, MutatedSet, NameSupply};
use crate::passes::inliner::Inliner;

/// Outcome of rewriting a node: either keep going, or abandon the whole
/// attempt because `Ident` was folded under a since-falsified assumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Walk {
    Continue,
    Rollback(Ident),
}

/// Propagate a rollback out of the current rewrite method.
macro_rules! walk {
    ($e:expr) => {
        match $e? {
            Walk::Continue => {}
            other => return Ok(other),
        }
    };
}

/// Mark a name mutated, propagating a rollback out of the calling method.
macro_rules! walk_mark {
    ($self:expr, $name:expr) => {
        match $self.mark_mutated($name) {
            Walk::Continue => {}
            other => return Ok(other),
        }
    };
}

pub struct Optimizer<'a> {
    registry: &'a Registry,
    bindings: Bindings,
    mutated: MutatedSet,
    /// Names the driver has invalidated in earlier attempts. Never folded,
    /// never rebound, never rolled back again.
    blocked: HashSet<Ident>,
    /// Names this attempt invented; they have no source-level meaning and
    /// are exempt from the rollback protocol.
    synthesized: HashSet<Ident>,
    names: NameSupply,
    /// Statements to splice in front of the statement being rewritten,
    /// produced by inline expansion inside its expressions.
    pending: Vec<Stmt>,
    inline_depth: u32,
    max_inline_depth: u32,
    /// Non-zero while rewriting a position whose expression is not evaluated
    /// exactly once at runtime: a `while` test (re-evaluated per iteration)
    /// or a short-circuit operand (possibly skipped). Hoisting an expansion
    /// out of such a position would change how often the callee runs.
    suppress_splice: u32,
}

impl<'a> Optimizer<'a> {
    pub fn new(
        registry: &'a Registry,
        seed: Bindings,
        blocked: HashSet<Ident>,
        max_inline_depth: u32,
    ) -> Self {
        Self {
            registry,
            bindings: seed,
            mutated: MutatedSet::new(),
            blocked,
            synthesized: HashSet::new(),
            names: NameSupply::new(),
            pending: Vec::new(),
            inline_depth: 0,
            max_inline_depth,
            suppress_splice: 0,
        }
    }

    /// Rewrite one function in place. On `Walk::Rollback` the tree is left
    /// partially rewritten and must be discarded by the caller.
    pub fn run(&mut self, func: &mut StmtFunctionDef) -> Result<Walk> {
        // Unknown parameters are local unknowns; recording them as mutated
        // also stops them resolving to a registry callable of the same name.
        for param in &func.params {
            if !self.bindings.contains(param) {
                self.mutated.insert(param.clone());
            }
        }
        let walk = self.rewrite_block(&mut func.body)?;
        if walk == Walk::Continue {
            eliminate_dead_code(&mut func.body);
        }
        Ok(walk)
    }

    /// Final environment: the surviving bindings plus the names this attempt
    /// synthesized for folded results.
    pub fn into_state(self) -> (Bindings, HashSet<Ident>) {
        (self.bindings, self.synthesized)
    }

    fn rewrite_block(&mut self, stmts: &mut Vec<Stmt>) -> Result<Walk> {
        let mut i = 0;
        while i < stmts.len() {
            walk!(self.rewrite_stmt(&mut stmts[i]));
            if !self.pending.is_empty() {
                // Expansions hoisted out of the statement's expressions go
                // directly in front of it, already rewritten.
                let prelude = std::mem::take(&mut self.pending);
                let n = prelude.len();
                stmts.splice(i..i, prelude);
                i += n;
            }
            i += 1;
        }
        Ok(Walk::Continue)
    }

    /// A block with its own splice buffer: expansions inside it must not
    /// leak into the enclosing statement's prelude, nor vice versa.
    fn rewrite_nested_block(&mut self, stmts: &mut Vec<Stmt>) -> Result<Walk> {
        let saved = std::mem::take(&mut self.pending);
        let walk = self.rewrite_block(stmts);
        self.pending = saved;
        walk
    }

    /// A block that may execute zero times (loop body, undecided branch):
    /// bindings born inside it must not survive into the code after it.
    fn rewrite_conditional_block(&mut self, stmts: &mut Vec<Stmt>) -> Result<Walk> {
        let before: HashSet<Ident> = self.bindings.names().cloned().collect();
        walk!(self.rewrite_nested_block(stmts));
        let newcomers: Vec<Ident> = self
            .bindings
            .names()
            .filter(|n| !before.contains(*n) && !self.synthesized.contains(*n))
            .cloned()
            .collect();
        for name in newcomers {
            self.bindings.remove(&name);
        }
        Ok(Walk::Continue)
    }

    fn rewrite_stmt(&mut self, stmt: &mut Stmt) -> Result<Walk> {
        match stmt {
            Stmt::Assign(_) => self.rewrite_assign(stmt),
            Stmt::If(_) => self.rewrite_if(stmt),
            Stmt::For(s) => {
                walk!(self.rewrite_expr(&mut s.iter));
                // The target takes an unknown value every iteration.
                let target = s.target.clone();
                walk_mark!(self, &target);
                self.rewrite_conditional_block(&mut s.body)
            }
            Stmt::While(s) => {
                self.suppress_splice += 1;
                let walk = self.rewrite_expr(&mut s.test);
                self.suppress_splice -= 1;
                walk!(walk);
                self.rewrite_conditional_block(&mut s.body)
            }
            Stmt::FunctionDef(def) => {
                // A nested def rebinds its name; its body is left alone.
                let name = def.name.clone();
                walk_mark!(self, &name);
                Ok(Walk::Continue)
            }
            Stmt::Return(s) => match &mut s.value {
                Some(value) => self.rewrite_expr(value),
                None => Ok(Walk::Continue),
            },
            Stmt::Raise(s) => match &mut s.exc {
                Some(exc) => self.rewrite_expr(exc),
                None => Ok(Walk::Continue),
            },
            Stmt::Expr(expr) => self.rewrite_expr(expr),
            Stmt::Break | Stmt::Pass => Ok(Walk::Continue),
        }
    }

    fn rewrite_assign(&mut self, stmt: &mut Stmt) -> Result<Walk> {
        let Stmt::Assign(assign) = stmt else {
            return Ok(Walk::Continue);
        };
        walk!(self.rewrite_expr(&mut assign.value));
        match &mut assign.target {
            AssignTarget::Name(name) => {
                if self.bindings.contains(name) && !self.synthesized.contains(name) {
                    // Reassignment falsifies every substitution already made
                    // for this name.
                    self.bindings.remove(name);
                    tracing::debug!(name = %name, "reassignment of a folded name, rolling back");
                    return Ok(Walk::Rollback(name.clone()));
                }
                self.bindings.remove(name);
                if !self.blocked.contains(name) && !self.mutated.contains(name) {
                    if let Some(value) = self.known_value(&assign.value) {
                        self.bindings.insert(name.clone(), value);
                    } else {
                        // Unknown from here on; this also shadows any
                        // registry callable of the same name.
                        self.mutated.insert(name.clone());
                    }
                }
            }
            AssignTarget::Attribute(attr) => {
                if let Some(base) = attr.base.as_name().cloned() {
                    walk_mark!(self, &base);
                } else {
                    walk!(self.rewrite_expr(&mut attr.base));
                }
            }
            AssignTarget::Subscript(sub) => {
                walk!(self.rewrite_expr(&mut sub.index));
                if let Some(base) = sub.base.as_name().cloned() {
                    walk_mark!(self, &base);
                } else {
                    walk!(self.rewrite_expr(&mut sub.base));
                }
            }
        }
        Ok(Walk::Continue)
    }

    fn rewrite_if(&mut self, stmt: &mut Stmt) -> Result<Walk> {
        let Stmt::If(s) = stmt else {
            return Ok(Walk::Continue);
        };
        walk!(self.rewrite_expr(&mut s.test));
        match self.known_value(&s.test) {
            Some(test) => {
                // Decided: the taken branch is hoisted into the enclosing
                // block and runs unconditionally, so its bindings survive.
                let mut taken = if test.truthy() {
                    std::mem::take(&mut s.then)
                } else {
                    std::mem::take(&mut s.orelse)
                };
                walk!(self.rewrite_nested_block(&mut taken));
                self.pending.append(&mut taken);
                *stmt = Stmt::Pass;
            }
            None => {
                walk!(self.rewrite_conditional_block(&mut s.then));
                walk!(self.rewrite_conditional_block(&mut s.orelse));
            }
        }
        Ok(Walk::Continue)
    }

    fn rewrite_expr(&mut self, expr: &mut Expr) -> Result<Walk> {
        match expr {
            Expr::Literal(_) => Ok(Walk::Continue),
            Expr::Name(name) => {
                if let Some(lit) = self.known_value_of_name(name).and_then(|v| v.as_lit()) {
                    *expr = Expr::Literal(lit);
                }
                Ok(Walk::Continue)
            }
            Expr::Binary(bin) => {
                walk!(self.rewrite_expr(&mut bin.left));
                walk!(self.rewrite_expr(&mut bin.right));
                let folded = match (self.known_value(&bin.left), self.known_value(&bin.right)) {
                    (Some(l), Some(r)) => {
                        ops::fold_binary(bin.op, &l, &r).and_then(|v| v.as_lit())
                    }
                    _ => None,
                };
                if let Some(lit) = folded {
                    *expr = Expr::Literal(lit);
                }
                Ok(Walk::Continue)
            }
            Expr::Unary(un) => {
                walk!(self.rewrite_expr(&mut un.operand));
                let folded = self
                    .known_value(&un.operand)
                    .and_then(|v| ops::fold_unary(un.op, &v))
                    .and_then(|v| v.as_lit());
                if let Some(lit) = folded {
                    *expr = Expr::Literal(lit);
                }
                Ok(Walk::Continue)
            }
            Expr::Bool(_) => self.rewrite_boolop(expr),
            Expr::Compare(cmp) => {
                walk!(self.rewrite_expr(&mut cmp.left));
                for (idx, (_, operand)) in cmp.comparators.iter_mut().enumerate() {
                    // Comparators past the first pair are skipped at runtime
                    // when an earlier pair is false.
                    if idx > 0 {
                        self.suppress_splice += 1;
                    }
                    let walk = self.rewrite_expr(operand);
                    if idx > 0 {
                        self.suppress_splice -= 1;
                    }
                    walk!(walk);
                }
                let folded = self.fold_compare_chain(cmp);
                if let Some(result) = folded {
                    *expr = Expr::bool(result);
                }
                Ok(Walk::Continue)
            }
            Expr::Call(_) => self.rewrite_call(expr),
            Expr::Attribute(attr) => self.rewrite_expr(&mut attr.base),
            Expr::Subscript(sub) => {
                walk!(self.rewrite_expr(&mut sub.base));
                self.rewrite_expr(&mut sub.index)
            }
        }
    }

    /// `and`/`or` folding. Operands are visited left to right until one is
    /// known to decide the chain; the rest were never going to be evaluated
    /// and are dropped. Of the visited operands, a known one can be dropped
    /// too unless it is the last visited (it supplies the chain's value).
    fn rewrite_boolop(&mut self, expr: &mut Expr) -> Result<Walk> {
        let Expr::Bool(b) = expr else {
            return Ok(Walk::Continue);
        };
        let op = b.op;
        let operands = std::mem::take(&mut b.operands);
        if operands.is_empty() {
            return Ok(Walk::Continue);
        }
        let mut visited: Vec<(Expr, bool)> = Vec::new();
        for (idx, mut operand) in operands.into_iter().enumerate() {
            // Operands after the first are skipped at runtime when an
            // earlier operand decides the chain.
            if idx > 0 {
                self.suppress_splice += 1;
            }
            let walk = self.rewrite_expr(&mut operand);
            if idx > 0 {
                self.suppress_splice -= 1;
            }
            walk!(walk);
            let known = self.known_value(&operand);
            let deciding = known.as_ref().is_some_and(|v| match op {
                BoolOpKind::And => !v.truthy(),
                BoolOpKind::Or => v.truthy(),
            });
            visited.push((operand, known.is_some()));
            if deciding {
                break;
            }
        }
        let last = visited.len() - 1;
        let mut kept: Vec<Expr> = visited
            .into_iter()
            .enumerate()
            .filter(|(i, (_, known))| !known || *i == last)
            .map(|(_, (operand, _))| operand)
            .collect();
        if kept.len() == 1 {
            // kept is non-empty here, the chain had at least one operand
            *expr = kept.remove(0);
        } else {
            let Expr::Bool(b) = expr else {
                return Ok(Walk::Continue);
            };
            b.operands = kept;
        }
        Ok(Walk::Continue)
    }

    /// Fold `a < b <= c` when every operand is known. Pairs are checked
    /// left to right: a false pair decides the chain even if a later pair
    /// would not fold.
    fn fold_compare_chain(&self, cmp: &ExprCompare) -> Option<bool> {
        let mut prev = self.known_value(&cmp.left)?;
        let values: Vec<(CompareOp, Value)> = cmp
            .comparators
            .iter()
            .map(|(op, e)| self.known_value(e).map(|v| (*op, v)))
            .collect::<Option<_>>()?;
        for (op, value) in values {
            match ops::fold_compare(op, &prev, &value)? {
                false => return Some(false),
                true => prev = value,
            }
        }
        Some(true)
    }

    fn rewrite_call(&mut self, expr: &mut Expr) -> Result<Walk> {
        let Expr::Call(call) = expr else {
            return Ok(Walk::Continue);
        };
        // A method-style call on a bare name: the receiver is left alone so
        // it can be mutation-marked below, not substituted out from under us.
        let receiver = match call.callee.as_ref() {
            Expr::Attribute(attr) => attr.base.as_name().cloned(),
            _ => None,
        };
        if call
            .args
            .iter()
            .any(|arg| matches!(arg, CallArg::Starred(_) | CallArg::StarredKeyword(_)))
        {
            return Err(pe_core::Error::unsupported(
                "cannot rewrite a call with splat arguments",
            ));
        }
        if receiver.is_none() {
            walk!(self.rewrite_expr(&mut call.callee));
        }

        // Opaque calls mark their bare-name arguments before those arguments
        // are rewritten: a known name reaching an opaque call is exactly the
        // case that must roll back, not fold.
        let opaque = match self.known_value(&call.callee) {
            Some(Value::Callable(id)) => !self.registry.is_pure(id) && !self.can_inline(id, call),
            Some(_) => false,
            None => true,
        };
        if opaque {
            walk!(self.mark_call_opaque(expr, receiver.as_ref()));
            let Expr::Call(call) = expr else {
                return Ok(Walk::Continue);
            };
            for arg in call.args.iter_mut() {
                walk!(self.rewrite_expr(arg.value_mut()));
            }
            return Ok(Walk::Continue);
        }

        for arg in call.args.iter_mut() {
            walk!(self.rewrite_expr(arg.value_mut()));
        }
        match self.known_value(&call.callee) {
            Some(Value::Callable(id)) => {
                if self.can_inline(id, call) {
                    return self.expand_call(expr, id);
                }
                if self.registry.is_pure(id) {
                    self.fold_pure_call(expr, id);
                }
                Ok(Walk::Continue)
            }
            // A known non-callable: the runtime raises before anything can
            // be written through, so nothing needs marking.
            _ => Ok(Walk::Continue),
        }
    }

    fn can_inline(&self, id: CallableId, call: &ExprCall) -> bool {
        if !self.registry.is_inlinable(id)
            || self.inline_depth >= self.max_inline_depth
            || self.suppress_splice > 0
            || !call.all_positional()
        {
            return false;
        }
        match self.registry.get(id).map(|e| e.arity()) {
            Some(Some(arity)) => arity == call.args.len(),
            _ => false,
        }
    }

    fn expand_call(&mut self, expr: &mut Expr, id: CallableId) -> Result<Walk> {
        let def = match self.registry.get(id).map(|e| &e.kind) {
            Some(CallableKind::Defined(def)) => def.clone(),
            _ => return Ok(Walk::Continue),
        };
        let Expr::Call(call) = expr else {
            return Ok(Walk::Continue);
        };
        let args: Vec<Expr> = call
            .args
            .drain(..)
            .filter_map(|arg| match arg {
                CallArg::Positional(e) => Some(e),
                _ => None,
            })
            .collect();
        tracing::debug!(callee = %def.name, depth = self.inline_depth, "expanding call");
        let expansion = Inliner::new(&mut self.names).expand(&def, args)?;
        let mut block = expansion.stmts;
        self.inline_depth += 1;
        let walk = self.rewrite_nested_block(&mut block);
        self.inline_depth -= 1;
        walk!(walk);
        self.unwrap_exit_loop(&mut block)?;
        self.pending.append(&mut block);
        *expr = Expr::Name(expansion.result);
        // The result may have become known while rewriting the expansion.
        self.rewrite_expr(expr)
    }

    /// If an expansion's exit loop pruned down to straight-line code, unwrap
    /// it and rewrite once more so the result binding (stripped under loop
    /// scoping) is recovered. This is what lets a folded callee chain keep
    /// folding at the call site.
    fn unwrap_exit_loop(&mut self, block: &mut Vec<Stmt>) -> Result<Walk> {
        if let Some(Stmt::While(w)) = block.last_mut() {
            // Statements past a decided exit are dead; clearing them first
            // lets a fully pruned body qualify as straight-line.
            if is_literal_true(&w.test) {
                if let Some(pos) = w.body.iter().position(Stmt::is_terminal) {
                    w.body.truncate(pos + 1);
                }
            }
        }
        let unwrappable = matches!(
            block.last(),
            Some(Stmt::While(w)) if is_literal_true(&w.test) && is_flat_exit(&w.body)
        );
        if !unwrappable {
            return Ok(Walk::Continue);
        }
        let Some(Stmt::While(mut w)) = block.pop() else {
            return Ok(Walk::Continue);
        };
        w.body.pop(); // the trailing break
        walk!(self.rewrite_nested_block(&mut w.body));
        block.append(&mut w.body);
        Ok(Walk::Continue)
    }

    /// Evaluate a pure call whose arguments are all known. Failure is not an
    /// error: the call stays put and raises at its original site.
    fn fold_pure_call(&mut self, expr: &mut Expr, id: CallableId) {
        let Expr::Call(call) = expr else {
            return;
        };
        if !call.all_positional() {
            return;
        }
        let args: Option<Vec<Value>> = call
            .args
            .iter()
            .map(|arg| arg.as_positional().and_then(|e| self.known_value(e)))
            .collect();
        let Some(args) = args else {
            return;
        };
        match self.registry.invoke(id, &args) {
            Ok(value) => match value.as_lit() {
                Some(lit) => *expr = Expr::Literal(lit),
                None => {
                    // No literal form (a callable): reference it through a
                    // fresh name resolved by the residual bindings, rather
                    // than re-invoking the call at runtime.
                    let name = self.names.fresh();
                    *expr = Expr::Name(name.clone());
                    self.synthesized.insert(name.clone());
                    self.bindings.insert(name, value);
                }
            },
            Err(err) => {
                tracing::debug!(error = %err, "pure call failed, leaving it in place");
            }
        }
    }

    /// An opaque call may write through any name reaching it: its bare-name
    /// arguments and receiver are untrusted from here on, and if any of them
    /// was already folded the attempt rolls back.
    fn mark_call_opaque(&mut self, expr: &Expr, receiver: Option<&Ident>) -> Result<Walk> {
        let Expr::Call(call) = expr else {
            return Ok(Walk::Continue);
        };
        if let Some(name) = receiver {
            walk_mark!(self, name);
        }
        for arg in &call.args {
            if let Expr::Name(name) = arg.value() {
                let name = name.clone();
                walk_mark!(self, &name);
            }
        }
        Ok(Walk::Continue)
    }

    /// Record that `name` can no longer be trusted. Rolls back if it was
    /// already folded under the old assumption, unless it is one of our own
    /// synthesized names (those have no source meaning to protect).
    fn mark_mutated(&mut self, name: &Ident) -> Walk {
        self.mutated.insert(name.clone());
        if self.bindings.contains(name) && !self.synthesized.contains(name) {
            self.bindings.remove(name);
            tracing::debug!(name = %name, "mutation observed on a folded name, rolling back");
            return Walk::Rollback(name.clone());
        }
        self.bindings.remove(name);
        Walk::Continue
    }

    fn known_value(&self, expr: &Expr) -> Option<Value> {
        match expr {
            Expr::Literal(lit) => Some(Value::from_lit(lit)),
            Expr::Name(name) => self.known_value_of_name(name),
            _ => None,
        }
    }

    fn known_value_of_name(&self, name: &Ident) -> Option<Value> {
        if self.mutated.contains(name) || self.blocked.contains(name) {
            return None;
        }
        if let Some(value) = self.bindings.get(name) {
            return Some(value.clone());
        }
        self.registry.lookup(name).map(Value::Callable)
    }
}

fn is_literal_true(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(Lit::Bool(true)))
}

/// Straight-line statements ending in the loop's single `break`.
fn is_flat_exit(body: &[Stmt]) -> bool {
    let Some((Stmt::Break, rest)) = body.split_last() else {
        return false;
    };
    rest.iter()
        .all(|s| matches!(s, Stmt::Assign(_) | Stmt::Expr(_) | Stmt::Pass))
}

/// Drop everything after a terminal statement and sweep leftover `pass`es,
/// keeping one when a block would otherwise be empty.
pub fn eliminate_dead_code(stmts: &mut Vec<Stmt>) {
    if let Some(pos) = stmts.iter().position(Stmt::is_terminal) {
        stmts.truncate(pos + 1);
    }
    for stmt in stmts.iter_mut() {
        match stmt {
            Stmt::If(s) => {
                eliminate_dead_code(&mut s.then);
                eliminate_dead_code(&mut s.orelse);
            }
            Stmt::For(s) => eliminate_dead_code(&mut s.body),
            Stmt::While(s) => eliminate_dead_code(&mut s.body),
            _ => {}
        }
    }
    if stmts.iter().any(|s| !matches!(s, Stmt::Pass)) {
        stmts.retain(|s| !matches!(s, Stmt::Pass));
    } else {
        stmts.truncate(1);
    }
}
