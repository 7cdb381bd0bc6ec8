//! A small reference evaluator for the tree model, used to check that a
//! specialized function behaves like the original.

use std::collections::HashMap;

use eyre::{bail, Result};
use pe_core::ast::{
    AssignTarget, BoolOpKind, CallArg, Expr, Ident, Stmt, StmtFunctionDef, Value,
};
use pe_core::ops;
use pe_core::registry::{CallableKind, Registry};
use pe_optimize::env::Bindings;

const LOOP_LIMIT: u32 = 1_000_000;

enum Flow {
    Normal,
    Break,
    Return(Value),
}

pub fn call_function(
    registry: &Registry,
    def: &StmtFunctionDef,
    args: &[Value],
    globals: &Bindings,
) -> Result<Value> {
    if args.len() != def.params.len() {
        bail!(
            "{}() expects {} arguments, got {}",
            def.name,
            def.params.len(),
            args.len()
        );
    }
    let mut env: HashMap<Ident, Value> = def
        .params
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect();
    let exec = Exec { registry, globals };
    match exec.run_block(&def.body, &mut env)? {
        Flow::Return(value) => Ok(value),
        _ => bail!("{}() fell off the end without returning", def.name),
    }
}

struct Exec<'a> {
    registry: &'a Registry,
    globals: &'a Bindings,
}

impl Exec<'_> {
    fn run_block(&self, stmts: &[Stmt], env: &mut HashMap<Ident, Value>) -> Result<Flow> {
        for stmt in stmts {
            match self.run_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn run_stmt(&self, stmt: &Stmt, env: &mut HashMap<Ident, Value>) -> Result<Flow> {
        match stmt {
            Stmt::Assign(s) => {
                let value = self.eval(&s.value, env)?;
                match &s.target {
                    AssignTarget::Name(name) => {
                        env.insert(name.clone(), value);
                    }
                    _ => bail!("store target not supported by the reference evaluator"),
                }
                Ok(Flow::Normal)
            }
            Stmt::If(s) => {
                if self.eval(&s.test, env)?.truthy() {
                    self.run_block(&s.then, env)
                } else {
                    self.run_block(&s.orelse, env)
                }
            }
            Stmt::While(s) => {
                let mut iterations = 0u32;
                while self.eval(&s.test, env)?.truthy() {
                    iterations += 1;
                    if iterations > LOOP_LIMIT {
                        bail!("loop iteration limit exceeded");
                    }
                    match self.run_block(&s.body, env)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(s) => {
                let value = match &s.value {
                    Some(expr) => self.eval(expr, env)?,
                    None => bail!("bare return not supported by the reference evaluator"),
                };
                Ok(Flow::Return(value))
            }
            Stmt::Raise(s) => match &s.exc {
                Some(expr) => {
                    let value = self.eval(expr, env)?;
                    bail!("raised: {}", value)
                }
                None => bail!("raised"),
            },
            Stmt::Break => Ok(Flow::Break),
            Stmt::Pass => Ok(Flow::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::For(_) | Stmt::FunctionDef(_) => {
                bail!("statement not supported by the reference evaluator")
            }
        }
    }

    fn eval(&self, expr: &Expr, env: &mut HashMap<Ident, Value>) -> Result<Value> {
        match expr {
            Expr::Literal(lit) => Ok(Value::from_lit(lit)),
            Expr::Name(name) => {
                if let Some(value) = env.get(name) {
                    return Ok(value.clone());
                }
                if let Some(value) = self.globals.get(name) {
                    return Ok(value.clone());
                }
                if let Some(id) = self.registry.lookup(name) {
                    return Ok(Value::Callable(id));
                }
                bail!("name {} is not defined", name)
            }
            Expr::Binary(b) => {
                let left = self.eval(&b.left, env)?;
                let right = self.eval(&b.right, env)?;
                ops::fold_binary(b.op, &left, &right).ok_or_else(|| {
                    eyre::eyre!("{} {} {} has no value", left, b.op, right)
                })
            }
            Expr::Unary(u) => {
                let operand = self.eval(&u.operand, env)?;
                ops::fold_unary(u.op, &operand)
                    .ok_or_else(|| eyre::eyre!("{} {} has no value", u.op, operand))
            }
            Expr::Bool(b) => {
                let mut last = None;
                for operand in &b.operands {
                    let value = self.eval(operand, env)?;
                    let deciding = match b.op {
                        BoolOpKind::And => !value.truthy(),
                        BoolOpKind::Or => value.truthy(),
                    };
                    last = Some(value);
                    if deciding {
                        break;
                    }
                }
                last.ok_or_else(|| eyre::eyre!("empty boolean chain"))
            }
            Expr::Compare(c) => {
                let mut prev = self.eval(&c.left, env)?;
                for (op, operand) in &c.comparators {
                    let value = self.eval(operand, env)?;
                    match ops::fold_compare(*op, &prev, &value) {
                        Some(true) => prev = value,
                        Some(false) => return Ok(Value::Bool(false)),
                        None => bail!("cannot compare {} with {}", prev, value),
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Call(call) => {
                let callee = self.eval(&call.callee, env)?;
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    match arg {
                        CallArg::Positional(e) => args.push(self.eval(e, env)?),
                        _ => bail!("call argument kind not supported by the reference evaluator"),
                    }
                }
                let Value::Callable(id) = callee else {
                    bail!("{} is not callable", callee);
                };
                let Some(entry) = self.registry.get(id) else {
                    bail!("unknown callable");
                };
                match &entry.kind {
                    CallableKind::Native(builtin) => Ok(builtin.invoke(&args)?),
                    CallableKind::Defined(def) => {
                        call_function(self.registry, def, &args, self.globals)
                    }
                }
            }
            Expr::Attribute(_) | Expr::Subscript(_) => {
                bail!("expression not supported by the reference evaluator")
            }
        }
    }
}
