mod support;

use eyre::Result;
use pretty_assertions::assert_eq;

use pe_core::ast::{BinaryOp::*, CallArg, CompareOp::*, Expr, Stmt, StmtFunctionDef, Value};
use pe_core::registry::{BuiltinFn, CallableFlags, Registry};
use pe_optimize::env::Bindings;
use pe_optimize::orchestrators::{SpecializationOrchestrator, SpecializeOptions};

use support::exec::call_function;
use support::*;

/// The running example: exponentiation by squaring with a recursive,
/// inline-marked definition.
///
/// ```text
/// def power(x, n):
///     if n == 0:
///         return 1
///     if n % 2 == 0:
///         v = power(x, n // 2)
///         return v * v
///     return x * power(x, n - 1)
/// ```
fn power_def() -> StmtFunctionDef {
    fndef(
        "power",
        &["x", "n"],
        vec![if_(
            eq(name("n"), int(0)),
            vec![ret(int(1))],
            vec![if_(
                eq(bin(Mod, name("n"), int(2)), int(0)),
                vec![
                    assign(
                        "v",
                        call("power", vec![name("x"), bin(FloorDiv, name("n"), int(2))]),
                    ),
                    ret(bin(Mul, name("v"), name("v"))),
                ],
                vec![ret(bin(
                    Mul,
                    name("x"),
                    call("power", vec![name("x"), bin(Sub, name("n"), int(1))]),
                ))],
            )],
        )],
    )
}

fn power_registry() -> Registry {
    let mut registry = Registry::with_builtins();
    registry.register_defined(power_def(), CallableFlags::inline_fn());
    registry
}

#[test]
fn known_exponent_unrolls_the_recursion() -> Result<()> {
    let registry = power_registry();
    let outcome = specialize(&registry, &power_def(), &consts(vec![("n", Value::int(5))]))?;
    assert_eq!(outcome.func.params, vec!["x".into()]);
    // Every branch was decided by n's parity chain.
    assert!(!contains_branching(&outcome.func.body));
    assert!(!contains_call(&outcome.func.body));
    assert_eq!(
        call_function(&registry, &outcome.func, &[Value::int(2)], &outcome.bindings)?,
        Value::int(32)
    );
    assert_eq!(
        call_function(&registry, &outcome.func, &[Value::int(3)], &outcome.bindings)?,
        Value::int(243)
    );
    Ok(())
}

#[test]
fn fully_known_input_folds_to_a_literal() -> Result<()> {
    let registry = power_registry();
    let outcome = specialize(
        &registry,
        &power_def(),
        &consts(vec![("x", Value::int(2)), ("n", Value::int(5))]),
    )?;
    assert!(outcome.func.params.is_empty());
    assert_eq!(outcome.func.body.last(), Some(&ret(int(32))));
    assert_eq!(
        call_function(&registry, &outcome.func, &[], &outcome.bindings)?,
        Value::int(32)
    );
    Ok(())
}

#[test]
fn zero_exponent_collapses_to_the_base_case() -> Result<()> {
    let registry = power_registry();
    let outcome = specialize(&registry, &power_def(), &consts(vec![("n", Value::int(0))]))?;
    assert_eq!(outcome.func.body, vec![ret(int(1))]);
    assert_eq!(
        call_function(&registry, &outcome.func, &[Value::int(7)], &outcome.bindings)?,
        Value::int(1)
    );
    Ok(())
}

#[test]
fn specialized_and_original_agree_across_exponents() -> Result<()> {
    let registry = power_registry();
    for n in [1i64, 2, 3, 6, 10] {
        let outcome = specialize(&registry, &power_def(), &consts(vec![("n", Value::int(n))]))?;
        let specialized =
            call_function(&registry, &outcome.func, &[Value::int(3)], &outcome.bindings)?;
        let original = call_function(
            &registry,
            &power_def(),
            &[Value::int(3), Value::int(n)],
            &Bindings::new(),
        )?;
        assert_eq!(specialized, original, "n = {}", n);
    }
    Ok(())
}

#[test]
fn inline_depth_bound_leaves_a_residual_call() -> Result<()> {
    let registry = power_registry();
    let orchestrator = SpecializationOrchestrator::with_options(
        &registry,
        SpecializeOptions {
            max_inline_depth: 2,
        },
    );
    let outcome = orchestrator.specialize(&power_def(), &consts(vec![("n", Value::int(27))]))?;
    // Expansion stopped at the bound; the rest of the recursion stays as an
    // ordinary call and still runs correctly.
    assert!(contains_call(&outcome.func.body));
    assert_eq!(
        call_function(&registry, &outcome.func, &[Value::int(2)], &outcome.bindings)?,
        Value::int(1 << 27)
    );
    Ok(())
}

#[test]
fn splat_arguments_abort_specialization() {
    let registry = Registry::with_builtins();
    let def = fndef(
        "f",
        &[],
        vec![ret(Expr::Call(pe_core::ast::ExprCall::new(
            name("g"),
            vec![CallArg::Starred(name("xs"))],
        )))],
    );
    let err = specialize(&registry, &def, &Bindings::new());
    assert!(matches!(err, Err(pe_core::Error::Unsupported(_))));
}

#[test]
fn failing_pure_invocation_is_left_for_runtime() -> Result<()> {
    let registry = Registry::with_builtins();
    let def = fndef("f", &[], vec![ret(call("int", vec![str_("abc")]))]);
    let outcome = specialize(&registry, &def, &Bindings::new())?;
    assert_eq!(outcome.attempts, 1);
    // The call folds nothing; the parse failure happens when the
    // specialized code runs.
    assert_eq!(outcome.func.body, vec![ret(call("int", vec![str_("abc")]))]);
    assert!(call_function(&registry, &outcome.func, &[], &outcome.bindings).is_err());
    Ok(())
}

#[test]
fn successful_pure_invocation_folds() -> Result<()> {
    let registry = Registry::with_builtins();
    let def = fndef("f", &[], vec![ret(call("abs", vec![neg(name("n"))]))]);
    let outcome = specialize(&registry, &def, &consts(vec![("n", Value::int(5))]))?;
    assert_eq!(outcome.func.body, vec![ret(int(5))]);
    Ok(())
}

#[test]
fn callable_valued_parameters_move_into_the_bindings() -> Result<()> {
    let registry = Registry::with_builtins();
    let abs_id = registry.lookup(&"abs".into()).unwrap();
    let def = fndef(
        "f",
        &["g", "x"],
        vec![ret(call_expr(name("g"), vec![name("x")]))],
    );
    let outcome = specialize(
        &registry,
        &def,
        &consts(vec![("g", Value::Callable(abs_id))]),
    )?;
    // The bound parameter leaves the signature like any other constant; its
    // value has no literal form, so the residual reads of g resolve through
    // the returned bindings.
    assert_eq!(outcome.func.params, vec!["x".into()]);
    assert_eq!(
        outcome.bindings.get(&"g".into()),
        Some(&Value::Callable(abs_id))
    );
    assert_eq!(
        call_function(&registry, &outcome.func, &[Value::int(-3)], &outcome.bindings)?,
        Value::int(3)
    );
    Ok(())
}

#[test]
fn pure_result_without_literal_form_is_not_recomputed() -> Result<()> {
    let mut registry = Registry::with_builtins();
    let abs_id = registry.lookup(&"abs".into()).unwrap();
    registry.register_native(
        BuiltinFn::new("abs_fn", move |_args| Ok(Value::Callable(abs_id))),
        CallableFlags::pure_fn(),
    );
    let def = fndef(
        "f",
        &["x"],
        vec![ret(call_expr(call("abs_fn", vec![]), vec![name("x")]))],
    );
    let outcome = specialize(&registry, &def, &Bindings::new())?;
    // abs_fn() was evaluated once at specialization time; the residual body
    // reads the synthesized binding instead of carrying the call.
    assert_eq!(
        outcome.func.body,
        vec![ret(call_expr(gen_name(0), vec![name("x")]))]
    );
    assert_eq!(
        outcome.bindings.get(&gen(0)),
        Some(&Value::Callable(abs_id))
    );
    assert_eq!(
        call_function(&registry, &outcome.func, &[Value::int(-4)], &outcome.bindings)?,
        Value::int(4)
    );
    Ok(())
}

#[test]
fn loop_tests_are_never_expanded_in_place() -> Result<()> {
    let mut registry = Registry::with_builtins();
    let square = fndef("square", &["y"], vec![ret(bin(Mul, name("y"), name("y")))]);
    registry.register_defined(square, CallableFlags::inline_fn());
    let def = fndef(
        "f",
        &[],
        vec![
            while_(
                cmp(call("square", vec![name("n")]), vec![(Gt, int(0))]),
                vec![pass_()],
            ),
            ret(int(0)),
        ],
    );
    let outcome = specialize(&registry, &def, &consts(vec![("n", Value::int(2))]))?;
    // The call must survive inside the test (it runs per iteration), and n
    // reaching a residual call costs its binding.
    assert_eq!(outcome.attempts, 2);
    let Some(Stmt::While(w)) = outcome.func.body.first() else {
        panic!("expected a while loop, got {:?}", outcome.func.body);
    };
    assert_eq!(
        w.test,
        cmp(call("square", vec![name("n")]), vec![(Gt, int(0))])
    );
    Ok(())
}
