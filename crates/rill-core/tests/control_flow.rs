//! Integration tests for the control-flow combinators through the public
//! `check`/`eval` entry points.
//!
//! These tests exercise:
//! - If/guard narrowing visible in the result type
//! - Switch exhaustiveness and reachability over ranges and options
//! - Declaration blocks: ordering, cycles, unresolved names
//! - State properties and the `this` receiver
//! - The unbound-name hint when a state property shadows the intent

use rill_common::{BindingId, Span};
use rill_core::{check, eval, BinOp, Decl, Env, Expr, Lit, Pattern, SwitchCase, Ty, TypeEnv, TypeError, Value};

// ── Helpers ────────────────────────────────────────────────────────────

const X: BindingId = BindingId(1);

fn sp() -> Span {
    Span::empty()
}

fn x() -> Expr {
    Expr::reference(X, "x", sp())
}

fn int(n: i64) -> Expr {
    Expr::literal(Lit::Int(n), sp())
}

fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span: sp(),
    }
}

fn check_with_x(expr: &Expr, ty: Ty) -> rill_core::CheckResult {
    let mut env = TypeEnv::new();
    env.bind(X, "x", ty);
    check(expr, &env)
}

fn eval_with_x(expr: &Expr, value: Value) -> Result<Value, TypeError> {
    let mut env = Env::new();
    env.bind(X, value);
    eval(expr, &env)
}

// ── If and guard ───────────────────────────────────────────────────────

#[test]
fn if_without_else_admits_none() {
    let expr = Expr::If {
        condition: Box::new(bin(BinOp::Gt, x(), int(0))),
        then: Box::new(x()),
        else_: None,
        span: sp(),
    };
    let result = check_with_x(&expr, Ty::int());
    assert!(result.is_ok());
    assert_eq!(
        result.ty.unwrap(),
        Ty::union_of([Ty::int_range(Some(1), None), Ty::None])
    );
    assert_eq!(eval_with_x(&expr, Value::Int(-2)).unwrap(), Value::None);
    assert_eq!(eval_with_x(&expr, Value::Int(2)).unwrap(), Value::Int(2));
}

#[test]
fn guard_result_unions_the_fallback_value() {
    // guard x > 0 else 0 ... x  has type Int(0...) for an Int subject.
    let expr = Expr::Guard {
        condition: Box::new(bin(BinOp::Gt, x(), int(0))),
        else_: Box::new(int(0)),
        then: Box::new(x()),
        span: sp(),
    };
    let result = check_with_x(&expr, Ty::int());
    assert!(result.is_ok());
    assert_eq!(result.ty.unwrap(), Ty::int_range(Some(0), None));
    assert_eq!(eval_with_x(&expr, Value::Int(-7)).unwrap(), Value::Int(0));
    assert_eq!(eval_with_x(&expr, Value::Int(7)).unwrap(), Value::Int(7));
}

// ── Switch ─────────────────────────────────────────────────────────────

fn range_switch(with_two: bool) -> Expr {
    let mut cases = vec![
        SwitchCase {
            alternatives: vec![Pattern::Literal(Lit::Int(0))],
            body: int(10),
            span: sp(),
        },
        SwitchCase {
            alternatives: vec![Pattern::Literal(Lit::Int(1))],
            body: int(20),
            span: sp(),
        },
    ];
    if with_two {
        cases.push(SwitchCase {
            alternatives: vec![Pattern::Literal(Lit::Int(2))],
            body: int(30),
            span: sp(),
        });
    }
    Expr::Switch {
        subject: Box::new(x()),
        cases,
        else_: None,
        span: sp(),
    }
}

#[test]
fn switch_covering_the_whole_range_passes() {
    let result = check_with_x(&range_switch(true), Ty::int_range(Some(0), Some(2)));
    assert!(result.is_ok(), "errors: {:?}", result.errors);
    assert_eq!(
        eval_with_x(&range_switch(true), Value::Int(2)).unwrap(),
        Value::Int(30)
    );
}

#[test]
fn switch_missing_a_value_names_the_remainder() {
    let result = check_with_x(&range_switch(false), Ty::int_range(Some(0), Some(2)));
    match result.errors.as_slice() {
        [TypeError::NonExhaustiveSwitch { remaining, .. }] => {
            assert_eq!(*remaining, Ty::int_exact(2));
        }
        other => panic!("expected non-exhaustive, got {other:?}"),
    }
}

#[test]
fn optional_subject_needs_a_none_case() {
    let none_case = SwitchCase {
        alternatives: vec![Pattern::Literal(Lit::None)],
        body: int(0),
        span: sp(),
    };
    let rest_case = SwitchCase {
        alternatives: vec![Pattern::Wildcard],
        body: int(1),
        span: sp(),
    };
    let full = Expr::Switch {
        subject: Box::new(x()),
        cases: vec![none_case, rest_case.clone()],
        else_: None,
        span: sp(),
    };
    let partial = Expr::Switch {
        subject: Box::new(x()),
        cases: vec![rest_case],
        else_: None,
        span: sp(),
    };
    // Wildcard alone covers everything, so `partial` is exhaustive too;
    // the interesting difference is ordering: none first stays reachable.
    let subject = Ty::union_of([Ty::int(), Ty::None]);
    assert!(check_with_x(&full, subject.clone()).is_ok());
    assert!(check_with_x(&partial, subject).is_ok());
    assert_eq!(eval_with_x(&full, Value::None).unwrap(), Value::Int(0));
    assert_eq!(eval_with_x(&full, Value::Int(9)).unwrap(), Value::Int(1));
}

#[test]
fn unreachable_case_fails_the_check() {
    let expr = Expr::Switch {
        subject: Box::new(x()),
        cases: vec![
            SwitchCase {
                alternatives: vec![Pattern::Wildcard],
                body: int(1),
                span: sp(),
            },
            SwitchCase {
                alternatives: vec![Pattern::Literal(Lit::Int(0))],
                body: int(2),
                span: sp(),
            },
        ],
        else_: None,
        span: sp(),
    };
    let result = check_with_x(&expr, Ty::int());
    assert!(!result.is_ok());
    assert!(matches!(
        result.errors.as_slice(),
        [TypeError::UnreachableCase { index: 1, .. }]
    ));
}

// ── Declaration blocks ─────────────────────────────────────────────────

fn decl(id: u32, name: &str, expr: Expr) -> Decl {
    Decl {
        id: BindingId(id),
        name: name.into(),
        expr,
        span: sp(),
    }
}

#[test]
fn declarations_run_in_dependency_order_not_authored_order() {
    // { sum = a + b; a = 1; b = a + 10 } -> sum
    let block = Expr::Block {
        decls: vec![
            decl(
                10,
                "sum",
                bin(
                    BinOp::Add,
                    Expr::reference(BindingId(11), "a", sp()),
                    Expr::reference(BindingId(12), "b", sp()),
                ),
            ),
            decl(11, "a", int(1)),
            decl(
                12,
                "b",
                bin(BinOp::Add, Expr::reference(BindingId(11), "a", sp()), int(10)),
            ),
        ],
        result: Box::new(Expr::reference(BindingId(10), "sum", sp())),
        span: sp(),
    };
    let env = Env::new();
    assert_eq!(eval(&block, &env).unwrap(), Value::Int(12));
    let tenv = TypeEnv::new();
    let result = check(&block, &tenv);
    assert_eq!(result.ty.unwrap(), Ty::int_exact(12));
}

#[test]
fn mutual_recursion_is_rejected_with_the_chain() {
    let block = Expr::Block {
        decls: vec![
            decl(10, "a", Expr::reference(BindingId(11), "b", sp())),
            decl(11, "b", Expr::reference(BindingId(10), "a", sp())),
        ],
        result: Box::new(int(0)),
        span: sp(),
    };
    let result = check(&block, &TypeEnv::new());
    match result.errors.as_slice() {
        [TypeError::CircularDeclarations { chain, .. }] => {
            assert!(chain.len() >= 3, "chain should close the loop: {chain:?}");
            assert_eq!(chain.first(), chain.last());
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn unknown_reference_in_a_block_is_unresolvable() {
    let block = Expr::Block {
        decls: vec![decl(10, "a", Expr::reference(BindingId(99), "ghost", sp()))],
        result: Box::new(Expr::reference(BindingId(10), "a", sp())),
        span: sp(),
    };
    let result = check(&block, &TypeEnv::new());
    match result.errors.as_slice() {
        [TypeError::UnresolvableDeclarations { names, missing, .. }] => {
            assert_eq!(names, &["a"]);
            assert_eq!(missing, &["ghost"]);
        }
        other => panic!("expected unresolvable, got {other:?}"),
    }
}

#[test]
fn shadowing_an_enclosing_name_forces_local_ordering() {
    // Outer n is visible, but the block declares its own n, so m must
    // wait for the local one.
    let mut tenv = TypeEnv::new();
    tenv.bind(BindingId(1), "n", Ty::int_exact(100));
    let block = Expr::Block {
        decls: vec![
            decl(
                10,
                "m",
                bin(BinOp::Add, Expr::reference(BindingId(11), "n", sp()), int(1)),
            ),
            decl(11, "n", int(5)),
        ],
        result: Box::new(Expr::reference(BindingId(10), "m", sp())),
        span: sp(),
    };
    let result = check(&block, &tenv);
    assert!(result.is_ok(), "errors: {:?}", result.errors);
    assert_eq!(result.ty.unwrap(), Ty::int_exact(6));
}

// ── State and receiver ─────────────────────────────────────────────────

#[test]
fn state_properties_resolve_by_name() {
    let expr = Expr::StateRef {
        name: "count".into(),
        span: sp(),
    };
    let mut tenv = TypeEnv::new();
    tenv.set_state("count", Ty::int_range(Some(0), None));
    let result = check(&expr, &tenv);
    assert_eq!(result.ty.unwrap(), Ty::int_range(Some(0), None));

    let mut env = Env::new();
    env.set_state("count", Value::Int(41));
    assert_eq!(eval(&expr, &env).unwrap(), Value::Int(41));
}

#[test]
fn unbound_name_matching_a_state_property_gets_a_hint() {
    let expr = Expr::reference(BindingId(5), "count", sp());
    let mut tenv = TypeEnv::new();
    tenv.set_state("count", Ty::int());
    let result = check(&expr, &tenv);
    match result.errors.as_slice() {
        [TypeError::UnboundName {
            name, did_you_mean, ..
        }] => {
            assert_eq!(name, "count");
            assert_eq!(did_you_mean.as_deref(), Some("count"));
        }
        other => panic!("expected unbound name, got {other:?}"),
    }
}

#[test]
fn this_receiver_checks_and_evaluates() {
    let expr = Expr::This { span: sp() };
    let mut tenv = TypeEnv::new();
    tenv.set_this(Ty::str());
    assert_eq!(check(&expr, &tenv).ty.unwrap(), Ty::str());

    let mut env = Env::new();
    env.set_this(Value::str("receiver"));
    assert_eq!(eval(&expr, &env).unwrap(), Value::str("receiver"));
}
