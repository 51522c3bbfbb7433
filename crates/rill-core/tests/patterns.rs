//! Integration tests for the pattern engine, static and dynamic sides
//! together.
//!
//! These tests exercise:
//! - List destructures binding elements and rests, both checked and run
//! - Enum-case patterns narrowing and destructuring payloads
//! - String templates matching with backtracking
//! - `is` conditions flowing binders into the taken branch
//! - Check/eval agreement: values the checker admits actually match

use rill_common::{BindingId, Span};
use rill_core::{
    check, eval, CaseSig, Env, Expr, IntRange, Lit, Pattern, Segment, SwitchCase, Ty, TypeEnv,
    Value,
};

// ── Helpers ────────────────────────────────────────────────────────────

const XS: BindingId = BindingId(1);
const FIRST: BindingId = BindingId(2);
const REST: BindingId = BindingId(3);

fn sp() -> Span {
    Span::empty()
}

fn int(n: i64) -> Expr {
    Expr::literal(Lit::Int(n), sp())
}

fn shape_ty() -> Ty {
    Ty::from_cases(
        "Shape",
        vec![
            CaseSig::with_params("Circle", vec![("radius", Ty::float())]),
            CaseSig::with_params("Rect", vec![("w", Ty::float()), ("h", Ty::float())]),
            CaseSig::nullary("Point"),
        ],
    )
}

fn circle(radius: f64) -> Value {
    Value::Case {
        enum_name: "Shape".into(),
        case: "Circle".into(),
        args: vec![Value::Float(radius)],
    }
}

/// `if xs is [first, ...rest] then <then> else <else>`.
fn destructure_if(then: Expr, else_: Expr) -> Expr {
    Expr::If {
        condition: Box::new(Expr::Is {
            subject: Box::new(Expr::reference(XS, "xs", sp())),
            pattern: Pattern::ListOf {
                items: vec![
                    Pattern::binder(FIRST, "first"),
                    Pattern::rest_binder(REST, "rest"),
                ],
            },
            span: sp(),
        }),
        then: Box::new(then),
        else_: Some(Box::new(else_)),
        span: sp(),
    }
}

// ── List destructures ──────────────────────────────────────────────────

#[test]
fn destructure_checks_and_runs_consistently() {
    let expr = destructure_if(Expr::reference(FIRST, "first", sp()), int(-1));

    let mut tenv = TypeEnv::new();
    tenv.bind(XS, "xs", Ty::list(Ty::int_range(Some(0), Some(99))));
    let result = check(&expr, &tenv);
    assert!(result.is_ok(), "errors: {:?}", result.errors);
    // Element type on the hit branch, -1 from the miss branch.
    assert_eq!(result.ty.unwrap(), Ty::int_range(Some(-1), Some(99)));

    let mut env = Env::new();
    env.bind(XS, Value::List(vec![Value::Int(7), Value::Int(8)]));
    assert_eq!(eval(&expr, &env).unwrap(), Value::Int(7));

    let mut env = Env::new();
    env.bind(XS, Value::List(vec![]));
    assert_eq!(eval(&expr, &env).unwrap(), Value::Int(-1));
}

#[test]
fn rest_binder_length_follows_the_subject() {
    let mut tenv = TypeEnv::new();
    tenv.bind(
        XS,
        "xs",
        Ty::list_len(Ty::int(), IntRange::new(Some(2), Some(5))),
    );
    // then-branch returns the rest: a list of length 1...4.
    let expr = destructure_if(
        Expr::reference(REST, "rest", sp()),
        Expr::ListLit {
            items: vec![],
            span: sp(),
        },
    );
    let result = check(&expr, &tenv);
    assert!(result.is_ok(), "errors: {:?}", result.errors);
    match result.ty.unwrap() {
        Ty::List { len, .. } => {
            // Hull with the empty-list else branch.
            assert_eq!(len, IntRange::new(Some(0), Some(4)));
        }
        other => panic!("expected a list, got {other}"),
    }

    let mut env = Env::new();
    env.bind(
        XS,
        Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
    );
    assert_eq!(
        eval(&expr, &env).unwrap(),
        Value::List(vec![Value::Int(2), Value::Int(3)])
    );
}

#[test]
fn destructure_cases_cover_a_bounded_list() {
    // switch xs { [_] -> 1, [] -> 0, [_, _] -> 2 } over a list of length
    // 0...2: the out-of-order cases leave a length gap mid-chain, and the
    // remainder must still reach Never.
    let arm = |width: usize, result: i64| SwitchCase {
        alternatives: vec![Pattern::ListOf {
            items: vec![Pattern::Wildcard; width],
        }],
        body: int(result),
        span: sp(),
    };
    let expr = Expr::Switch {
        subject: Box::new(Expr::reference(XS, "xs", sp())),
        cases: vec![arm(1, 1), arm(0, 0), arm(2, 2)],
        else_: None,
        span: sp(),
    };
    let mut tenv = TypeEnv::new();
    tenv.bind(
        XS,
        "xs",
        Ty::list_len(Ty::int(), IntRange::new(Some(0), Some(2))),
    );
    let result = check(&expr, &tenv);
    assert!(result.is_ok(), "errors: {:?}", result.errors);

    let mut env = Env::new();
    env.bind(XS, Value::List(vec![Value::Int(5), Value::Int(6)]));
    assert_eq!(eval(&expr, &env).unwrap(), Value::Int(2));
}

// ── Enum cases ─────────────────────────────────────────────────────────

#[test]
fn case_pattern_destructures_the_payload() {
    const S: BindingId = BindingId(1);
    const R: BindingId = BindingId(2);
    // if s is Circle(radius) then radius else 0.0
    let expr = Expr::If {
        condition: Box::new(Expr::Is {
            subject: Box::new(Expr::reference(S, "s", sp())),
            pattern: Pattern::Case {
                name: "Circle".into(),
                args: vec![Pattern::binder(R, "radius")],
                rest: false,
            },
            span: sp(),
        }),
        then: Box::new(Expr::reference(R, "radius", sp())),
        else_: Some(Box::new(Expr::literal(Lit::Float(0.0), sp()))),
        span: sp(),
    };

    let mut tenv = TypeEnv::new();
    tenv.bind(S, "s", shape_ty());
    let result = check(&expr, &tenv);
    assert!(result.is_ok(), "errors: {:?}", result.errors);
    assert_eq!(result.ty.unwrap(), Ty::float());

    let mut env = Env::new();
    env.bind(S, circle(2.5));
    assert_eq!(eval(&expr, &env).unwrap(), Value::Float(2.5));
}

#[test]
fn switch_over_cases_is_exhaustive_without_else() {
    const S: BindingId = BindingId(1);
    let expr = Expr::Switch {
        subject: Box::new(Expr::reference(S, "s", sp())),
        cases: vec![
            rill_core::SwitchCase {
                alternatives: vec![Pattern::Case {
                    name: "Circle".into(),
                    args: vec![Pattern::Wildcard],
                    rest: false,
                }],
                body: int(1),
                span: sp(),
            },
            rill_core::SwitchCase {
                alternatives: vec![
                    Pattern::Case {
                        name: "Rect".into(),
                        args: vec![Pattern::Wildcard, Pattern::Wildcard],
                        rest: false,
                    },
                    Pattern::Case {
                        name: "Point".into(),
                        args: vec![],
                        rest: false,
                    },
                ],
                body: int(2),
                span: sp(),
            },
        ],
        else_: None,
        span: sp(),
    };
    let mut tenv = TypeEnv::new();
    tenv.bind(S, "s", shape_ty());
    let result = check(&expr, &tenv);
    assert!(result.is_ok(), "errors: {:?}", result.errors);

    let mut env = Env::new();
    env.bind(S, circle(1.0));
    assert_eq!(eval(&expr, &env).unwrap(), Value::Int(1));
    let mut env = Env::new();
    env.bind(
        S,
        Value::Case {
            enum_name: "Shape".into(),
            case: "Point".into(),
            args: vec![],
        },
    );
    assert_eq!(eval(&expr, &env).unwrap(), Value::Int(2));
}

// ── String templates ───────────────────────────────────────────────────

#[test]
fn template_condition_binds_its_segments() {
    const S: BindingId = BindingId(1);
    const USER: BindingId = BindingId(2);
    const HOST: BindingId = BindingId(3);
    // if s is "<user>@<host>" then user else ""
    let expr = Expr::If {
        condition: Box::new(Expr::Is {
            subject: Box::new(Expr::reference(S, "s", sp())),
            pattern: Pattern::Template {
                segments: vec![
                    Segment::Binder {
                        id: USER,
                        name: "user".into(),
                    },
                    Segment::Text("@".into()),
                    Segment::Binder {
                        id: HOST,
                        name: "host".into(),
                    },
                ],
            },
            span: sp(),
        }),
        then: Box::new(Expr::reference(USER, "user", sp())),
        else_: Some(Box::new(Expr::literal(Lit::Str(String::new()), sp()))),
        span: sp(),
    };

    let mut tenv = TypeEnv::new();
    tenv.bind(S, "s", Ty::str());
    let result = check(&expr, &tenv);
    assert!(result.is_ok(), "errors: {:?}", result.errors);

    let mut env = Env::new();
    env.bind(S, Value::str("ada@example.org"));
    assert_eq!(eval(&expr, &env).unwrap(), Value::str("ada"));

    // The first `@` wins when several could split the string.
    let mut env = Env::new();
    env.bind(S, Value::str("a@b@c"));
    assert_eq!(eval(&expr, &env).unwrap(), Value::str("a"));

    let mut env = Env::new();
    env.bind(S, Value::str("no-marker"));
    assert_eq!(eval(&expr, &env).unwrap(), Value::str(""));
}

// ── Check/eval agreement ───────────────────────────────────────────────

#[test]
fn values_admitted_by_the_checker_actually_match() {
    let patterns = [
        Pattern::Literal(Lit::Int(3)),
        Pattern::Between {
            lo: Lit::Int(0),
            hi: Lit::Int(5),
            ends: rill_core::RangeEnds::Closed,
        },
        Pattern::ListOf {
            items: vec![Pattern::Wildcard, Pattern::rest()],
        },
    ];
    let values = [
        Value::Int(3),
        Value::Int(5),
        Value::Int(9),
        Value::List(vec![Value::Int(1)]),
        Value::List(vec![]),
        Value::str("s"),
    ];
    for pattern in &patterns {
        for value in &values {
            let narrowed = pattern
                .narrow_ty(&value.ty(), true, Span::empty())
                .expect("no ambiguity here");
            let matches = pattern.test(value).is_some();
            // If the narrowed type is empty the matcher must refuse, and
            // a match means the value inhabits the narrowed type.
            if narrowed.is_never() {
                assert!(!matches, "{value} matched {pattern:?} typed Never");
            }
            if matches {
                assert!(
                    value.ty().is_subtype_of(&narrowed),
                    "{value} matched but {narrowed} excludes it"
                );
            }
        }
    }
}
