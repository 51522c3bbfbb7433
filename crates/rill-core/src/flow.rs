//! Flow-sensitive checking without a control-flow graph.
//!
//! A condition is interrogated twice: once for the facts it proves when it
//! holds, once for the facts its failure proves. Each answer is a flat
//! [`Facts`] layer pushed over the environment for the matching branch, so
//! narrowing follows expression structure directly.
//!
//! `and` stacks its facts left to right; `or` and the negations merge the
//! branch layers with [`merge_branch_facts`]. Switches thread a single
//! "remaining" subject type through their cases, which is also what
//! exhaustiveness and reachability are judged against.

use rill_common::{BindingId, Span};

use crate::env::{Facts, TypeEnv};
use crate::error::TypeError;
use crate::expr::{expect_bool, BinOp, Expr, SwitchCase, UnOp};
use crate::formula::relate;
use crate::narrow::narrow;
use crate::pattern::Pattern;
use crate::ty::Ty;

/// Shared checking state: accumulated diagnostics.
///
/// Errors that poison the result type propagate as `Err`; exhaustiveness
/// and reachability errors are pushed here so checking can continue
/// past them.
#[derive(Debug, Default)]
pub struct Checker {
    pub errors: Vec<TypeError>,
}

impl Checker {
    pub fn new() -> Checker {
        Checker::default()
    }
}

/// The facts `condition` proves when it evaluates to `truth`.
///
/// The result maps bindings to their narrowed types; bindings it does not
/// mention are unaffected. Conditions the engine cannot reason about
/// simply prove nothing.
pub fn facts(
    ck: &mut Checker,
    env: &TypeEnv,
    condition: &Expr,
    truth: bool,
) -> Result<Facts, TypeError> {
    match condition {
        Expr::Unary {
            op: UnOp::Not,
            operand,
            ..
        } => facts(ck, env, operand, !truth),
        Expr::Binary {
            op: op @ (BinOp::And | BinOp::Or),
            lhs,
            rhs,
            ..
        } => {
            // `and` when true and `or` when false are conjunctions; the
            // other two sides are disjunctions of the branch layers.
            let conjunctive = (*op == BinOp::And) == truth;
            if conjunctive {
                let mut layer = facts(ck, env, lhs, truth)?;
                let narrowed = env.with_facts(layer.clone());
                let rhs_layer = facts(ck, &narrowed, rhs, truth)?;
                layer.extend(rhs_layer);
                Ok(layer)
            } else {
                // A or B  =  A, or else (not A) with B. The And-false
                // case is the same shape with both polarities flipped.
                let first = facts(ck, env, lhs, truth)?;
                let lhs_other = facts(ck, env, lhs, !truth)?;
                let narrowed = env.with_facts(lhs_other.clone());
                let mut second = lhs_other;
                second.extend(facts(ck, &narrowed, rhs, truth)?);
                Ok(merge_branch_facts(env, &first, &second))
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => {
            let Some(cmp) = op.comparison() else {
                return Ok(Facts::default());
            };
            let cmp = if truth { cmp } else { cmp.invert() };
            let mut out = Facts::default();
            if let (Some(lf), Some(rf)) = (lhs.formula(), rhs.formula()) {
                for rel in relate(&lf, cmp, &rf) {
                    let Some(id) = rel.direct_binding() else {
                        continue;
                    };
                    let Some(lit) = rel.value.literal() else {
                        continue;
                    };
                    let current = out
                        .get(&id)
                        .cloned()
                        .or_else(|| env.ty_of(id).cloned());
                    if let Some(current) = current {
                        out.insert(id, narrow(&current, rel.cmp, &lit));
                    }
                }
            }
            Ok(out)
        }
        Expr::Is {
            subject,
            pattern,
            span,
        } => {
            let subject_ty = subject.ty(ck, env)?;
            let narrowed = pattern.narrow_ty(&subject_ty, truth, *span)?;
            let mut out = Facts::default();
            if let Some(id) = subject.formula().and_then(|f| f.as_direct_reference()) {
                out.insert(id, narrowed.clone());
            }
            if truth {
                let mut binders = Vec::new();
                pattern.binder_facts(&narrowed, *span, &mut binders)?;
                for (id, _, ty) in binders {
                    out.insert(id, ty);
                }
            }
            Ok(out)
        }
        Expr::Reference { id, .. } => {
            // A bare boolean reference pins itself.
            let mut out = Facts::default();
            match env.ty_of(*id) {
                Some(Ty::Bool(_)) | Some(Ty::Any) => {
                    out.insert(*id, Ty::Bool(Some(truth)));
                }
                _ => {}
            }
            Ok(out)
        }
        _ => Ok(Facts::default()),
    }
}

/// Merge the fact layers of two branches that rejoin: each binding gets
/// the union of what the branches know. A binding one branch never bound
/// falls back to its environment type, or to `none` for a binder the
/// other branch introduced.
pub fn merge_branch_facts(env: &TypeEnv, a: &Facts, b: &Facts) -> Facts {
    let mut out = Facts::default();
    for id in a.keys().chain(b.keys()) {
        if out.contains_key(id) {
            continue;
        }
        let left = a
            .get(id)
            .or_else(|| env.ty_of(*id))
            .cloned()
            .unwrap_or(Ty::None);
        let right = b
            .get(id)
            .or_else(|| env.ty_of(*id))
            .cloned()
            .unwrap_or(Ty::None);
        out.insert(*id, left.union_with(&right));
    }
    out
}

pub fn check_if(
    ck: &mut Checker,
    env: &TypeEnv,
    condition: &Expr,
    then: &Expr,
    else_: Option<&Expr>,
    _span: Span,
) -> Result<Ty, TypeError> {
    let cond_ty = condition.ty(ck, env)?;
    expect_bool(&cond_ty, condition.span())?;

    let true_layer = facts(ck, env, condition, true)?;
    let then_env = env.with_facts(true_layer);
    let mut binder_env = then_env;
    bind_condition_binders(ck, env, condition, &mut binder_env)?;
    let then_ty = then.ty(ck, &binder_env)?;

    let else_ty = match else_ {
        Some(e) => {
            let false_layer = facts(ck, env, condition, false)?;
            e.ty(ck, &env.with_facts(false_layer))?
        }
        // A missing else contributes `none`.
        None => Ty::None,
    };

    Ok(match cond_ty {
        Ty::Bool(Some(true)) => then_ty,
        Ty::Bool(Some(false)) => else_ty,
        _ => then_ty.union_with(&else_ty),
    })
}

pub fn check_guard(
    ck: &mut Checker,
    env: &TypeEnv,
    condition: &Expr,
    else_: &Expr,
    then: &Expr,
    _span: Span,
) -> Result<Ty, TypeError> {
    let cond_ty = condition.ty(ck, env)?;
    expect_bool(&cond_ty, condition.span())?;

    let false_layer = facts(ck, env, condition, false)?;
    let else_ty = else_.ty(ck, &env.with_facts(false_layer))?;

    let true_layer = facts(ck, env, condition, true)?;
    let then_env = env.with_facts(true_layer);
    let mut binder_env = then_env;
    bind_condition_binders(ck, env, condition, &mut binder_env)?;
    let then_ty = then.ty(ck, &binder_env)?;

    // An else that diverges leaves only the guarded continuation; one
    // that produces a value widens the result.
    Ok(if else_ty.is_never() {
        then_ty
    } else {
        then_ty.union_with(&else_ty)
    })
}

pub fn check_switch(
    ck: &mut Checker,
    env: &TypeEnv,
    subject: &Expr,
    cases: &[SwitchCase],
    else_: Option<&Expr>,
    span: Span,
) -> Result<Ty, TypeError> {
    let subject_ty = subject.ty(ck, env)?;
    let tracked = subject.formula().and_then(|f| f.as_direct_reference());

    let mut remaining = subject_ty.clone();
    let mut arm_tys: Vec<Ty> = Vec::new();

    for (index, case) in cases.iter().enumerate() {
        if remaining.is_never() {
            ck.errors.push(TypeError::UnreachableCase {
                index,
                span: case.span,
            });
        }

        // Alternatives are tried in order, each assuming the ones before
        // it failed.
        let mut alt_remaining = remaining.clone();
        let mut matched = Ty::Never;
        let mut binder_sets: Vec<Vec<(BindingId, String, Ty)>> = Vec::new();
        for alt in &case.alternatives {
            let hit = alt.narrow_ty(&alt_remaining, true, case.span)?;
            let mut binders = Vec::new();
            alt.binder_facts(&hit, case.span, &mut binders)?;
            binder_sets.push(binders);
            matched = matched.union_with(&hit);
            alt_remaining = alt.narrow_ty(&alt_remaining, false, case.span)?;
        }

        let mut layer = Facts::default();
        if let Some(id) = tracked {
            layer.insert(id, matched);
        }
        let mut scope = env.with_facts(layer);
        for (id, name, ty) in merge_alternative_binders(&binder_sets) {
            scope.bind(id, name, ty);
        }
        arm_tys.push(case.body.ty(ck, &scope)?);

        remaining = alt_remaining;
    }

    match else_ {
        Some(e) => {
            let mut layer = Facts::default();
            if let Some(id) = tracked {
                layer.insert(id, remaining);
            }
            arm_tys.push(e.ty(ck, &env.with_facts(layer))?);
        }
        None => {
            if !remaining.is_never() {
                ck.errors.push(TypeError::NonExhaustiveSwitch {
                    subject: subject_ty,
                    remaining,
                    span,
                });
            }
        }
    }

    Ok(Ty::union_of(arm_tys))
}

/// Bind the binders a condition introduces into the true branch. `and`
/// contributes both sides; anything else only through `is`.
fn bind_condition_binders(
    ck: &mut Checker,
    env: &TypeEnv,
    condition: &Expr,
    scope: &mut TypeEnv,
) -> Result<(), TypeError> {
    match condition {
        Expr::Is {
            subject,
            pattern,
            span,
        } => {
            let subject_ty = subject.ty(ck, env)?;
            let narrowed = pattern.narrow_ty(&subject_ty, true, *span)?;
            let mut binders = Vec::new();
            pattern.binder_facts(&narrowed, *span, &mut binders)?;
            for (id, name, ty) in binders {
                scope.bind(id, name, ty);
            }
            Ok(())
        }
        Expr::Binary {
            op: BinOp::And,
            lhs,
            rhs,
            ..
        } => {
            bind_condition_binders(ck, env, lhs, scope)?;
            bind_condition_binders(ck, env, rhs, scope)
        }
        _ => Ok(()),
    }
}

/// Union the binder types across a case's alternatives. A binder missing
/// from some alternative may go unbound at runtime, so `none` joins its
/// type.
fn merge_alternative_binders(
    sets: &[Vec<(BindingId, String, Ty)>],
) -> Vec<(BindingId, String, Ty)> {
    let mut merged: Vec<(BindingId, String, Ty)> = Vec::new();
    for set in sets {
        for (id, name, ty) in set {
            match merged.iter_mut().find(|(i, _, _)| i == id) {
                Some(entry) => entry.2 = entry.2.union_with(ty),
                None => merged.push((*id, name.clone(), ty.clone())),
            }
        }
    }
    if sets.len() > 1 {
        for entry in &mut merged {
            let everywhere = sets
                .iter()
                .all(|set| set.iter().any(|(i, _, _)| *i == entry.0));
            if !everywhere {
                entry.2 = entry.2.union_with(&Ty::None);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Decl;
    use crate::formula::Lit;

    fn sp() -> Span {
        Span::empty()
    }

    fn x() -> Expr {
        Expr::reference(BindingId(1), "x", sp())
    }

    fn cmp(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span: sp(),
        }
    }

    fn int_lit(n: i64) -> Expr {
        Expr::literal(Lit::Int(n), sp())
    }

    fn env_with_x(ty: Ty) -> TypeEnv<'static> {
        let mut env = TypeEnv::new();
        env.bind(BindingId(1), "x", ty);
        env
    }

    fn true_facts(env: &TypeEnv, condition: &Expr) -> Facts {
        facts(&mut Checker::new(), env, condition, true).unwrap()
    }

    #[test]
    fn conjunction_stacks_bounds() {
        let env = env_with_x(Ty::int());
        let cond = cmp(
            BinOp::And,
            cmp(BinOp::Gt, x(), int_lit(0)),
            cmp(BinOp::Lt, x(), int_lit(10)),
        );
        let layer = true_facts(&env, &cond);
        assert_eq!(layer[&BindingId(1)], Ty::int_range(Some(1), Some(9)));
    }

    #[test]
    fn disjunction_merges_to_the_hull() {
        let env = env_with_x(Ty::int());
        let cond = cmp(
            BinOp::Or,
            cmp(BinOp::Eq, x(), int_lit(1)),
            cmp(BinOp::Eq, x(), int_lit(5)),
        );
        let layer = true_facts(&env, &cond);
        assert_eq!(layer[&BindingId(1)], Ty::int_range(Some(1), Some(5)));
    }

    #[test]
    fn negation_flips_the_branch() {
        let env = env_with_x(Ty::int_range(Some(0), Some(10)));
        let cond = Expr::Unary {
            op: UnOp::Not,
            operand: Box::new(cmp(BinOp::Lt, x(), int_lit(5))),
            span: sp(),
        };
        let layer = true_facts(&env, &cond);
        assert_eq!(layer[&BindingId(1)], Ty::int_range(Some(5), Some(10)));
    }

    #[test]
    fn mirrored_comparison_still_narrows_the_reference() {
        let env = env_with_x(Ty::int());
        // 3 < x narrows x the same as x > 3.
        let layer = true_facts(&env, &cmp(BinOp::Lt, int_lit(3), x()));
        assert_eq!(layer[&BindingId(1)], Ty::int_range(Some(4), None));
    }

    #[test]
    fn folded_arithmetic_still_counts_as_a_literal() {
        let env = env_with_x(Ty::int());
        // x == 1 + 2 pins x to 3.
        let rhs = cmp(BinOp::Add, int_lit(1), int_lit(2));
        let layer = true_facts(&env, &cmp(BinOp::Eq, x(), rhs));
        assert_eq!(layer[&BindingId(1)], Ty::int_exact(3));
    }

    #[test]
    fn bare_boolean_reference_pins_itself() {
        let env = env_with_x(Ty::bool());
        let layer = true_facts(&env, &x());
        assert_eq!(layer[&BindingId(1)], Ty::Bool(Some(true)));
        let layer = facts(&mut Checker::new(), &env, &x(), false).unwrap();
        assert_eq!(layer[&BindingId(1)], Ty::Bool(Some(false)));
    }

    #[test]
    fn if_narrows_then_and_else() {
        // if x > 0 then x else 0 - x, with x: Int(-5...5).
        let env = env_with_x(Ty::int_range(Some(-5), Some(5)));
        let expr = Expr::If {
            condition: Box::new(cmp(BinOp::Gt, x(), int_lit(0))),
            then: Box::new(x()),
            else_: Some(Box::new(cmp(BinOp::Sub, int_lit(0), x()))),
            span: sp(),
        };
        let mut ck = Checker::new();
        let ty = expr.ty(&mut ck, &env).unwrap();
        // then: Int(1...5); else: 0 - Int(-5...0) = Int(0...5).
        assert_eq!(ty, Ty::int_range(Some(0), Some(5)));
        assert!(ck.errors.is_empty());
    }

    #[test]
    fn if_condition_binders_scope_into_then() {
        // if xs is [first, ...] then first else 0
        let mut env = TypeEnv::new();
        env.bind(BindingId(1), "xs", Ty::list(Ty::int_range(Some(0), None)));
        let expr = Expr::If {
            condition: Box::new(Expr::Is {
                subject: Box::new(Expr::reference(BindingId(1), "xs", sp())),
                pattern: Pattern::ListOf {
                    items: vec![Pattern::binder(BindingId(2), "first"), Pattern::rest()],
                },
                span: sp(),
            }),
            then: Box::new(Expr::reference(BindingId(2), "first", sp())),
            else_: Some(Box::new(int_lit(0))),
            span: sp(),
        };
        let mut ck = Checker::new();
        let ty = expr.ty(&mut ck, &env).unwrap();
        assert_eq!(ty, Ty::int_range(Some(0), None));
    }

    #[test]
    fn guard_with_diverging_else_keeps_only_the_continuation() {
        // guard not (x is none) else diverge ... x
        let mut env = env_with_x(Ty::union_of([Ty::int_range(Some(0), Some(9)), Ty::None]));
        env.bind(BindingId(3), "diverge", Ty::Never);
        let expr = Expr::Guard {
            condition: Box::new(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(Expr::Is {
                    subject: Box::new(x()),
                    pattern: Pattern::Literal(Lit::None),
                    span: sp(),
                }),
                span: sp(),
            }),
            else_: Box::new(Expr::reference(BindingId(3), "diverge", sp())),
            then: Box::new(x()),
            span: sp(),
        };
        let mut ck = Checker::new();
        let ty = expr.ty(&mut ck, &env).unwrap();
        assert!(ck.errors.is_empty());
        assert_eq!(ty, Ty::int_range(Some(0), Some(9)));
    }

    #[test]
    fn switch_over_pinned_range_is_exhaustive() {
        let env = env_with_x(Ty::int_range(Some(0), Some(1)));
        let expr = Expr::Switch {
            subject: Box::new(x()),
            cases: vec![
                SwitchCase {
                    alternatives: vec![Pattern::Literal(Lit::Int(0))],
                    body: int_lit(10),
                    span: sp(),
                },
                SwitchCase {
                    alternatives: vec![Pattern::Literal(Lit::Int(1))],
                    body: int_lit(20),
                    span: sp(),
                },
            ],
            else_: None,
            span: sp(),
        };
        let mut ck = Checker::new();
        let ty = expr.ty(&mut ck, &env).unwrap();
        assert!(ck.errors.is_empty(), "unexpected errors: {:?}", ck.errors);
        assert_eq!(ty, Ty::int_range(Some(10), Some(20)));
    }

    #[test]
    fn switch_missing_a_value_reports_the_remainder() {
        let env = env_with_x(Ty::int_range(Some(0), Some(2)));
        let expr = Expr::Switch {
            subject: Box::new(x()),
            cases: vec![
                SwitchCase {
                    alternatives: vec![Pattern::Literal(Lit::Int(0))],
                    body: int_lit(10),
                    span: sp(),
                },
                SwitchCase {
                    alternatives: vec![Pattern::Literal(Lit::Int(1))],
                    body: int_lit(20),
                    span: sp(),
                },
            ],
            else_: None,
            span: sp(),
        };
        let mut ck = Checker::new();
        expr.ty(&mut ck, &env).unwrap();
        match ck.errors.as_slice() {
            [TypeError::NonExhaustiveSwitch { remaining, .. }] => {
                assert_eq!(*remaining, Ty::int_exact(2));
            }
            other => panic!("expected a non-exhaustive error, got {other:?}"),
        }
    }

    #[test]
    fn case_after_exhaustion_is_an_error() {
        let env = env_with_x(Ty::Bool(None));
        let expr = Expr::Switch {
            subject: Box::new(x()),
            cases: vec![
                SwitchCase {
                    alternatives: vec![
                        Pattern::Literal(Lit::Bool(true)),
                        Pattern::Literal(Lit::Bool(false)),
                    ],
                    body: int_lit(1),
                    span: sp(),
                },
                SwitchCase {
                    alternatives: vec![Pattern::Wildcard],
                    body: int_lit(2),
                    span: sp(),
                },
            ],
            else_: None,
            span: sp(),
        };
        let mut ck = Checker::new();
        expr.ty(&mut ck, &env).unwrap();
        assert!(matches!(
            ck.errors.as_slice(),
            [TypeError::UnreachableCase { index: 1, .. }]
        ));
    }

    #[test]
    fn switch_narrows_the_subject_inside_each_arm() {
        let mut env = TypeEnv::new();
        env.bind(
            BindingId(1),
            "x",
            Ty::union_of([Ty::int_range(Some(0), Some(9)), Ty::None]),
        );
        // switch x { none -> 0, _ -> x }: in the second arm x is Int.
        let expr = Expr::Switch {
            subject: Box::new(x()),
            cases: vec![
                SwitchCase {
                    alternatives: vec![Pattern::Literal(Lit::None)],
                    body: int_lit(0),
                    span: sp(),
                },
                SwitchCase {
                    alternatives: vec![Pattern::Wildcard],
                    body: x(),
                    span: sp(),
                },
            ],
            else_: None,
            span: sp(),
        };
        let mut ck = Checker::new();
        let ty = expr.ty(&mut ck, &env).unwrap();
        assert!(ck.errors.is_empty());
        assert_eq!(ty, Ty::int_range(Some(0), Some(9)));
    }

    #[test]
    fn declarations_checked_in_dependency_order_see_narrowed_types() {
        // { a = b + 1; b = 2 } -> a
        let env = TypeEnv::new();
        let expr = Expr::Block {
            decls: vec![
                Decl {
                    id: BindingId(1),
                    name: "a".into(),
                    expr: cmp(BinOp::Add, Expr::reference(BindingId(2), "b", sp()), int_lit(1)),
                    span: sp(),
                },
                Decl {
                    id: BindingId(2),
                    name: "b".into(),
                    expr: int_lit(2),
                    span: sp(),
                },
            ],
            result: Box::new(Expr::reference(BindingId(1), "a", sp())),
            span: sp(),
        };
        let mut ck = Checker::new();
        assert_eq!(expr.ty(&mut ck, &env).unwrap(), Ty::int_exact(3));
    }
}
