//! The expression tree checked and evaluated by the engine.
//!
//! [`Expr`] is a closed tree the host front end builds after its own
//! parsing and name resolution; references arrive already keyed by
//! [`BindingId`]. Each node answers three questions:
//!
//! - [`Expr::ty`]: what type does this expression have under a type
//!   environment, accumulating flow facts through conditions;
//! - [`Expr::eval`]: what value does it produce under a value environment;
//! - [`Expr::formula`]: which symbolic formula does it denote, when the
//!   narrowing engine needs to reason about it.

use rustc_hash::FxHashSet;

use rill_common::{order_declarations, BindingId, DeclInput, OrderError, Span};

use crate::env::{Env, TypeEnv};
use crate::error::TypeError;
use crate::flow::{self, Checker};
use crate::formula::{AccessKey, Comparison, Formula, Lit};
use crate::intern::EvalCtx;
use crate::pattern::Pattern;
use crate::ty::{Bound, FloatRange, IntRange, StrFacts, Ty};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Concat,
}

impl BinOp {
    pub fn comparison(self) -> Option<Comparison> {
        match self {
            BinOp::Eq => Some(Comparison::Eq),
            BinOp::Ne => Some(Comparison::Ne),
            BinOp::Lt => Some(Comparison::Lt),
            BinOp::Le => Some(Comparison::Le),
            BinOp::Gt => Some(Comparison::Gt),
            BinOp::Ge => Some(Comparison::Ge),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Concat => "++",
        }
    }
}

/// One `let`-style declaration inside a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub id: BindingId,
    pub name: String,
    pub expr: Expr,
    pub span: Span,
}

/// One arm of a switch: alternative patterns sharing a body.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub alternatives: Vec<Pattern>,
    pub body: Expr,
    pub span: Span,
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        lit: Lit,
        span: Span,
    },
    /// A resolved reference to a binding.
    Reference {
        id: BindingId,
        name: String,
        span: Span,
    },
    /// A reference to a host-provided state property.
    StateRef {
        name: String,
        span: Span,
    },
    /// The receiver the host installed, if any.
    This {
        span: Span,
    },
    Access {
        base: Box<Expr>,
        key: AccessKey,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    ListLit {
        items: Vec<Expr>,
        span: Span,
    },
    /// `subject is pattern`, a boolean test whose binders scope into the
    /// branch taken when it holds.
    Is {
        subject: Box<Expr>,
        pattern: Pattern,
        span: Span,
    },
    If {
        condition: Box<Expr>,
        then: Box<Expr>,
        else_: Option<Box<Expr>>,
        span: Span,
    },
    /// `guard condition else fallback; rest`: the fallback must diverge or
    /// supply the result, and `then` runs with the condition known true.
    Guard {
        condition: Box<Expr>,
        else_: Box<Expr>,
        then: Box<Expr>,
        span: Span,
    },
    Switch {
        subject: Box<Expr>,
        cases: Vec<SwitchCase>,
        else_: Option<Box<Expr>>,
        span: Span,
    },
    /// A block of order-independent declarations and a result expression.
    Block {
        decls: Vec<Decl>,
        result: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn literal(lit: Lit, span: Span) -> Expr {
        Expr::Literal { lit, span }
    }

    pub fn reference(id: BindingId, name: impl Into<String>, span: Span) -> Expr {
        Expr::Reference {
            id,
            name: name.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Reference { span, .. }
            | Expr::StateRef { span, .. }
            | Expr::This { span }
            | Expr::Access { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::ListLit { span, .. }
            | Expr::Is { span, .. }
            | Expr::If { span, .. }
            | Expr::Guard { span, .. }
            | Expr::Switch { span, .. }
            | Expr::Block { span, .. } => *span,
        }
    }

    /// The symbolic formula this expression denotes, when one exists.
    /// Control flow, state access, and non-invertible operators have no
    /// formula and cannot be narrowing subjects.
    pub fn formula(&self) -> Option<Formula> {
        match self {
            Expr::Literal { lit, .. } => Some(Formula::lit(lit.clone())),
            Expr::Reference { id, name, .. } => Some(Formula::reference(*id, name.clone())),
            Expr::Access { base, key, .. } => Some(Formula::Access {
                base: Box::new(base.formula()?),
                key: key.clone(),
            }),
            Expr::Unary {
                op: UnOp::Neg,
                operand,
                ..
            } => Some(Formula::Neg(Box::new(operand.formula()?))),
            Expr::Binary { op, lhs, rhs, .. } => {
                let l = Box::new(lhs.formula()?);
                let r = Box::new(rhs.formula()?);
                match op {
                    BinOp::Add => Some(Formula::Add(l, r)),
                    BinOp::Concat => {
                        // Without types the split is syntactic: a list
                        // literal on either side means a list concat.
                        let listy = matches!(**lhs, Expr::ListLit { .. })
                            || matches!(**rhs, Expr::ListLit { .. });
                        Some(if listy {
                            Formula::ConcatList(l, r)
                        } else {
                            Formula::ConcatStr(l, r)
                        })
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// The names this expression references from its surrounding scope.
    /// Names bound inside (block declarations, pattern binders) do not
    /// escape.
    pub fn free_names(&self) -> FxHashSet<String> {
        let mut out = FxHashSet::default();
        self.collect_free(&mut Vec::new(), &mut out);
        out
    }

    fn collect_free(&self, bound: &mut Vec<String>, out: &mut FxHashSet<String>) {
        match self {
            Expr::Literal { .. } | Expr::StateRef { .. } | Expr::This { .. } => {}
            Expr::Reference { name, .. } => {
                if !bound.iter().any(|b| b == name) {
                    out.insert(name.clone());
                }
            }
            Expr::Access { base, .. } => base.collect_free(bound, out),
            Expr::Unary { operand, .. } => operand.collect_free(bound, out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_free(bound, out);
                rhs.collect_free(bound, out);
            }
            Expr::ListLit { items, .. } => {
                for item in items {
                    item.collect_free(bound, out);
                }
            }
            Expr::Is { subject, .. } => subject.collect_free(bound, out),
            Expr::If {
                condition,
                then,
                else_,
                ..
            } => {
                condition.collect_free(bound, out);
                let depth = bound.len();
                push_condition_binders(condition, bound);
                then.collect_free(bound, out);
                bound.truncate(depth);
                if let Some(e) = else_ {
                    e.collect_free(bound, out);
                }
            }
            Expr::Guard {
                condition,
                else_,
                then,
                ..
            } => {
                condition.collect_free(bound, out);
                else_.collect_free(bound, out);
                let depth = bound.len();
                push_condition_binders(condition, bound);
                then.collect_free(bound, out);
                bound.truncate(depth);
            }
            Expr::Switch {
                subject,
                cases,
                else_,
                ..
            } => {
                subject.collect_free(bound, out);
                for case in cases {
                    let depth = bound.len();
                    let mut binders = Vec::new();
                    for alt in &case.alternatives {
                        alt.binders(&mut binders);
                    }
                    bound.extend(binders.into_iter().map(|(_, name)| name));
                    case.body.collect_free(bound, out);
                    bound.truncate(depth);
                }
                if let Some(e) = else_ {
                    e.collect_free(bound, out);
                }
            }
            Expr::Block { decls, result, .. } => {
                let depth = bound.len();
                bound.extend(decls.iter().map(|d| d.name.clone()));
                for decl in decls {
                    decl.expr.collect_free(bound, out);
                }
                result.collect_free(bound, out);
                bound.truncate(depth);
            }
        }
    }

    // ── Type checking ───────────────────────────────────────────────────

    /// The type of this expression under `env`, reporting through `ck`.
    pub fn ty(&self, ck: &mut Checker, env: &TypeEnv) -> Result<Ty, TypeError> {
        match self {
            Expr::Literal { lit, .. } => Ok(lit.ty()),
            Expr::Reference { id, name, span } => {
                env.ty_of(*id).cloned().ok_or_else(|| TypeError::UnboundName {
                    name: name.clone(),
                    span: *span,
                    did_you_mean: env.state_ty(name).map(|_| name.clone()),
                })
            }
            Expr::StateRef { name, span } => {
                env.state_ty(name)
                    .cloned()
                    .ok_or_else(|| TypeError::UnboundState {
                        name: name.clone(),
                        span: *span,
                    })
            }
            Expr::This { span } => {
                env.this_ty().cloned().ok_or_else(|| TypeError::UnboundName {
                    name: "this".into(),
                    span: *span,
                    did_you_mean: None,
                })
            }
            Expr::Access { base, key, span } => {
                let base_ty = base.ty(ck, env)?;
                check_access(&base_ty, key, *span)
            }
            Expr::Unary { op, operand, span } => {
                let inner = operand.ty(ck, env)?;
                check_unary(*op, &inner, *span)
            }
            Expr::Binary { op, lhs, rhs, span } => check_binary(ck, env, *op, lhs, rhs, *span),
            Expr::ListLit { items, .. } => {
                let mut elems = Vec::with_capacity(items.len());
                for item in items {
                    elems.push(item.ty(ck, env)?);
                }
                let elem = if elems.is_empty() {
                    Ty::Any
                } else {
                    Ty::union_of(elems)
                };
                Ok(Ty::from_list(elem, IntRange::exact(items.len() as i64)))
            }
            Expr::Is {
                subject,
                pattern,
                span,
            } => {
                let subject_ty = subject.ty(ck, env)?;
                let holds = pattern.narrow_ty(&subject_ty, true, *span)?;
                let fails = pattern.narrow_ty(&subject_ty, false, *span)?;
                // A test that cannot hold, or cannot fail, has a known
                // outcome.
                Ok(if holds.is_never() {
                    Ty::Bool(Some(false))
                } else if fails.is_never() {
                    Ty::Bool(Some(true))
                } else {
                    Ty::bool()
                })
            }
            Expr::If {
                condition,
                then,
                else_,
                span,
            } => flow::check_if(ck, env, condition, then, else_.as_deref(), *span),
            Expr::Guard {
                condition,
                else_,
                then,
                span,
            } => flow::check_guard(ck, env, condition, else_, then, *span),
            Expr::Switch {
                subject,
                cases,
                else_,
                span,
            } => flow::check_switch(ck, env, subject, cases, else_.as_deref(), *span),
            Expr::Block {
                decls,
                result,
                span,
            } => {
                let order = order_block(decls, &env.visible_names(), *span)?;
                let mut scope = env.child();
                for &i in &order {
                    let decl = &decls[i];
                    let decl_ty = decl.expr.ty(ck, &scope)?;
                    scope.bind(decl.id, decl.name.clone(), decl_ty);
                }
                result.ty(ck, &scope)
            }
        }
    }

    // ── Evaluation ──────────────────────────────────────────────────────

    /// Evaluate this expression to a value under `env`.
    pub fn eval(&self, env: &Env, ctx: &mut EvalCtx) -> Result<Value, TypeError> {
        match self {
            Expr::Literal { lit, .. } => Ok(lit_value(lit, ctx)),
            Expr::Reference { id, name, span } => {
                env.value_of(*id)
                    .cloned()
                    .ok_or_else(|| TypeError::UnboundName {
                        name: name.clone(),
                        span: *span,
                        did_you_mean: env.state_value(name).map(|_| name.clone()),
                    })
            }
            Expr::StateRef { name, span } => {
                env.state_value(name)
                    .cloned()
                    .ok_or_else(|| TypeError::UnboundState {
                        name: name.clone(),
                        span: *span,
                    })
            }
            Expr::This { span } => {
                env.this_value()
                    .cloned()
                    .ok_or_else(|| TypeError::UnboundName {
                        name: "this".into(),
                        span: *span,
                        did_you_mean: None,
                    })
            }
            Expr::Access { base, key, span } => {
                let value = base.eval(env, ctx)?;
                eval_access(&value, key, *span)
            }
            Expr::Unary { op, operand, span } => {
                let value = operand.eval(env, ctx)?;
                eval_unary(*op, &value, *span)
            }
            Expr::Binary { op, lhs, rhs, span } => eval_binary(env, ctx, *op, lhs, rhs, *span),
            Expr::ListLit { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.eval(env, ctx)?);
                }
                Ok(Value::List(values))
            }
            Expr::Is {
                subject, pattern, ..
            } => {
                let value = subject.eval(env, ctx)?;
                Ok(Value::Bool(pattern.test(&value).is_some()))
            }
            Expr::If {
                condition,
                then,
                else_,
                ..
            } => {
                let (holds, bindings) = eval_condition(condition, env, ctx)?;
                if holds {
                    let mut scope = env.child();
                    for (id, value) in bindings {
                        scope.bind(id, value);
                    }
                    then.eval(&scope, ctx)
                } else {
                    match else_ {
                        Some(e) => e.eval(env, ctx),
                        None => Ok(Value::None),
                    }
                }
            }
            Expr::Guard {
                condition,
                else_,
                then,
                ..
            } => {
                let (holds, bindings) = eval_condition(condition, env, ctx)?;
                if holds {
                    let mut scope = env.child();
                    for (id, value) in bindings {
                        scope.bind(id, value);
                    }
                    then.eval(&scope, ctx)
                } else {
                    else_.eval(env, ctx)
                }
            }
            Expr::Switch {
                subject,
                cases,
                else_,
                span,
            } => {
                let value = subject.eval(env, ctx)?;
                for case in cases {
                    // All binders of the arm get a `None` default so an
                    // alternative that omits one still leaves it bound.
                    let mut all = Vec::new();
                    for alt in &case.alternatives {
                        alt.binders(&mut all);
                    }
                    for alt in &case.alternatives {
                        if let Some(bindings) = alt.test(&value) {
                            let mut scope = env.child();
                            for (id, _) in &all {
                                scope.bind(*id, Value::None);
                            }
                            for (id, bound) in bindings {
                                scope.bind(id, bound);
                            }
                            return case.body.eval(&scope, ctx);
                        }
                    }
                }
                match else_ {
                    Some(e) => e.eval(env, ctx),
                    None => Err(TypeError::UnmatchedSwitch {
                        value: value.to_string(),
                        span: *span,
                    }),
                }
            }
            Expr::Block {
                decls,
                result,
                span,
            } => {
                // Non-local references resolve by id at runtime, so only
                // local dependencies can block the ordering here.
                let enclosing = decls
                    .iter()
                    .flat_map(|d| d.expr.free_names())
                    .filter(|n| decls.iter().all(|d| &d.name != n))
                    .collect();
                let order = order_block(decls, &enclosing, *span)?;
                let mut scope = env.child();
                for &i in &order {
                    let decl = &decls[i];
                    let value = decl.expr.eval(&scope, ctx)?;
                    scope.bind(decl.id, value);
                }
                result.eval(&scope, ctx)
            }
        }
    }
}

/// Binder names a condition introduces into its true branch: `is` patterns
/// directly, and through the left-to-right arms of `and`.
fn push_condition_binders(condition: &Expr, bound: &mut Vec<String>) {
    match condition {
        Expr::Is { pattern, .. } => {
            let mut binders = Vec::new();
            pattern.binders(&mut binders);
            bound.extend(binders.into_iter().map(|(_, name)| name));
        }
        Expr::Binary {
            op: BinOp::And,
            lhs,
            rhs,
            ..
        } => {
            push_condition_binders(lhs, bound);
            push_condition_binders(rhs, bound);
        }
        _ => {}
    }
}

/// Order a block's declarations, mapping ordering failures onto the error
/// taxonomy at the block's span.
fn order_block(
    decls: &[Decl],
    enclosing: &FxHashSet<String>,
    span: Span,
) -> Result<Vec<usize>, TypeError> {
    let inputs: Vec<DeclInput> = decls
        .iter()
        .map(|d| DeclInput {
            name: d.name.clone(),
            references: d.expr.free_names().into_iter().collect(),
        })
        .collect();
    order_declarations(&inputs, enclosing).map_err(|e| match e {
        OrderError::Cycle { chain } => TypeError::CircularDeclarations { chain, span },
        OrderError::Unresolvable { names, missing } => TypeError::UnresolvableDeclarations {
            names,
            missing,
            span,
        },
    })
}

// ── Static operator rules ───────────────────────────────────────────────

fn check_access(base: &Ty, key: &AccessKey, span: Span) -> Result<Ty, TypeError> {
    match (base, key) {
        (Ty::Any, _) => Ok(Ty::Any),
        (Ty::List { elem, len }, AccessKey::Index(i)) => {
            // An index the length range can never reach is already wrong.
            if *i < 0 || len.hi.is_some_and(|h| *i >= h) {
                return Err(TypeError::IndexOutOfBounds {
                    index: *i,
                    len: len.hi.unwrap_or(0).max(0) as usize,
                    span,
                });
            }
            Ok((**elem).clone())
        }
        (Ty::Union(ms), _) => {
            let mut parts = Vec::with_capacity(ms.len());
            for m in ms {
                parts.push(check_access(m, key, span)?);
            }
            Ok(Ty::union_of(parts))
        }
        (other, _) => Err(TypeError::NotIndexable {
            ty: other.clone(),
            span,
        }),
    }
}

fn check_unary(op: UnOp, inner: &Ty, span: Span) -> Result<Ty, TypeError> {
    match op {
        UnOp::Neg => match inner {
            Ty::Int(r) => Ok(Ty::from_int_range(neg_int_range(r))),
            Ty::Float(r) => Ok(Ty::from_float_range(neg_float_range(r))),
            Ty::Any => Ok(Ty::Any),
            found => Err(TypeError::Mismatch {
                expected: Ty::union_of([Ty::int(), Ty::float()]),
                found: found.clone(),
                span,
            }),
        },
        UnOp::Not => match inner {
            Ty::Bool(known) => Ok(Ty::Bool(known.map(|b| !b))),
            Ty::Any => Ok(Ty::bool()),
            found => Err(TypeError::Mismatch {
                expected: Ty::bool(),
                found: found.clone(),
                span,
            }),
        },
    }
}

fn neg_int_range(r: &IntRange) -> IntRange {
    // An unnegatable bound (i64::MIN) falls away rather than wrapping.
    IntRange {
        lo: r.hi.and_then(i64::checked_neg),
        hi: r.lo.and_then(i64::checked_neg),
    }
}

fn neg_float_range(r: &FloatRange) -> FloatRange {
    let flip = |b: Bound| Bound {
        value: -b.value,
        inclusive: b.inclusive,
    };
    FloatRange {
        lo: r.hi.map(flip),
        hi: r.lo.map(flip),
    }
}

fn check_binary(
    ck: &mut Checker,
    env: &TypeEnv,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    span: Span,
) -> Result<Ty, TypeError> {
    match op {
        BinOp::And | BinOp::Or => {
            let lhs_ty = lhs.ty(ck, env)?;
            expect_bool(&lhs_ty, lhs.span())?;
            // The right side is checked under what the left side proved
            // (or refuted, for `or`).
            let assumed = flow::facts(ck, env, lhs, op == BinOp::And)?;
            let narrowed = env.with_facts(assumed);
            let rhs_ty = rhs.ty(ck, &narrowed)?;
            expect_bool(&rhs_ty, rhs.span())?;
            Ok(combine_bool(op, &lhs_ty, &rhs_ty))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            let lhs_ty = lhs.ty(ck, env)?;
            let rhs_ty = rhs.ty(ck, env)?;
            if op == BinOp::Div {
                if let Ty::Int(r) = &rhs_ty {
                    if r.as_exact() == Some(0) {
                        return Err(TypeError::DivisionByZero { span });
                    }
                }
            }
            check_arith(op, &lhs_ty, &rhs_ty, span)
        }
        BinOp::Concat => {
            let lhs_ty = lhs.ty(ck, env)?;
            let rhs_ty = rhs.ty(ck, env)?;
            check_concat(&lhs_ty, &rhs_ty, span)
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let lhs_ty = lhs.ty(ck, env)?;
            let rhs_ty = rhs.ty(ck, env)?;
            check_comparison(op, &lhs_ty, &rhs_ty, span)
        }
    }
}

pub(crate) fn expect_bool(ty: &Ty, span: Span) -> Result<(), TypeError> {
    match ty {
        Ty::Bool(_) | Ty::Any | Ty::Never => Ok(()),
        found => Err(TypeError::Mismatch {
            expected: Ty::bool(),
            found: found.clone(),
            span,
        }),
    }
}

fn combine_bool(op: BinOp, lhs: &Ty, rhs: &Ty) -> Ty {
    let (l, r) = match (lhs, rhs) {
        (Ty::Bool(l), Ty::Bool(r)) => (*l, *r),
        _ => return Ty::bool(),
    };
    let known = match op {
        BinOp::And => match (l, r) {
            (Some(false), _) => Some(false),
            (Some(true), r) => r,
            (None, Some(false)) => Some(false),
            (None, _) => None,
        },
        BinOp::Or => match (l, r) {
            (Some(true), _) => Some(true),
            (Some(false), r) => r,
            (None, Some(true)) => Some(true),
            (None, _) => None,
        },
        _ => None,
    };
    Ty::Bool(known)
}

fn check_arith(op: BinOp, lhs: &Ty, rhs: &Ty, span: Span) -> Result<Ty, TypeError> {
    match (lhs, rhs) {
        (Ty::Int(a), Ty::Int(b)) => Ok(match op {
            BinOp::Add => Ty::from_int_range(add_int_ranges(a, b)),
            BinOp::Sub => Ty::from_int_range(add_int_ranges(a, &neg_int_range(b))),
            // Products and quotients of ranges are not tracked.
            _ => Ty::int(),
        }),
        (Ty::Int(_) | Ty::Float(_), Ty::Int(_) | Ty::Float(_)) => Ok(Ty::float()),
        (Ty::Any, Ty::Int(_) | Ty::Float(_) | Ty::Any)
        | (Ty::Int(_) | Ty::Float(_), Ty::Any) => Ok(Ty::Any),
        _ => Err(TypeError::IncompatibleOperands {
            op: op.symbol().into(),
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            span,
        }),
    }
}

fn add_int_ranges(a: &IntRange, b: &IntRange) -> IntRange {
    let add = |x: Option<i64>, y: Option<i64>| x.zip(y).and_then(|(x, y)| x.checked_add(y));
    IntRange {
        lo: add(a.lo, b.lo),
        hi: add(a.hi, b.hi),
    }
}

fn check_concat(lhs: &Ty, rhs: &Ty, span: Span) -> Result<Ty, TypeError> {
    match (lhs, rhs) {
        (Ty::Str(a), Ty::Str(b)) => {
            if let (Some(x), Some(y)) = (&a.lit, &b.lit) {
                return Ok(Ty::str_exact(format!("{x}{y}")));
            }
            Ok(Ty::Str(StrFacts {
                lit: None,
                min_len: a.effective_min().zip(b.effective_min()).map(|(x, y)| x + y),
                max_len: a.effective_max().zip(b.effective_max()).map(|(x, y)| x + y),
                pattern: None,
            }))
        }
        (
            Ty::List { elem: e1, len: l1 },
            Ty::List { elem: e2, len: l2 },
        ) => Ok(Ty::from_list(e1.union_with(e2), add_int_ranges(l1, l2))),
        (Ty::Any, Ty::Str(_) | Ty::List { .. } | Ty::Any)
        | (Ty::Str(_) | Ty::List { .. }, Ty::Any) => Ok(Ty::Any),
        _ => Err(TypeError::IncompatibleOperands {
            op: "++".into(),
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            span,
        }),
    }
}

fn check_comparison(op: BinOp, lhs: &Ty, rhs: &Ty, span: Span) -> Result<Ty, TypeError> {
    let equality = matches!(op, BinOp::Eq | BinOp::Ne);
    let ordered = |t: &Ty| {
        matches!(
            t,
            Ty::Int(_) | Ty::Float(_) | Ty::Str(_) | Ty::Any | Ty::Never
        )
    };
    if !equality && !(ordered(lhs) && ordered(rhs)) {
        return Err(TypeError::IncompatibleOperands {
            op: op.symbol().into(),
            lhs: lhs.clone(),
            rhs: rhs.clone(),
            span,
        });
    }
    // Exactly-known operands decide the comparison statically.
    if let Some(outcome) = decide_comparison(op, lhs, rhs) {
        return Ok(Ty::Bool(Some(outcome)));
    }
    Ok(Ty::bool())
}

fn decide_comparison(op: BinOp, lhs: &Ty, rhs: &Ty) -> Option<bool> {
    let (a, b) = (exact_numeric(lhs)?, exact_numeric(rhs)?);
    Some(match op {
        BinOp::Eq => a == b,
        BinOp::Ne => a != b,
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        BinOp::Ge => a >= b,
        _ => return None,
    })
}

fn exact_numeric(ty: &Ty) -> Option<f64> {
    match ty {
        Ty::Int(r) => r.as_exact().map(|n| n as f64),
        Ty::Float(r) => r.as_exact(),
        _ => None,
    }
}

// ── Runtime operator rules ──────────────────────────────────────────────

fn lit_value(lit: &Lit, ctx: &mut EvalCtx) -> Value {
    match lit {
        Lit::None => Value::None,
        Lit::Bool(b) => Value::Bool(*b),
        Lit::Int(n) => Value::Int(*n),
        Lit::Float(x) => Value::Float(*x),
        Lit::Str(s) => Value::Str(ctx.strings.intern(s)),
    }
}

fn eval_access(value: &Value, key: &AccessKey, span: Span) -> Result<Value, TypeError> {
    match (value, key) {
        (Value::List(items), AccessKey::Index(i)) => {
            let idx = usize::try_from(*i).ok().filter(|&idx| idx < items.len());
            match idx {
                Some(idx) => Ok(items[idx].clone()),
                None => Err(TypeError::IndexOutOfBounds {
                    index: *i,
                    len: items.len(),
                    span,
                }),
            }
        }
        _ => Err(TypeError::NotIndexable {
            ty: value.ty(),
            span,
        }),
    }
}

fn eval_unary(op: UnOp, value: &Value, span: Span) -> Result<Value, TypeError> {
    match (op, value) {
        (UnOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnOp::Neg, other) => Err(TypeError::Mismatch {
            expected: Ty::union_of([Ty::int(), Ty::float()]),
            found: other.ty(),
            span,
        }),
        (UnOp::Not, other) => Err(TypeError::Mismatch {
            expected: Ty::bool(),
            found: other.ty(),
            span,
        }),
    }
}

fn eval_binary(
    env: &Env,
    ctx: &mut EvalCtx,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    span: Span,
) -> Result<Value, TypeError> {
    // `and`/`or` short-circuit; every other operator is strict.
    if matches!(op, BinOp::And | BinOp::Or) {
        let l = truthy(&lhs.eval(env, ctx)?, lhs.span())?;
        return match (op, l) {
            (BinOp::And, false) => Ok(Value::Bool(false)),
            (BinOp::Or, true) => Ok(Value::Bool(true)),
            _ => {
                let r = truthy(&rhs.eval(env, ctx)?, rhs.span())?;
                Ok(Value::Bool(r))
            }
        };
    }
    let l = lhs.eval(env, ctx)?;
    let r = rhs.eval(env, ctx)?;
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => eval_arith(op, &l, &r, span),
        BinOp::Concat => match (&l, &r) {
            (Value::Str(a), Value::Str(b)) => {
                Ok(Value::Str(ctx.strings.intern(&format!("{a}{b}"))))
            }
            (Value::List(a), Value::List(b)) => {
                let mut items = a.clone();
                items.extend(b.iter().cloned());
                Ok(Value::List(items))
            }
            _ => Err(incompatible(op, &l, &r, span)),
        },
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare_values(&l, &r).ok_or_else(|| incompatible(op, &l, &r, span))?;
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Ge => ordering.is_ge(),
                _ => unreachable!(),
            }))
        }
        BinOp::And | BinOp::Or => unreachable!(),
    }
}

fn truthy(value: &Value, span: Span) -> Result<bool, TypeError> {
    value.is_truthy().ok_or_else(|| TypeError::Mismatch {
        expected: Ty::bool(),
        found: value.ty(),
        span,
    })
}

fn eval_arith(op: BinOp, l: &Value, r: &Value, span: Span) -> Result<Value, TypeError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinOp::Add => Ok(Value::Int(a.wrapping_add(*b))),
            BinOp::Sub => Ok(Value::Int(a.wrapping_sub(*b))),
            BinOp::Mul => Ok(Value::Int(a.wrapping_mul(*b))),
            BinOp::Div => {
                if *b == 0 {
                    Err(TypeError::DivisionByZero { span })
                } else {
                    Ok(Value::Int(a.wrapping_div(*b)))
                }
            }
            _ => unreachable!(),
        },
        _ => {
            let (a, b) = l
                .as_f64()
                .zip(r.as_f64())
                .ok_or_else(|| incompatible(op, l, r, span))?;
            Ok(Value::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                _ => unreachable!(),
            }))
        }
    }
}

fn incompatible(op: BinOp, l: &Value, r: &Value, span: Span) -> TypeError {
    TypeError::IncompatibleOperands {
        op: op.symbol().into(),
        lhs: l.ty(),
        rhs: r.ty(),
        span,
    }
}

/// Equality with numeric cross-family coercion: `1 == 1.0` holds.
fn values_equal(l: &Value, r: &Value) -> bool {
    if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
        return a == b;
    }
    match (l, r) {
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (
            Value::Case {
                case: c1, args: a1, ..
            },
            Value::Case {
                case: c2, args: a2, ..
            },
        ) => c1 == c2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| values_equal(x, y)),
        _ => l == r,
    }
}

fn compare_values(l: &Value, r: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) {
        return a.partial_cmp(&b);
    }
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => None,
    }
}

/// Evaluate a condition, collecting the binders it would introduce into
/// the branch where it holds.
fn eval_condition(
    condition: &Expr,
    env: &Env,
    ctx: &mut EvalCtx,
) -> Result<(bool, Vec<(BindingId, Value)>), TypeError> {
    match condition {
        Expr::Is {
            subject, pattern, ..
        } => {
            let value = subject.eval(env, ctx)?;
            Ok(match pattern.test(&value) {
                Some(bindings) => (true, bindings),
                None => (false, Vec::new()),
            })
        }
        Expr::Binary {
            op: BinOp::And,
            lhs,
            rhs,
            ..
        } => {
            let (l, mut bindings) = eval_condition(lhs, env, ctx)?;
            if !l {
                return Ok((false, Vec::new()));
            }
            // The right side may use the left side's binders.
            let mut scope = env.child();
            for (id, value) in &bindings {
                scope.bind(*id, value.clone());
            }
            let (r, rhs_bindings) = eval_condition(rhs, &scope, ctx)?;
            if !r {
                return Ok((false, Vec::new()));
            }
            bindings.extend(rhs_bindings);
            Ok((true, bindings))
        }
        Expr::Binary {
            op: BinOp::Or,
            lhs,
            rhs,
            ..
        } => {
            let (l, bindings) = eval_condition(lhs, env, ctx)?;
            if l {
                return Ok((true, bindings));
            }
            eval_condition(rhs, env, ctx)
        }
        other => {
            let value = other.eval(env, ctx)?;
            Ok((truthy(&value, other.span())?, Vec::new()))
        }
    }
}
