//! The Rill semantic engine: flow-sensitive checking and evaluation for
//! a small statically typed expression language.
//!
//! The host front end parses and name-resolves its source, hands the
//! engine an [`Expr`] tree with [`rill_common::BindingId`]s in place, and
//! gets back either a checked type or diagnostics. Narrowing works
//! directly on expression structure: each condition is asked what it
//! proves when it holds and what its failure proves, and the answers are
//! pushed over the environment as flat fact layers. There is no
//! control-flow graph.
//!
//! The same tree also evaluates: [`eval`] runs an expression against a
//! value environment, with pattern matching and declaration ordering
//! behaving exactly as the checker assumed they would.

pub mod diagnostics;
pub mod env;
pub mod error;
pub mod expr;
pub mod flow;
pub mod formula;
pub mod intern;
pub mod narrow;
pub mod pattern;
pub mod ty;
pub mod value;

pub use env::{Env, Facts, TypeEnv};
pub use error::TypeError;
pub use expr::{BinOp, Decl, Expr, SwitchCase, UnOp};
pub use flow::{facts, merge_branch_facts, Checker};
pub use formula::{relate, AccessKey, Comparison, Formula, Lit, Relationship};
pub use intern::{EvalCtx, StrCache};
pub use narrow::{narrow, narrow_false};
pub use pattern::{Pattern, RangeEnds, RangeOp, Segment};
pub use ty::{Bound, CaseParam, CaseSig, EnumTy, FloatRange, IntRange, StrFacts, Ty};
pub use value::Value;

/// The outcome of checking one expression.
#[derive(Debug)]
pub struct CheckResult {
    /// The checked type, absent when checking aborted on a hard error.
    pub ty: Option<Ty>,
    pub errors: Vec<TypeError>,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.ty.is_some() && self.errors.is_empty()
    }
}

/// Check an expression under a type environment.
///
/// Exhaustiveness and reachability errors accumulate; any other error
/// aborts and lands in `errors` alongside them.
pub fn check(expr: &Expr, env: &TypeEnv) -> CheckResult {
    let mut ck = Checker::new();
    match expr.ty(&mut ck, env) {
        Ok(ty) => CheckResult {
            ty: Some(ty),
            errors: ck.errors,
        },
        Err(e) => {
            let mut errors = ck.errors;
            errors.push(e);
            CheckResult { ty: None, errors }
        }
    }
}

/// Evaluate an expression under a value environment.
pub fn eval(expr: &Expr, env: &Env) -> Result<Value, TypeError> {
    let mut ctx = intern::EvalCtx::new();
    expr.eval(env, &mut ctx)
}
