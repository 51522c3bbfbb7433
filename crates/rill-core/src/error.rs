//! The error taxonomy.
//!
//! Every recoverable failure -- reference errors, type mismatches,
//! exhaustiveness and ordering problems, and runtime faults -- is a value
//! of one enum, propagated with `?` through every combinator. No error is
//! ever thrown as a panic, and no environment is left half-updated by a
//! failure: environments are append-only, so failing simply discards the
//! in-progress child layer.

use std::fmt;

use serde::Serialize;

use rill_common::Span;

use crate::ty::Ty;

/// An error produced while checking or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeError {
    /// A name is not in scope. When a state property of the same name
    /// exists, `did_you_mean` carries it as a hint.
    UnboundName {
        name: String,
        span: Span,
        did_you_mean: Option<String>,
    },
    /// A state property is not defined.
    UnboundState { name: String, span: Span },
    /// An expression has the wrong type, naming the offending
    /// sub-expression through its span.
    Mismatch {
        expected: Ty,
        found: Ty,
        span: Span,
    },
    /// A binary operator received operands it cannot combine.
    IncompatibleOperands {
        op: String,
        lhs: Ty,
        rhs: Ty,
        span: Span,
    },
    /// An index access on something that is not a list.
    NotIndexable { ty: Ty, span: Span },
    /// An enum-case pattern matches more than one case of the subject
    /// type; the engine refuses to guess.
    AmbiguousCase {
        case: String,
        candidates: Vec<String>,
        span: Span,
    },
    /// A switch ends with part of the subject type unhandled.
    NonExhaustiveSwitch {
        subject: Ty,
        remaining: Ty,
        span: Span,
    },
    /// A switch case begins after the subject type is already exhausted.
    UnreachableCase { index: usize, span: Span },
    /// A declaration block references itself in a loop.
    CircularDeclarations { chain: Vec<String>, span: Span },
    /// A declaration block references names no scope provides.
    UnresolvableDeclarations {
        names: Vec<String>,
        missing: Vec<String>,
        span: Span,
    },
    /// Integer division by zero at evaluation time.
    DivisionByZero { span: Span },
    /// A list index outside the list's bounds at evaluation time.
    IndexOutOfBounds {
        index: i64,
        len: usize,
        span: Span,
    },
    /// A switch value matched no case at evaluation time. Checked code
    /// never reaches this; it guards direct evaluation of unchecked trees.
    UnmatchedSwitch { value: String, span: Span },
}

impl TypeError {
    /// The source span this error points at.
    pub fn span(&self) -> Span {
        match self {
            TypeError::UnboundName { span, .. }
            | TypeError::UnboundState { span, .. }
            | TypeError::Mismatch { span, .. }
            | TypeError::IncompatibleOperands { span, .. }
            | TypeError::NotIndexable { span, .. }
            | TypeError::AmbiguousCase { span, .. }
            | TypeError::NonExhaustiveSwitch { span, .. }
            | TypeError::UnreachableCase { span, .. }
            | TypeError::CircularDeclarations { span, .. }
            | TypeError::UnresolvableDeclarations { span, .. }
            | TypeError::DivisionByZero { span }
            | TypeError::IndexOutOfBounds { span, .. }
            | TypeError::UnmatchedSwitch { span, .. } => *span,
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::UnboundName {
                name, did_you_mean, ..
            } => {
                write!(f, "name `{name}` is not in scope")?;
                if let Some(hint) = did_you_mean {
                    write!(f, " (did you mean the state property `{hint}`?)")?;
                }
                Ok(())
            }
            TypeError::UnboundState { name, .. } => {
                write!(f, "no state property named `{name}`")
            }
            TypeError::Mismatch {
                expected, found, ..
            } => write!(f, "expected {expected}, found {found}"),
            TypeError::IncompatibleOperands { op, lhs, rhs, .. } => {
                write!(f, "`{op}` cannot combine {lhs} and {rhs}")
            }
            TypeError::NotIndexable { ty, .. } => {
                write!(f, "{ty} cannot be indexed")
            }
            TypeError::AmbiguousCase {
                case, candidates, ..
            } => write!(
                f,
                "case pattern `{case}` is ambiguous: matches {}",
                candidates.join(", ")
            ),
            TypeError::NonExhaustiveSwitch { remaining, .. } => {
                write!(f, "switch does not cover {remaining}")
            }
            TypeError::UnreachableCase { index, .. } => {
                write!(f, "case {index} is unreachable: the subject is already exhausted")
            }
            TypeError::CircularDeclarations { chain, .. } => {
                write!(f, "circular declarations: {}", chain.join(" -> "))
            }
            TypeError::UnresolvableDeclarations { names, missing, .. } => write!(
                f,
                "declarations {} reference unknown names {}",
                names.join(", "),
                missing.join(", ")
            ),
            TypeError::DivisionByZero { .. } => write!(f, "division by zero"),
            TypeError::IndexOutOfBounds { index, len, .. } => {
                write!(f, "index {index} is out of bounds for a list of length {len}")
            }
            TypeError::UnmatchedSwitch { value, .. } => {
                write!(f, "switch value {value} matched no case")
            }
        }
    }
}

impl std::error::Error for TypeError {}
