//! The comparison-relationship model.
//!
//! A [`Formula`] is a symbolic description of one side of a comparison: a
//! literal, a reference to a binding, a derived access off another
//! formula, or a compound operation. Formulas are independent of the
//! expression tree; conditional expressions translate themselves into
//! formulas so the narrowing algebra can work on a uniform shape.
//!
//! A [`Relationship`] isolates one side as the subject. Only sides that
//! resolve -- through a chain of index/property accesses -- to a reference
//! can be subjects. Comparing two literals, or two references to each
//! other, yields no relationship at all: there is no unambiguous subject
//! to narrow.

use std::fmt;

use rill_common::BindingId;

use crate::ty::{Bound, FloatRange, IntRange, StrFacts, Ty};

/// A literal operand in a formula or pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Lit {
    /// The singleton type of this literal.
    pub fn ty(&self) -> Ty {
        match self {
            Lit::None => Ty::None,
            Lit::Bool(b) => Ty::Bool(Some(*b)),
            Lit::Int(n) => Ty::Int(IntRange::exact(*n)),
            Lit::Float(x) => Ty::Float(FloatRange::exact(*x)),
            Lit::Str(s) => Ty::Str(StrFacts::exact(s.clone())),
        }
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::None => write!(f, "none"),
            Lit::Bool(b) => write!(f, "{b}"),
            Lit::Int(n) => write!(f, "{n}"),
            Lit::Float(x) => write!(f, "{x}"),
            Lit::Str(s) => write!(f, "'{s}'"),
        }
    }
}

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    /// The operator as seen from the other side of the comparison:
    /// `a < b` is `b > a`. Equality is symmetric.
    pub fn mirror(self) -> Comparison {
        match self {
            Comparison::Eq => Comparison::Eq,
            Comparison::Ne => Comparison::Ne,
            Comparison::Lt => Comparison::Gt,
            Comparison::Le => Comparison::Ge,
            Comparison::Gt => Comparison::Lt,
            Comparison::Ge => Comparison::Le,
        }
    }

    /// The operator that holds exactly when `self` does not:
    /// the false branch of `a < b` knows `a >= b`.
    pub fn invert(self) -> Comparison {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Lt => Comparison::Ge,
            Comparison::Le => Comparison::Gt,
            Comparison::Gt => Comparison::Le,
            Comparison::Ge => Comparison::Lt,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

/// A step in a derived access chain.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessKey {
    Index(i64),
    Property(String),
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKey::Index(i) => write!(f, "[{i}]"),
            AccessKey::Property(p) => write!(f, ".{p}"),
        }
    }
}

/// A symbolic value in a relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Literal(Lit),
    /// A reference to a binding. Compared by id, never by name, so a
    /// shadowing binding can never collide with the binding it shadows.
    Reference { id: BindingId, name: String },
    /// An index or property access off another formula.
    Access {
        base: Box<Formula>,
        key: AccessKey,
    },
    Add(Box<Formula>, Box<Formula>),
    Neg(Box<Formula>),
    ConcatStr(Box<Formula>, Box<Formula>),
    ConcatList(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn reference(id: BindingId, name: impl Into<String>) -> Formula {
        Formula::Reference {
            id,
            name: name.into(),
        }
    }

    pub fn lit(lit: Lit) -> Formula {
        Formula::Literal(lit)
    }

    /// The binding this formula resolves to, chasing derived accesses.
    /// Compound operations never resolve: the engine cannot soundly invert
    /// them, so it stays conservative and refuses to pick a subject.
    pub fn subject(&self) -> Option<BindingId> {
        match self {
            Formula::Reference { id, .. } => Some(*id),
            Formula::Access { base, .. } => base.subject(),
            _ => None,
        }
    }

    /// Whether this formula is a bare reference (no access steps).
    pub fn as_direct_reference(&self) -> Option<BindingId> {
        match self {
            Formula::Reference { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Constant-fold this formula to a literal, if every leaf is one.
    /// This is what lets `x == 1 + 2` narrow `x` to `Int(3)`.
    pub fn literal(&self) -> Option<Lit> {
        match self {
            Formula::Literal(l) => Some(l.clone()),
            Formula::Neg(inner) => match inner.literal()? {
                Lit::Int(n) => Some(Lit::Int(n.checked_neg()?)),
                Lit::Float(x) => Some(Lit::Float(-x)),
                _ => None,
            },
            Formula::Add(a, b) => match (a.literal()?, b.literal()?) {
                (Lit::Int(x), Lit::Int(y)) => Some(Lit::Int(x.checked_add(y)?)),
                (Lit::Float(x), Lit::Float(y)) => Some(Lit::Float(x + y)),
                _ => None,
            },
            Formula::ConcatStr(a, b) => match (a.literal()?, b.literal()?) {
                (Lit::Str(x), Lit::Str(y)) => Some(Lit::Str(format!("{x}{y}"))),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Literal(l) => write!(f, "{l}"),
            Formula::Reference { name, .. } => write!(f, "{name}"),
            Formula::Access { base, key } => write!(f, "{base}{key}"),
            Formula::Add(a, b) => write!(f, "({a} + {b})"),
            Formula::Neg(a) => write!(f, "-{a}"),
            Formula::ConcatStr(a, b) | Formula::ConcatList(a, b) => {
                write!(f, "({a} ++ {b})")
            }
        }
    }
}

/// A subject, a comparison, and the value it is compared to.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub subject: Formula,
    pub cmp: Comparison,
    pub value: Formula,
}

impl Relationship {
    /// The binding refined by this relationship, if the subject is a bare
    /// reference. Derived-access subjects are tracked but narrow nothing
    /// yet.
    pub fn direct_binding(&self) -> Option<BindingId> {
        self.subject.as_direct_reference()
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.cmp, self.value)
    }
}

/// Turn a raw comparison into the relationships it justifies.
///
/// A side becomes a subject only when it resolves to a reference and the
/// other side does not: when both sides resolve the subject is ambiguous
/// (the same reference twice, or two different references), and the
/// comparison is dropped rather than double-counted. When the subject sat
/// on the right, the comparison is mirrored so the subject always reads
/// on the left.
pub fn relate(lhs: &Formula, cmp: Comparison, rhs: &Formula) -> Vec<Relationship> {
    match (lhs.subject(), rhs.subject()) {
        (Some(_), None) => vec![Relationship {
            subject: lhs.clone(),
            cmp,
            value: rhs.clone(),
        }],
        (None, Some(_)) => vec![Relationship {
            subject: rhs.clone(),
            cmp: cmp.mirror(),
            value: lhs.clone(),
        }],
        // Two subjects or none: nothing to narrow.
        _ => Vec::new(),
    }
}
