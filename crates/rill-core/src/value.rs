//! Runtime values.
//!
//! Values are immutable; evaluation builds new ones and never mutates an
//! environment in place. Strings are reference-counted so the bounded
//! intern cache (see [`crate::intern`]) can hand out shared copies.

use std::fmt;
use std::rc::Rc;

use crate::ty::{CaseSig, EnumTy, FloatRange, IntRange, StrFacts, Ty};

/// A concrete Rill value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Vec<Value>),
    /// An enum case instance with its positional payload.
    Case {
        enum_name: String,
        case: String,
        args: Vec<Value>,
    },
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    /// The most specific type this single value inhabits. Used by tests to
    /// check narrowing soundness and by runtime error messages.
    pub fn ty(&self) -> Ty {
        match self {
            Value::None => Ty::None,
            Value::Bool(b) => Ty::Bool(Some(*b)),
            Value::Int(n) => Ty::Int(IntRange::exact(*n)),
            Value::Float(x) => Ty::Float(FloatRange::exact(*x)),
            Value::Str(s) => Ty::Str(StrFacts::exact(s.as_ref())),
            Value::List(items) => {
                let elem = Ty::union_of(items.iter().map(Value::ty));
                Ty::List {
                    elem: Box::new(if items.is_empty() { Ty::Any } else { elem }),
                    len: IntRange::exact(items.len() as i64),
                }
            }
            Value::Case {
                enum_name,
                case,
                args,
            } => Ty::Enum(EnumTy {
                name: enum_name.clone(),
                cases: vec![CaseSig {
                    name: case.clone(),
                    params: args
                        .iter()
                        .enumerate()
                        .map(|(i, a)| crate::ty::CaseParam {
                            name: format!("_{i}"),
                            ty: a.ty(),
                        })
                        .collect(),
                }],
            }),
        }
    }

    pub fn is_truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The numeric value, with ints widened to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Case {
                enum_name,
                case,
                args,
            } => {
                write!(f, "{enum_name}.{case}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}
