//! The per-type narrowing algebra.
//!
//! One pure function per primitive family maps (current type, comparison,
//! literal) to a refined type. `Never` is the bottom result: the
//! comparison can never hold for a value of the current type.
//!
//! The false branch is not a separate implementation: it is the same
//! algebra applied to the inverted operator ([`narrow_false`]), so the two
//! branches stay symmetric by construction.
//!
//! Guarantees (tested in `tests/narrowing.rs`):
//! - monotone: the result is always a subtype of the input,
//! - sound: every value satisfying the comparison inhabits the result,
//! - idempotent: applying the same fact twice changes nothing.

use crate::formula::{Comparison, Lit};
use crate::ty::{Bound, FloatRange, IntRange, StrFacts, Ty};

/// Refine `current` with the fact `subject <cmp> lit`.
pub fn narrow(current: &Ty, cmp: Comparison, lit: &Lit) -> Ty {
    match current {
        Ty::Never => Ty::Never,
        Ty::Union(members) => {
            Ty::union_of(members.iter().map(|m| narrow(m, cmp, lit)))
        }
        Ty::Any => match cmp {
            // Equality against a literal pins the type to its singleton
            // even when nothing else is known.
            Comparison::Eq => lit.ty(),
            _ => Ty::Any,
        },
        Ty::None => narrow_none(cmp, lit),
        Ty::Bool(b) => narrow_bool(*b, cmp, lit),
        Ty::Int(r) => narrow_int(r, cmp, lit),
        Ty::Float(r) => narrow_float(r, cmp, lit),
        Ty::Str(facts) => narrow_str(facts, cmp, lit),
        // Lists and enums never equal a primitive literal.
        Ty::List { .. } | Ty::Enum(_) => match cmp {
            Comparison::Eq => Ty::Never,
            _ => current.clone(),
        },
    }
}

/// Refine `current` assuming `subject <cmp> lit` is false.
pub fn narrow_false(current: &Ty, cmp: Comparison, lit: &Lit) -> Ty {
    narrow(current, cmp.invert(), lit)
}

fn narrow_none(cmp: Comparison, lit: &Lit) -> Ty {
    match (cmp, lit) {
        // `none` is a singleton: equality keeps it, inequality empties it.
        (Comparison::Eq, Lit::None) => Ty::None,
        (Comparison::Ne, Lit::None) => Ty::Never,
        (Comparison::Eq, _) => Ty::Never,
        _ => Ty::None,
    }
}

fn narrow_bool(current: Option<bool>, cmp: Comparison, lit: &Lit) -> Ty {
    let Lit::Bool(b) = lit else {
        // Family mismatch: equality is impossible, anything else learns
        // nothing.
        return match cmp {
            Comparison::Eq => Ty::Never,
            _ => Ty::Bool(current),
        };
    };
    match cmp {
        Comparison::Eq => match current {
            None => Ty::Bool(Some(*b)),
            Some(c) if c == *b => Ty::Bool(Some(c)),
            Some(_) => Ty::Never,
        },
        Comparison::Ne => match current {
            // Two-valued domain: ruling one value out pins the other.
            None => Ty::Bool(Some(!*b)),
            Some(c) if c == *b => Ty::Never,
            Some(c) => Ty::Bool(Some(c)),
        },
        // Ordering on booleans makes no inference.
        _ => Ty::Bool(current),
    }
}

fn narrow_int(range: &IntRange, cmp: Comparison, lit: &Lit) -> Ty {
    match lit {
        Lit::Int(n) => narrow_int_by(range, cmp, *n, None),
        Lit::Float(x) => {
            if x.fract() == 0.0 {
                narrow_int_by(range, cmp, *x as i64, None)
            } else {
                // A fractional literal can never equal an int; ordering
                // comparisons round the bound into the int domain.
                narrow_int_by(range, cmp, 0, Some(*x))
            }
        }
        _ => match cmp {
            Comparison::Eq => Ty::Never,
            _ => Ty::Int(*range),
        },
    }
}

/// Narrow an int range. `fractional` carries a non-integral literal; when
/// present, equality is impossible and ordering bounds are rounded inward
/// (floor/ceil per operator) so the result never has a fractional
/// boundary.
fn narrow_int_by(range: &IntRange, cmp: Comparison, n: i64, fractional: Option<f64>) -> Ty {
    match cmp {
        Comparison::Eq => match fractional {
            Some(_) => Ty::Never,
            None if range.contains(n) => Ty::Int(IntRange::exact(n)),
            None => Ty::Never,
        },
        Comparison::Ne => match fractional {
            Some(_) => Ty::Int(*range),
            None => {
                if range.as_exact() == Some(n) {
                    Ty::Never
                } else if range.lo == Some(n) {
                    Ty::from_int_range(IntRange::new(Some(n + 1), range.hi))
                } else if range.hi == Some(n) {
                    Ty::from_int_range(IntRange::new(range.lo, Some(n - 1)))
                } else {
                    // An interior exclusion has no hole representation;
                    // the range is unchanged.
                    Ty::Int(*range)
                }
            }
        },
        Comparison::Lt => {
            let hi = match fractional {
                Some(x) => x.ceil() as i64 - 1,
                None => n - 1,
            };
            Ty::from_int_range(range.intersect(&IntRange::at_most(hi)))
        }
        Comparison::Le => {
            let hi = match fractional {
                Some(x) => x.floor() as i64,
                None => n,
            };
            Ty::from_int_range(range.intersect(&IntRange::at_most(hi)))
        }
        Comparison::Gt => {
            let lo = match fractional {
                Some(x) => x.floor() as i64 + 1,
                None => n + 1,
            };
            Ty::from_int_range(range.intersect(&IntRange::at_least(lo)))
        }
        Comparison::Ge => {
            let lo = match fractional {
                Some(x) => x.ceil() as i64,
                None => n,
            };
            Ty::from_int_range(range.intersect(&IntRange::at_least(lo)))
        }
    }
}

fn narrow_float(range: &FloatRange, cmp: Comparison, lit: &Lit) -> Ty {
    let x = match lit {
        Lit::Float(x) => *x,
        Lit::Int(n) => *n as f64,
        _ => {
            return match cmp {
                Comparison::Eq => Ty::Never,
                _ => Ty::Float(*range),
            }
        }
    };
    match cmp {
        Comparison::Eq => {
            if range.contains(x) {
                Ty::Float(FloatRange::exact(x))
            } else {
                Ty::Never
            }
        }
        Comparison::Ne => {
            if range.as_exact() == Some(x) {
                return Ty::Never;
            }
            // Flip an inclusive boundary to exclusive when it sits exactly
            // on the excluded literal; an interior exclusion is a
            // documented no-op (no hole representation).
            let mut r = *range;
            if let Some(lo) = r.lo {
                if lo.inclusive && lo.value == x {
                    r.lo = Some(Bound::exclusive(x));
                }
            }
            if let Some(hi) = r.hi {
                if hi.inclusive && hi.value == x {
                    r.hi = Some(Bound::exclusive(x));
                }
            }
            Ty::from_float_range(r)
        }
        Comparison::Lt => Ty::from_float_range(range.intersect(&FloatRange::new(
            None,
            Some(Bound::exclusive(x)),
        ))),
        Comparison::Le => Ty::from_float_range(range.intersect(&FloatRange::new(
            None,
            Some(Bound::inclusive(x)),
        ))),
        Comparison::Gt => Ty::from_float_range(range.intersect(&FloatRange::new(
            Some(Bound::exclusive(x)),
            None,
        ))),
        Comparison::Ge => Ty::from_float_range(range.intersect(&FloatRange::new(
            Some(Bound::inclusive(x)),
            None,
        ))),
    }
}

fn narrow_str(facts: &StrFacts, cmp: Comparison, lit: &Lit) -> Ty {
    let Lit::Str(s) = lit else {
        return match cmp {
            Comparison::Eq => Ty::Never,
            _ => Ty::Str(facts.clone()),
        };
    };
    match cmp {
        Comparison::Eq => {
            if let Some(t) = &facts.lit {
                return if t == s {
                    Ty::Str(facts.clone())
                } else {
                    Ty::Never
                };
            }
            let len = s.chars().count();
            if facts.min_len.is_some_and(|m| len < m)
                || facts.max_len.is_some_and(|m| len > m)
            {
                return Ty::Never;
            }
            // Keep a known pattern fact: the intersection {s} ∩ current is
            // either {s} or empty, and carrying the pattern keeps the
            // result a subtype either way.
            Ty::Str(StrFacts {
                lit: Some(s.clone()),
                min_len: None,
                max_len: None,
                pattern: facts.pattern.clone(),
            })
        }
        Comparison::Ne => {
            if facts.lit.as_deref() == Some(s.as_str()) {
                Ty::Never
            } else {
                Ty::Str(facts.clone())
            }
        }
        // Ordering comparisons on strings make no inference.
        _ => Ty::Str(facts.clone()),
    }
}
