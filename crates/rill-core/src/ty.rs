//! The narrowed type model.
//!
//! A [`Ty`] is what the engine knows statically about a value: a primitive
//! family optionally refined with facts (a numeric range, string length
//! bounds, a remaining set of enum cases), plus the `Never`/`Any`
//! sentinels. Types are persistent values -- narrowing always builds a new
//! `Ty` and rebinds it in the environment, never mutates one in place.

use std::fmt;

use serde::Serialize;

/// An inclusive integer range with optional bounds. `None` means unbounded
/// on that side. An empty range (lo > hi) normalizes to [`Ty::Never`] at
/// construction sites via [`Ty::from_int_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IntRange {
    pub lo: Option<i64>,
    pub hi: Option<i64>,
}

impl IntRange {
    pub fn full() -> Self {
        IntRange { lo: None, hi: None }
    }

    pub fn exact(n: i64) -> Self {
        IntRange {
            lo: Some(n),
            hi: Some(n),
        }
    }

    pub fn new(lo: Option<i64>, hi: Option<i64>) -> Self {
        IntRange { lo, hi }
    }

    pub fn at_least(n: i64) -> Self {
        IntRange {
            lo: Some(n),
            hi: None,
        }
    }

    pub fn at_most(n: i64) -> Self {
        IntRange {
            lo: None,
            hi: Some(n),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!((self.lo, self.hi), (Some(l), Some(h)) if l > h)
    }

    /// The single value of the range, if it has exactly one.
    pub fn as_exact(&self) -> Option<i64> {
        match (self.lo, self.hi) {
            (Some(l), Some(h)) if l == h => Some(l),
            _ => None,
        }
    }

    pub fn contains(&self, n: i64) -> bool {
        self.lo.is_none_or(|l| n >= l) && self.hi.is_none_or(|h| n <= h)
    }

    pub fn intersect(&self, other: &IntRange) -> IntRange {
        IntRange {
            lo: max_opt(self.lo, other.lo),
            hi: min_opt(self.hi, other.hi),
        }
    }

    /// The smallest range covering both (used when merging branches).
    pub fn hull(&self, other: &IntRange) -> IntRange {
        IntRange {
            lo: self.lo.zip(other.lo).map(|(a, b)| a.min(b)),
            hi: self.hi.zip(other.hi).map(|(a, b)| a.max(b)),
        }
    }

    /// Whether the two ranges overlap or sit immediately next to each
    /// other, so their hull covers exactly their union.
    pub fn touches(&self, other: &IntRange) -> bool {
        if !self.intersect(other).is_empty() {
            return true;
        }
        let adjacent = |hi: Option<i64>, lo: Option<i64>| {
            matches!((hi, lo), (Some(h), Some(l)) if h.checked_add(1) == Some(l))
        };
        adjacent(self.hi, other.lo) || adjacent(other.hi, self.lo)
    }

    /// Whether every value of `inner` lies in `self`.
    pub fn contains_range(&self, inner: &IntRange) -> bool {
        let lo_ok = match (self.lo, inner.lo) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(outer), Some(inner)) => inner >= outer,
        };
        let hi_ok = match (self.hi, inner.hi) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(outer), Some(inner)) => inner <= outer,
        };
        lo_ok && hi_ok
    }

    /// Shift both bounds down by `n`, clamping the low bound at zero.
    /// Used for the length a rest binder can still cover.
    pub fn shift_down(&self, n: i64) -> IntRange {
        IntRange {
            lo: Some(self.lo.map_or(0, |l| (l - n).max(0))),
            hi: self.hi.map(|h| h - n),
        }
    }
}

fn max_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (x, None) | (None, x) => x,
    }
}

fn min_opt(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (x, None) | (None, x) => x,
    }
}

/// One end of a float range: the value and whether it is included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bound {
    pub value: f64,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(value: f64) -> Self {
        Bound {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: f64) -> Self {
        Bound {
            value,
            inclusive: false,
        }
    }
}

/// A float range with optional bounds, each independently inclusive or
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FloatRange {
    pub lo: Option<Bound>,
    pub hi: Option<Bound>,
}

impl FloatRange {
    pub fn full() -> Self {
        FloatRange { lo: None, hi: None }
    }

    pub fn exact(x: f64) -> Self {
        FloatRange {
            lo: Some(Bound::inclusive(x)),
            hi: Some(Bound::inclusive(x)),
        }
    }

    pub fn new(lo: Option<Bound>, hi: Option<Bound>) -> Self {
        FloatRange { lo, hi }
    }

    pub fn is_empty(&self) -> bool {
        match (self.lo, self.hi) {
            (Some(l), Some(h)) => {
                l.value > h.value || (l.value == h.value && !(l.inclusive && h.inclusive))
            }
            _ => false,
        }
    }

    pub fn as_exact(&self) -> Option<f64> {
        match (self.lo, self.hi) {
            (Some(l), Some(h)) if l.value == h.value && l.inclusive && h.inclusive => {
                Some(l.value)
            }
            _ => None,
        }
    }

    pub fn contains(&self, x: f64) -> bool {
        let lo_ok = self
            .lo
            .is_none_or(|l| if l.inclusive { x >= l.value } else { x > l.value });
        let hi_ok = self
            .hi
            .is_none_or(|h| if h.inclusive { x <= h.value } else { x < h.value });
        lo_ok && hi_ok
    }

    pub fn intersect(&self, other: &FloatRange) -> FloatRange {
        FloatRange {
            lo: tighter_lo(self.lo, other.lo),
            hi: tighter_hi(self.hi, other.hi),
        }
    }

    pub fn hull(&self, other: &FloatRange) -> FloatRange {
        let lo = self.lo.zip(other.lo).map(|(a, b)| {
            if a.value < b.value {
                a
            } else if b.value < a.value {
                b
            } else {
                Bound {
                    value: a.value,
                    inclusive: a.inclusive || b.inclusive,
                }
            }
        });
        let hi = self.hi.zip(other.hi).map(|(a, b)| {
            if a.value > b.value {
                a
            } else if b.value > a.value {
                b
            } else {
                Bound {
                    value: a.value,
                    inclusive: a.inclusive || b.inclusive,
                }
            }
        });
        FloatRange { lo, hi }
    }

    pub fn contains_range(&self, inner: &FloatRange) -> bool {
        let lo_ok = match (self.lo, inner.lo) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(outer), Some(inner)) => {
                inner.value > outer.value
                    || (inner.value == outer.value && (outer.inclusive || !inner.inclusive))
            }
        };
        let hi_ok = match (self.hi, inner.hi) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(outer), Some(inner)) => {
                inner.value < outer.value
                    || (inner.value == outer.value && (outer.inclusive || !inner.inclusive))
            }
        };
        lo_ok && hi_ok
    }
}

fn tighter_lo(a: Option<Bound>, b: Option<Bound>) -> Option<Bound> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a.value > b.value {
            a
        } else if b.value > a.value {
            b
        } else {
            Bound {
                value: a.value,
                inclusive: a.inclusive && b.inclusive,
            }
        }),
        (x, None) | (None, x) => x,
    }
}

fn tighter_hi(a: Option<Bound>, b: Option<Bound>) -> Option<Bound> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if a.value < b.value {
            a
        } else if b.value < a.value {
            b
        } else {
            Bound {
                value: a.value,
                inclusive: a.inclusive && b.inclusive,
            }
        }),
        (x, None) | (None, x) => x,
    }
}

/// What the engine knows about a string: an exact literal, length bounds,
/// and an optional regex-source pattern. The pattern is carried as an
/// opaque fact for display and subtype comparison; the engine never
/// compiles it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StrFacts {
    pub lit: Option<String>,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub pattern: Option<String>,
}

impl StrFacts {
    pub fn any() -> Self {
        StrFacts::default()
    }

    pub fn exact(s: impl Into<String>) -> Self {
        StrFacts {
            lit: Some(s.into()),
            ..StrFacts::default()
        }
    }

    pub fn min_len(n: usize) -> Self {
        StrFacts {
            min_len: Some(n),
            ..StrFacts::default()
        }
    }

    /// The lowest length any matching string can have.
    pub fn effective_min(&self) -> Option<usize> {
        self.lit
            .as_ref()
            .map(|s| s.chars().count())
            .or(self.min_len)
    }

    /// The highest length any matching string can have.
    pub fn effective_max(&self) -> Option<usize> {
        self.lit
            .as_ref()
            .map(|s| s.chars().count())
            .or(self.max_len)
    }

    fn union(&self, other: &StrFacts) -> StrFacts {
        if self.lit.is_some() && self.lit == other.lit {
            return self.clone();
        }
        StrFacts {
            lit: None,
            min_len: self
                .effective_min()
                .zip(other.effective_min())
                .map(|(a, b)| a.min(b)),
            max_len: self
                .effective_max()
                .zip(other.effective_max())
                .map(|(a, b)| a.max(b)),
            pattern: match (&self.pattern, &other.pattern) {
                (Some(a), Some(b)) if a == b => Some(a.clone()),
                _ => None,
            },
        }
    }

    fn implies(&self, weaker: &StrFacts) -> bool {
        let lit_ok = match &weaker.lit {
            None => true,
            Some(w) => self.lit.as_deref() == Some(w.as_str()),
        };
        let min_ok = match weaker.effective_min() {
            None => true,
            Some(w) => self.effective_min().is_some_and(|m| m >= w),
        };
        let max_ok = match weaker.effective_max() {
            None => true,
            Some(w) => self.effective_max().is_some_and(|m| m <= w),
        };
        // Without compiling patterns, only an identical pattern counts.
        let pat_ok = match &weaker.pattern {
            None => true,
            Some(w) => self.pattern.as_deref() == Some(w.as_str()),
        };
        lit_ok && min_ok && max_ok && pat_ok
    }
}

/// One parameter of an enum case, with its declared payload type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseParam {
    pub name: String,
    pub ty: Ty,
}

/// The signature of one enum case: its name and parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseSig {
    pub name: String,
    pub params: Vec<CaseParam>,
}

impl CaseSig {
    pub fn nullary(name: impl Into<String>) -> Self {
        CaseSig {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(name: impl Into<String>, params: Vec<(&str, Ty)>) -> Self {
        CaseSig {
            name: name.into(),
            params: params
                .into_iter()
                .map(|(n, ty)| CaseParam {
                    name: n.to_string(),
                    ty,
                })
                .collect(),
        }
    }
}

/// A declared enum type, possibly narrowed to a subset of its cases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumTy {
    pub name: String,
    pub cases: Vec<CaseSig>,
}

/// A Rill type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Ty {
    /// The unit/absent value.
    None,
    /// A boolean, optionally pinned to one value.
    Bool(Option<bool>),
    /// An integer constrained to an inclusive range.
    Int(IntRange),
    /// A float constrained to a range with per-bound inclusivity.
    Float(FloatRange),
    /// A string with optional literal/length/pattern facts.
    Str(StrFacts),
    /// A list with an element type and length bounds.
    List { elem: Box<Ty>, len: IntRange },
    /// An enum narrowed to a set of remaining cases.
    Enum(EnumTy),
    /// A value that may be any of several types.
    Union(Vec<Ty>),
    /// The top type: nothing is known.
    Any,
    /// The bottom type: no value inhabits it.
    Never,
}

impl Ty {
    pub fn bool() -> Ty {
        Ty::Bool(None)
    }

    pub fn int() -> Ty {
        Ty::Int(IntRange::full())
    }

    pub fn int_exact(n: i64) -> Ty {
        Ty::Int(IntRange::exact(n))
    }

    pub fn int_range(lo: Option<i64>, hi: Option<i64>) -> Ty {
        Ty::from_int_range(IntRange::new(lo, hi))
    }

    pub fn float() -> Ty {
        Ty::Float(FloatRange::full())
    }

    pub fn str() -> Ty {
        Ty::Str(StrFacts::any())
    }

    pub fn str_exact(s: impl Into<String>) -> Ty {
        Ty::Str(StrFacts::exact(s))
    }

    pub fn list(elem: Ty) -> Ty {
        Ty::List {
            elem: Box::new(elem),
            len: IntRange::at_least(0),
        }
    }

    pub fn list_len(elem: Ty, len: IntRange) -> Ty {
        Ty::from_list(elem, len)
    }

    /// Build an `Int`, collapsing an empty range to `Never`.
    pub fn from_int_range(range: IntRange) -> Ty {
        if range.is_empty() {
            Ty::Never
        } else {
            Ty::Int(range)
        }
    }

    /// Build a `Float`, collapsing an empty range to `Never`.
    pub fn from_float_range(range: FloatRange) -> Ty {
        if range.is_empty() {
            Ty::Never
        } else {
            Ty::Float(range)
        }
    }

    /// Build a `List`, collapsing an impossible length to `Never`.
    pub fn from_list(elem: Ty, len: IntRange) -> Ty {
        if len.is_empty() || len.hi.is_some_and(|h| h < 0) {
            Ty::Never
        } else {
            Ty::List {
                elem: Box::new(elem),
                len,
            }
        }
    }

    /// Build an `Enum`, collapsing an empty case set to `Never`.
    pub fn from_cases(name: impl Into<String>, cases: Vec<CaseSig>) -> Ty {
        if cases.is_empty() {
            Ty::Never
        } else {
            Ty::Enum(EnumTy {
                name: name.into(),
                cases,
            })
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Ty::Never)
    }

    /// Union of an arbitrary set of types, flattened and merged per family.
    pub fn union_of(members: impl IntoIterator<Item = Ty>) -> Ty {
        let mut out: Vec<Ty> = Vec::new();
        for member in members {
            match member {
                Ty::Never => {}
                Ty::Any => return Ty::Any,
                Ty::Union(inner) => {
                    for m in inner {
                        push_member(&mut out, m);
                    }
                }
                m => push_member(&mut out, m),
            }
        }
        match out.len() {
            0 => Ty::Never,
            1 => out.pop().unwrap_or(Ty::Never),
            _ => Ty::Union(out),
        }
    }

    /// Smallest representable type covering both `self` and `other`.
    pub fn union_with(&self, other: &Ty) -> Ty {
        Ty::union_of([self.clone(), other.clone()])
    }

    /// Whether every value of `self` is also a value of `other`.
    ///
    /// Conservative: `false` means "could not prove it", not "disjoint".
    pub fn is_subtype_of(&self, other: &Ty) -> bool {
        if self == other || self.is_never() {
            return true;
        }
        match (self, other) {
            (_, Ty::Any) => true,
            (Ty::Union(ms), _) => ms.iter().all(|m| m.is_subtype_of(other)),
            (_, Ty::Union(ms)) => ms.iter().any(|m| self.is_subtype_of(m)),
            (Ty::Bool(a), Ty::Bool(b)) => b.is_none() || a == b,
            (Ty::Int(a), Ty::Int(b)) => b.contains_range(a),
            (Ty::Float(a), Ty::Float(b)) => b.contains_range(a),
            (Ty::Str(a), Ty::Str(b)) => a.implies(b),
            (
                Ty::List {
                    elem: e1,
                    len: l1,
                },
                Ty::List {
                    elem: e2,
                    len: l2,
                },
            ) => e1.is_subtype_of(e2) && l2.contains_range(l1),
            (Ty::Enum(a), Ty::Enum(b)) => {
                a.name == b.name
                    && a.cases
                        .iter()
                        .all(|c| b.cases.iter().any(|d| d.name == c.name))
            }
            _ => false,
        }
    }
}

/// Merge `m` into `out`, combining it with an existing member of the same
/// family when possible.
fn push_member(out: &mut Vec<Ty>, m: Ty) {
    for existing in out.iter_mut() {
        if let Some(merged) = merge_same_family(existing, &m) {
            *existing = merged;
            return;
        }
    }
    out.push(m);
}

/// Combine two types of the same family into their hull, or `None` when
/// the families differ and the union must stay structural.
fn merge_same_family(a: &Ty, b: &Ty) -> Option<Ty> {
    match (a, b) {
        (Ty::None, Ty::None) => Some(Ty::None),
        (Ty::Bool(x), Ty::Bool(y)) => Some(Ty::Bool(if x == y { *x } else { None })),
        (Ty::Int(x), Ty::Int(y)) => Some(Ty::Int(x.hull(y))),
        (Ty::Float(x), Ty::Float(y)) => Some(Ty::Float(x.hull(y))),
        (Ty::Str(x), Ty::Str(y)) => Some(Ty::Str(x.union(y))),
        (
            Ty::List {
                elem: e1,
                len: l1,
            },
            Ty::List {
                elem: e2,
                len: l2,
            },
        ) => {
            // Length ranges with a gap between them stay separate union
            // members; hulling across the gap would resurrect excluded
            // lengths.
            if !l1.touches(l2) {
                return None;
            }
            Some(Ty::List {
                elem: Box::new(e1.union_with(e2)),
                len: l1.hull(l2),
            })
        }
        (Ty::Enum(x), Ty::Enum(y)) if x.name == y.name => {
            let mut cases = x.cases.clone();
            for c in &y.cases {
                if !cases.iter().any(|d| d.name == c.name) {
                    cases.push(c.clone());
                }
            }
            Some(Ty::Enum(EnumTy {
                name: x.name.clone(),
                cases,
            }))
        }
        _ => None,
    }
}

// ── Display ────────────────────────────────────────────────────────────

fn fmt_int_range(f: &mut fmt::Formatter<'_>, name: &str, r: &IntRange) -> fmt::Result {
    match (r.lo, r.hi) {
        (None, None) => write!(f, "{name}"),
        (Some(l), Some(h)) if l == h => write!(f, "{name}({l})"),
        (Some(l), Some(h)) => write!(f, "{name}({l}...{h})"),
        (Some(l), None) => write!(f, "{name}({l}...)"),
        (None, Some(h)) => write!(f, "{name}(...{h})"),
    }
}

fn fmt_float_range(f: &mut fmt::Formatter<'_>, r: &FloatRange) -> fmt::Result {
    if let Some(x) = r.as_exact() {
        return write!(f, "Float({x})");
    }
    match (r.lo, r.hi) {
        (None, None) => write!(f, "Float"),
        (Some(l), Some(h)) => {
            let sep = match (l.inclusive, h.inclusive) {
                (true, true) => "...",
                (true, false) => "..<",
                (false, true) => "<..",
                (false, false) => "<.<",
            };
            write!(f, "Float({}{}{})", l.value, sep, h.value)
        }
        (Some(l), None) => {
            if l.inclusive {
                write!(f, "Float({}...)", l.value)
            } else {
                write!(f, "Float({}<..)", l.value)
            }
        }
        (None, Some(h)) => {
            if h.inclusive {
                write!(f, "Float(...{})", h.value)
            } else {
                write!(f, "Float(..<{})", h.value)
            }
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::None => write!(f, "None"),
            Ty::Bool(None) => write!(f, "Bool"),
            Ty::Bool(Some(b)) => write!(f, "{b}"),
            Ty::Int(r) => fmt_int_range(f, "Int", r),
            Ty::Float(r) => fmt_float_range(f, r),
            Ty::Str(facts) => {
                if let Some(lit) = &facts.lit {
                    return write!(f, "'{lit}'");
                }
                let mut parts = Vec::new();
                match (facts.min_len, facts.max_len) {
                    (Some(a), Some(b)) if a == b => parts.push(format!("len {a}")),
                    (Some(a), Some(b)) => parts.push(format!("len {a}...{b}")),
                    (Some(a), None) => parts.push(format!("len {a}...")),
                    (None, Some(b)) => parts.push(format!("len ...{b}")),
                    (None, None) => {}
                }
                if let Some(p) = &facts.pattern {
                    parts.push(format!("/{p}/"));
                }
                if parts.is_empty() {
                    write!(f, "Str")
                } else {
                    write!(f, "Str({})", parts.join(", "))
                }
            }
            Ty::List { elem, len } => {
                write!(f, "List<{elem}>")?;
                match (len.lo, len.hi) {
                    (Some(0), None) | (None, None) => Ok(()),
                    (Some(l), Some(h)) if l == h => write!(f, "(len {l})"),
                    (Some(l), Some(h)) => write!(f, "(len {l}...{h})"),
                    (Some(l), None) => write!(f, "(len {l}...)"),
                    (None, Some(h)) => write!(f, "(len ...{h})"),
                }
            }
            Ty::Enum(e) => {
                if e.cases.len() == 1 {
                    write!(f, "{}.{}", e.name, e.cases[0].name)
                } else {
                    let names: Vec<&str> =
                        e.cases.iter().map(|c| c.name.as_str()).collect();
                    write!(f, "{}({})", e.name, names.join(" | "))
                }
            }
            Ty::Union(ms) => {
                for (i, m) in ms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{m}")?;
                }
                Ok(())
            }
            Ty::Any => write!(f, "Any"),
            Ty::Never => write!(f, "Never"),
        }
    }
}
