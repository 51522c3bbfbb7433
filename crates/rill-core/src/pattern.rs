//! The pattern-match engine.
//!
//! Patterns are a closed set of variants built once per match site. Each
//! variant answers two questions:
//!
//! - statically, how does assuming this pattern matched (or failed to
//!   match) refine the subject's type ([`Pattern::narrow_ty`]), and which
//!   binders does it introduce ([`Pattern::binder_facts`]);
//! - dynamically, does a concrete value match, and with which bindings
//!   ([`Pattern::test`]).
//!
//! Adding a variant forces every call site to handle it: all dispatch is
//! by exhaustive `match`.

use std::rc::Rc;

use rill_common::{BindingId, Span};

use crate::error::TypeError;
use crate::formula::{Comparison, Lit};
use crate::narrow::narrow;
use crate::ty::{CaseSig, IntRange, StrFacts, Ty};
use crate::value::Value;

/// The operator of a unary range pattern (`> 5`, `= 5`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl RangeOp {
    fn comparison(self) -> Comparison {
        match self {
            RangeOp::Gt => Comparison::Gt,
            RangeOp::Ge => Comparison::Ge,
            RangeOp::Lt => Comparison::Lt,
            RangeOp::Le => Comparison::Le,
            RangeOp::Eq => Comparison::Eq,
        }
    }
}

/// Which ends of a binary range pattern are open: `...`, `..<`, `<..`,
/// `<.<`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEnds {
    Closed,
    HiOpen,
    LoOpen,
    BothOpen,
}

impl RangeEnds {
    fn comparisons(self) -> (Comparison, Comparison) {
        match self {
            RangeEnds::Closed => (Comparison::Ge, Comparison::Le),
            RangeEnds::HiOpen => (Comparison::Ge, Comparison::Lt),
            RangeEnds::LoOpen => (Comparison::Gt, Comparison::Le),
            RangeEnds::BothOpen => (Comparison::Gt, Comparison::Lt),
        }
    }
}

/// One segment of a string-template pattern: literal text alternating
/// with binders.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Binder { id: BindingId, name: String },
}

/// A pattern in a match/case construct.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Matches anything, binds nothing.
    Wildcard,
    /// Matches anything, binds the whole subject.
    Binder { id: BindingId, name: String },
    /// Inside a list pattern: matches any run of elements, optionally
    /// binding them as a list. Standalone it behaves like a binder.
    Rest { binder: Option<(BindingId, String)> },
    /// Matches one exact value.
    Literal(Lit),
    /// A unary numeric range: `> 5`, `<= 2.5`, `= 7`.
    Compare { op: RangeOp, bound: Lit },
    /// A binary numeric range: `0...9`, `0..<10`, `0<..9`, `0<.<10`.
    Between { lo: Lit, hi: Lit, ends: RangeEnds },
    /// An enum case with positional sub-patterns. `rest` marks a trailing
    /// rest marker, letting the arguments prefix-match the case's arity.
    Case {
        name: String,
        args: Vec<Pattern>,
        rest: bool,
    },
    /// A list destructure. At most one element may be [`Pattern::Rest`].
    ListOf { items: Vec<Pattern> },
    /// A string template: literal segments alternating with binders.
    Template { segments: Vec<Segment> },
}

impl Pattern {
    pub fn binder(id: BindingId, name: impl Into<String>) -> Pattern {
        Pattern::Binder {
            id,
            name: name.into(),
        }
    }

    pub fn rest() -> Pattern {
        Pattern::Rest { binder: None }
    }

    pub fn rest_binder(id: BindingId, name: impl Into<String>) -> Pattern {
        Pattern::Rest {
            binder: Some((id, name.into())),
        }
    }

    /// How the subject type narrows under this pattern, on the matching
    /// (`truth = true`) or non-matching branch.
    pub fn narrow_ty(&self, current: &Ty, truth: bool, span: Span) -> Result<Ty, TypeError> {
        match self {
            Pattern::Wildcard | Pattern::Binder { .. } | Pattern::Rest { .. } => {
                // Always matches: the false branch is uninhabited.
                Ok(if truth { current.clone() } else { Ty::Never })
            }
            Pattern::Literal(lit) => {
                let cmp = if truth { Comparison::Eq } else { Comparison::Ne };
                Ok(narrow(current, cmp, lit))
            }
            Pattern::Compare { op, bound } => {
                let cmp = op.comparison();
                let cmp = if truth { cmp } else { cmp.invert() };
                Ok(narrow(current, cmp, bound))
            }
            Pattern::Between { lo, hi, ends } => {
                let (cmp_lo, cmp_hi) = ends.comparisons();
                if truth {
                    Ok(narrow(&narrow(current, cmp_lo, lo), cmp_hi, hi))
                } else {
                    // Outside the range means below it or above it.
                    Ok(Ty::union_of([
                        narrow(current, cmp_lo.invert(), lo),
                        narrow(current, cmp_hi.invert(), hi),
                    ]))
                }
            }
            Pattern::Case { name, .. } => {
                let resolved = self.resolve_case(current, span)?;
                Ok(match resolved {
                    Some(_) => filter_cases(current, name, truth),
                    // No matching case: the pattern can never match.
                    None => {
                        if truth {
                            Ty::Never
                        } else {
                            current.clone()
                        }
                    }
                })
            }
            Pattern::ListOf { items } => Ok(narrow_list(items, current, truth)),
            Pattern::Template { segments } => Ok(narrow_template(segments, current, truth)),
        }
    }

    /// The binders this pattern introduces when it matches, with the types
    /// they take on given the subject type.
    pub fn binder_facts(
        &self,
        subject: &Ty,
        span: Span,
        out: &mut Vec<(BindingId, String, Ty)>,
    ) -> Result<(), TypeError> {
        match self {
            Pattern::Wildcard
            | Pattern::Literal(_)
            | Pattern::Compare { .. }
            | Pattern::Between { .. } => Ok(()),
            Pattern::Binder { id, name } => {
                out.push((*id, name.clone(), subject.clone()));
                Ok(())
            }
            Pattern::Rest { binder } => {
                if let Some((id, name)) = binder {
                    out.push((*id, name.clone(), subject.clone()));
                }
                Ok(())
            }
            Pattern::Case { args, .. } => {
                let resolved = self.resolve_case(subject, span)?;
                match resolved {
                    Some(sig) => {
                        for (i, arg) in args.iter().enumerate() {
                            let param_ty = sig
                                .params
                                .get(i)
                                .map(|p| p.ty.clone())
                                .unwrap_or(Ty::Any);
                            arg.binder_facts(&param_ty, span, out)?;
                        }
                    }
                    None => {
                        // The match can never happen; any binders are
                        // uninhabited.
                        for arg in args {
                            arg.binder_facts(&Ty::Never, span, out)?;
                        }
                    }
                }
                Ok(())
            }
            Pattern::ListOf { items } => {
                let (elem, len) = match subject {
                    Ty::List { elem, len } => ((**elem).clone(), *len),
                    _ => (Ty::Any, IntRange::at_least(0)),
                };
                let fixed = items
                    .iter()
                    .filter(|p| !matches!(p, Pattern::Rest { .. }))
                    .count() as i64;
                for item in items {
                    if let Pattern::Rest {
                        binder: Some((id, name)),
                    } = item
                    {
                        // The rest binder sees whatever length the fixed
                        // elements leave over.
                        let rest_len = len.shift_down(fixed);
                        out.push((
                            *id,
                            name.clone(),
                            Ty::from_list(elem.clone(), rest_len),
                        ));
                    } else {
                        item.binder_facts(&elem, span, out)?;
                    }
                }
                Ok(())
            }
            Pattern::Template { segments } => {
                for seg in segments {
                    if let Segment::Binder { id, name } = seg {
                        out.push((*id, name.clone(), Ty::str()));
                    }
                }
                Ok(())
            }
        }
    }

    /// Every binder this pattern introduces, in left-to-right order.
    pub fn binders(&self, out: &mut Vec<(BindingId, String)>) {
        match self {
            Pattern::Wildcard
            | Pattern::Literal(_)
            | Pattern::Compare { .. }
            | Pattern::Between { .. } => {}
            Pattern::Binder { id, name } => out.push((*id, name.clone())),
            Pattern::Rest { binder } => {
                if let Some((id, name)) = binder {
                    out.push((*id, name.clone()));
                }
            }
            Pattern::Case { args, .. } => {
                for arg in args {
                    arg.binders(out);
                }
            }
            Pattern::ListOf { items } => {
                for item in items {
                    item.binders(out);
                }
            }
            Pattern::Template { segments } => {
                for seg in segments {
                    if let Segment::Binder { id, name } = seg {
                        out.push((*id, name.clone()));
                    }
                }
            }
        }
    }

    /// Find the unique enum case this pattern can mean across the subject
    /// type. Zero candidates is "no match"; two or more is an error the
    /// author must disambiguate.
    fn resolve_case(&self, subject: &Ty, span: Span) -> Result<Option<CaseSig>, TypeError> {
        let Pattern::Case { name, args, rest } = self else {
            return Ok(None);
        };
        let mut candidates: Vec<(String, CaseSig)> = Vec::new();
        collect_case_candidates(subject, name, args.len(), *rest, &mut candidates);
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(Some(candidates.remove(0).1)),
            _ => Err(TypeError::AmbiguousCase {
                case: name.clone(),
                candidates: candidates.into_iter().map(|(n, _)| n).collect(),
                span,
            }),
        }
    }

    /// Test a concrete value. `Some` carries the bindings of every named
    /// sub-pattern; `None` is "did not match", never an error.
    pub fn test(&self, value: &Value) -> Option<Vec<(BindingId, Value)>> {
        match self {
            Pattern::Wildcard => Some(Vec::new()),
            Pattern::Binder { id, .. } => Some(vec![(*id, value.clone())]),
            Pattern::Rest { binder } => Some(match binder {
                Some((id, _)) => vec![(*id, value.clone())],
                None => Vec::new(),
            }),
            Pattern::Literal(lit) => lit_matches(lit, value).then(Vec::new),
            Pattern::Compare { op, bound } => {
                let v = numeric(value)?;
                let b = lit_numeric(bound)?;
                let ok = match op {
                    RangeOp::Gt => v > b,
                    RangeOp::Ge => v >= b,
                    RangeOp::Lt => v < b,
                    RangeOp::Le => v <= b,
                    RangeOp::Eq => v == b,
                };
                ok.then(Vec::new)
            }
            Pattern::Between { lo, hi, ends } => {
                let v = numeric(value)?;
                let (l, h) = (lit_numeric(lo)?, lit_numeric(hi)?);
                let ok = match ends {
                    RangeEnds::Closed => v >= l && v <= h,
                    RangeEnds::HiOpen => v >= l && v < h,
                    RangeEnds::LoOpen => v > l && v <= h,
                    RangeEnds::BothOpen => v > l && v < h,
                };
                ok.then(Vec::new)
            }
            Pattern::Case { name, args, rest } => {
                let Value::Case {
                    case, args: vals, ..
                } = value
                else {
                    return None;
                };
                if case != name {
                    return None;
                }
                if *rest {
                    if vals.len() < args.len() {
                        return None;
                    }
                } else if vals.len() != args.len() {
                    return None;
                }
                let mut bindings = Vec::new();
                for (pat, val) in args.iter().zip(vals) {
                    bindings.extend(pat.test(val)?);
                }
                Some(bindings)
            }
            Pattern::ListOf { items } => test_list(items, value),
            Pattern::Template { segments } => {
                let Value::Str(s) = value else {
                    return None;
                };
                let raw = match_template(segments, s)?;
                Some(
                    raw.into_iter()
                        .map(|(id, text)| (id, Value::Str(Rc::from(text.as_str()))))
                        .collect(),
                )
            }
        }
    }
}

/// Gather every case of `subject` (walking unions) whose name and arity
/// fit the pattern. The qualified `Enum.Case` strings feed the ambiguity
/// error.
fn collect_case_candidates(
    subject: &Ty,
    name: &str,
    arity: usize,
    rest: bool,
    out: &mut Vec<(String, CaseSig)>,
) {
    match subject {
        Ty::Enum(e) => {
            for sig in &e.cases {
                let arity_ok = if rest {
                    sig.params.len() >= arity
                } else {
                    sig.params.len() == arity
                };
                if sig.name == name && arity_ok {
                    out.push((format!("{}.{}", e.name, sig.name), sig.clone()));
                }
            }
        }
        Ty::Union(ms) => {
            for m in ms {
                collect_case_candidates(m, name, arity, rest, out);
            }
        }
        _ => {}
    }
}

/// Keep (`keep = true`) or remove the named case from an enum type.
fn filter_cases(current: &Ty, case: &str, keep: bool) -> Ty {
    match current {
        Ty::Enum(e) => {
            let cases: Vec<CaseSig> = e
                .cases
                .iter()
                .filter(|c| (c.name == case) == keep)
                .cloned()
                .collect();
            Ty::from_cases(e.name.clone(), cases)
        }
        Ty::Union(ms) => Ty::union_of(ms.iter().map(|m| filter_cases(m, case, keep))),
        Ty::Any => Ty::Any,
        other => {
            if keep {
                Ty::Never
            } else {
                other.clone()
            }
        }
    }
}

fn narrow_list(items: &[Pattern], current: &Ty, truth: bool) -> Ty {
    let has_rest = items.iter().any(|p| matches!(p, Pattern::Rest { .. }));
    let fixed = items
        .iter()
        .filter(|p| !matches!(p, Pattern::Rest { .. }))
        .count() as i64;
    match current {
        Ty::List { elem, len } => {
            let elem = (**elem).clone();
            if truth {
                let required = if has_rest {
                    IntRange::at_least(fixed)
                } else {
                    IntRange::exact(fixed)
                };
                Ty::from_list(elem, len.intersect(&required))
            } else if has_rest {
                // Failing `[a, b, ...rest]` means fewer than two elements.
                Ty::from_list(elem, len.intersect(&IntRange::at_most(fixed - 1)))
            } else {
                // Failing an exact-length destructure leaves the lengths on
                // either side of the excluded one.
                Ty::union_of([
                    Ty::from_list(elem.clone(), len.intersect(&IntRange::at_most(fixed - 1))),
                    Ty::from_list(elem, len.intersect(&IntRange::at_least(fixed + 1))),
                ])
            }
        }
        Ty::Union(ms) => Ty::union_of(ms.iter().map(|m| narrow_list(items, m, truth))),
        Ty::Any => {
            if truth {
                let required = if has_rest {
                    IntRange::at_least(fixed)
                } else {
                    IntRange::exact(fixed)
                };
                Ty::from_list(Ty::Any, required)
            } else {
                Ty::Any
            }
        }
        other => {
            if truth {
                Ty::Never
            } else {
                other.clone()
            }
        }
    }
}

fn narrow_template(segments: &[Segment], current: &Ty, truth: bool) -> Ty {
    let literal_len: usize = segments
        .iter()
        .map(|s| match s {
            Segment::Text(t) => t.chars().count(),
            Segment::Binder { .. } => 0,
        })
        .sum();
    match current {
        Ty::Str(facts) => {
            if truth {
                // An exact literal subject can be tested outright.
                if let Some(lit) = &facts.lit {
                    return if match_template(segments, lit).is_some() {
                        Ty::Str(facts.clone())
                    } else {
                        Ty::Never
                    };
                }
                if facts.effective_max().is_some_and(|m| m < literal_len) {
                    return Ty::Never;
                }
                Ty::Str(StrFacts {
                    lit: None,
                    min_len: Some(facts.effective_min().unwrap_or(0).max(literal_len)),
                    max_len: facts.max_len,
                    pattern: facts.pattern.clone(),
                })
            } else {
                current.clone()
            }
        }
        Ty::Union(ms) => {
            if truth {
                Ty::union_of(ms.iter().map(|m| narrow_template(segments, m, true)))
            } else {
                current.clone()
            }
        }
        Ty::Any => {
            if truth {
                Ty::Str(StrFacts::min_len(literal_len))
            } else {
                Ty::Any
            }
        }
        other => {
            if truth {
                Ty::Never
            } else {
                other.clone()
            }
        }
    }
}

fn test_list(items: &[Pattern], value: &Value) -> Option<Vec<(BindingId, Value)>> {
    let Value::List(vals) = value else {
        return None;
    };
    let rest_at = items.iter().position(|p| matches!(p, Pattern::Rest { .. }));
    match rest_at {
        None => {
            if vals.len() != items.len() {
                return None;
            }
            let mut bindings = Vec::new();
            for (pat, val) in items.iter().zip(vals) {
                bindings.extend(pat.test(val)?);
            }
            Some(bindings)
        }
        Some(k) => {
            let initial = &items[..k];
            let trailing = &items[k + 1..];
            if vals.len() < initial.len() + trailing.len() {
                return None;
            }
            let mut bindings = Vec::new();
            for (pat, val) in initial.iter().zip(&vals[..initial.len()]) {
                bindings.extend(pat.test(val)?);
            }
            let middle = &vals[initial.len()..vals.len() - trailing.len()];
            if let Pattern::Rest {
                binder: Some((id, _)),
            } = &items[k]
            {
                bindings.push((*id, Value::List(middle.to_vec())));
            }
            for (pat, val) in trailing.iter().zip(&vals[vals.len() - trailing.len()..]) {
                bindings.extend(pat.test(val)?);
            }
            Some(bindings)
        }
    }
}

/// Match a template against text, left to right. Each literal segment
/// takes its first occurrence that still lets every later segment be
/// found -- a deterministic backtracking search. Binders capture the text
/// between their neighbouring literals.
fn match_template(segments: &[Segment], text: &str) -> Option<Vec<(BindingId, String)>> {
    match segments {
        [] => text.is_empty().then(Vec::new),
        [Segment::Text(t), rest @ ..] => {
            let remainder = text.strip_prefix(t.as_str())?;
            match_template(rest, remainder)
        }
        [Segment::Binder { id, .. }] => Some(vec![(*id, text.to_string())]),
        [Segment::Binder { id, .. }, Segment::Text(t), rest @ ..] => {
            let mut from = 0;
            while let Some(pos) = text[from..].find(t.as_str()) {
                let at = from + pos;
                if let Some(mut bindings) = match_template(rest, &text[at + t.len()..]) {
                    bindings.insert(0, (*id, text[..at].to_string()));
                    return Some(bindings);
                }
                // Step one character past this occurrence and retry.
                let step = text[at..].chars().next().map_or(1, char::len_utf8);
                from = at + step;
            }
            None
        }
        [Segment::Binder { id, .. }, rest @ ..] => {
            // Two adjacent binders: the first captures nothing, the second
            // takes over.
            let mut bindings = match_template(rest, text)?;
            bindings.insert(0, (*id, String::new()));
            Some(bindings)
        }
    }
}


/// Compare a literal against a value. Numeric families compare by value,
/// so `1` matches `1.0`; everything else requires the same family.
fn lit_matches(lit: &Lit, value: &Value) -> bool {
    match (lit, value) {
        (Lit::None, Value::None) => true,
        (Lit::Bool(a), Value::Bool(b)) => a == b,
        (Lit::Str(a), Value::Str(b)) => a.as_str() == b.as_ref(),
        _ => match (lit_numeric(lit), numeric(value)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn lit_numeric(lit: &Lit) -> Option<f64> {
    match lit {
        Lit::Int(n) => Some(*n as f64),
        Lit::Float(x) => Some(*x),
        _ => None,
    }
}
