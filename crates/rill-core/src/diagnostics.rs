//! Ariadne-based diagnostic rendering for type errors.
//!
//! Renders [`TypeError`] values into formatted, labeled messages against
//! the original source text. Output is colorless so snapshots stay
//! stable, with a help line when a plausible fix exists.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use rill_common::Span;

use crate::error::TypeError;

// ── Error codes ─────────────────────────────────────────────────────────

/// Assign a unique code to each error variant.
pub fn error_code(err: &TypeError) -> &'static str {
    match err {
        TypeError::Mismatch { .. } => "E0001",
        TypeError::IncompatibleOperands { .. } => "E0002",
        TypeError::UnboundName { .. } => "E0003",
        TypeError::UnboundState { .. } => "E0004",
        TypeError::NotIndexable { .. } => "E0005",
        TypeError::AmbiguousCase { .. } => "E0006",
        TypeError::NonExhaustiveSwitch { .. } => "E0007",
        TypeError::CircularDeclarations { .. } => "E0008",
        TypeError::UnresolvableDeclarations { .. } => "E0009",
        TypeError::DivisionByZero { .. } => "E0010",
        TypeError::IndexOutOfBounds { .. } => "E0011",
        TypeError::UnmatchedSwitch { .. } => "E0012",
        TypeError::UnreachableCase { .. } => "E0013",
    }
}

fn span_to_range(span: Span) -> Range<usize> {
    span.start as usize..span.end as usize
}

// ── Main rendering function ─────────────────────────────────────────────

/// Render an error into a formatted diagnostic string using ariadne.
pub fn render_diagnostic(error: &TypeError, source: &str, _filename: &str) -> String {
    let config = Config::default().with_color(false);
    let source_len = source.len();

    // Clamp a range to valid source bounds; ariadne needs a non-empty
    // span.
    let clamp = |r: Range<usize>| -> Range<usize> {
        let s = r.start.min(source_len);
        let e = r.end.min(source_len).max(s);
        if s == e {
            s..e.saturating_add(1).min(source_len)
        } else {
            s..e
        }
    };

    let code = error_code(error);
    let span = clamp(span_to_range(error.span()));
    let msg = error.to_string();

    let mut builder = Report::build(ReportKind::Error, span.clone())
        .with_code(code)
        .with_message(&msg)
        .with_config(config);

    match error {
        TypeError::Mismatch {
            expected, found, ..
        } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("expected {expected}, found {found}"))
                    .with_color(Color::Red),
            );
        }
        TypeError::IncompatibleOperands { op, lhs, rhs, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("`{op}` cannot combine {lhs} and {rhs}"))
                    .with_color(Color::Red),
            );
        }
        TypeError::UnboundName {
            name, did_you_mean, ..
        } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("`{name}` is not in scope"))
                    .with_color(Color::Red),
            );
            if let Some(hint) = did_you_mean {
                builder.set_help(format!("a state property `{hint}` exists"));
            }
        }
        TypeError::UnboundState { name, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("no state property named `{name}`"))
                    .with_color(Color::Red),
            );
        }
        TypeError::NotIndexable { ty, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("this has type {ty}"))
                    .with_color(Color::Red),
            );
        }
        TypeError::AmbiguousCase {
            case, candidates, ..
        } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!(
                        "`{case}` could be any of: {}",
                        candidates.join(", ")
                    ))
                    .with_color(Color::Red),
            );
            builder.set_help("narrow the subject so only one enum remains");
        }
        TypeError::NonExhaustiveSwitch { remaining, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("{remaining} is not covered"))
                    .with_color(Color::Red),
            );
            builder.set_help("add a case for the remaining values or a final else");
        }
        TypeError::UnreachableCase { index, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!(
                        "case {index} begins after the subject is exhausted"
                    ))
                    .with_color(Color::Yellow),
            );
            builder.set_help("remove the case or widen an earlier pattern");
        }
        TypeError::CircularDeclarations { chain, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("cycle: {}", chain.join(" -> ")))
                    .with_color(Color::Red),
            );
        }
        TypeError::UnresolvableDeclarations { missing, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("unknown names: {}", missing.join(", ")))
                    .with_color(Color::Red),
            );
        }
        TypeError::DivisionByZero { .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message("the divisor is zero")
                    .with_color(Color::Red),
            );
        }
        TypeError::IndexOutOfBounds { index, len, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("index {index} on a list of length {len}"))
                    .with_color(Color::Red),
            );
        }
        TypeError::UnmatchedSwitch { value, .. } => {
            builder.add_label(
                Label::new(span)
                    .with_message(format!("{value} matched no case"))
                    .with_color(Color::Red),
            );
        }
    }

    let report = builder.finish();

    // Render to buffer without colors.
    let mut buf = Vec::new();
    let cache = Source::from(source);
    report.write(cache, &mut buf).expect("failed to write diagnostic");
    String::from_utf8(buf).expect("diagnostic output should be valid UTF-8")
}
