//! Shared types for the Rill semantic engine.
//!
//! Holds the pieces every other crate agrees on: byte-offset [`Span`]s,
//! [`BindingId`]s handed out by the binder, and the declaration ordering
//! pass that linearizes mutually referencing bindings before checking.

pub mod order;
pub mod span;

pub use order::{order_declarations, DeclInput, OrderError};
pub use span::{LineIndex, Span};

use serde::Serialize;

/// A unique identifier for a declared binding.
///
/// Ids are assigned by the binder, one per declaration site. The engine
/// compares references by id, never by name, so shadowed names cannot
/// collide with their shadows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BindingId(pub u32);
