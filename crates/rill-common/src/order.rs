//! Declaration ordering for mutually referencing bindings.
//!
//! A block of declarations (`let` bindings, class statics, module
//! definitions) may reference each other in any authored order. Before the
//! block is checked or evaluated, this pass linearizes the declarations so
//! every one comes after the names it depends on.
//!
//! The pass works in rounds: each round resolves every declaration whose
//! remaining local dependencies are all already resolved, scanning in
//! authored order so ties preserve the author's layout. A round that
//! resolves nothing means the block cannot be ordered, and the stall is
//! diagnosed as one of two distinct failures:
//!
//! - a dependency **cycle** among the declarations (reported as the full
//!   chain of names, first name repeated at the end), or
//! - a dependency on a name that exists nowhere -- not among the local
//!   declarations and not in any enclosing scope (reported as the minimal
//!   set of missing names).
//!
//! A name available in an enclosing scope counts as resolved unless a local
//! declaration shadows it; a shadowed name must wait for the local one.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

/// One declaration to be ordered: its name and the free names its
/// initializer references.
#[derive(Debug, Clone)]
pub struct DeclInput {
    pub name: String,
    pub references: Vec<String>,
}

impl DeclInput {
    pub fn new(name: impl Into<String>, references: &[&str]) -> Self {
        DeclInput {
            name: name.into(),
            references: references.iter().map(|r| (*r).to_string()).collect(),
        }
    }
}

/// Why a block of declarations could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The declarations reference each other in a loop. `chain` lists the
    /// names along the loop, ending with a repeat of the first.
    Cycle { chain: Vec<String> },
    /// One or more declarations reference names that no scope provides.
    /// `names` are the stuck declarations, `missing` the unknown names.
    Unresolvable {
        names: Vec<String>,
        missing: Vec<String>,
    },
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::Cycle { chain } => {
                write!(f, "circular declarations: {}", chain.join(" -> "))
            }
            OrderError::Unresolvable { names, missing } => write!(
                f,
                "declarations {} depend on unknown names {}",
                names.join(", "),
                missing.join(", ")
            ),
        }
    }
}

impl std::error::Error for OrderError {}

/// Order a block of declarations by their local dependencies.
///
/// Returns the indices of `decls` in evaluation order. `enclosing` holds
/// the names visible from outer scopes; a reference to one of those is
/// considered satisfied unless a local declaration shadows it.
pub fn order_declarations(
    decls: &[DeclInput],
    enclosing: &FxHashSet<String>,
) -> Result<Vec<usize>, OrderError> {
    let local: FxHashMap<&str, usize> = decls
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.as_str(), i))
        .collect();

    let mut resolved = vec![false; decls.len()];
    let mut order = Vec::with_capacity(decls.len());

    loop {
        let mut progressed = false;
        for (i, decl) in decls.iter().enumerate() {
            if resolved[i] {
                continue;
            }
            // A reference blocks while it names an unresolved local
            // declaration, or a name no scope provides at all. Local names
            // shadow enclosing ones, so the lookup checks `local` first.
            let blocked = decl.references.iter().any(|r| match local.get(r.as_str()) {
                Some(&j) => !resolved[j],
                None => !enclosing.contains(r),
            });
            if !blocked {
                resolved[i] = true;
                order.push(i);
                progressed = true;
            }
        }
        if order.len() == decls.len() {
            return Ok(order);
        }
        if !progressed {
            return Err(diagnose_stall(decls, &local, &resolved, enclosing));
        }
    }
}

/// Decide whether a stalled ordering pass is a cycle or a reference to a
/// name no scope provides. Missing names take priority: a declaration that
/// waits on a nonexistent name would stall even without any cycle.
fn diagnose_stall(
    decls: &[DeclInput],
    local: &FxHashMap<&str, usize>,
    resolved: &[bool],
    enclosing: &FxHashSet<String>,
) -> OrderError {
    let mut stuck_names = Vec::new();
    let mut missing = Vec::new();
    for (i, decl) in decls.iter().enumerate() {
        if resolved[i] {
            continue;
        }
        let unknown: Vec<&String> = decl
            .references
            .iter()
            .filter(|r| !local.contains_key(r.as_str()) && !enclosing.contains(*r))
            .collect();
        if !unknown.is_empty() {
            stuck_names.push(decl.name.clone());
            for name in unknown {
                if !missing.contains(name) {
                    missing.push(name.clone());
                }
            }
        }
    }
    if !missing.is_empty() {
        return OrderError::Unresolvable {
            names: stuck_names,
            missing,
        };
    }

    // Every stalled declaration waits only on other stalled locals, so a
    // cycle must exist. Walk edges until a declaration repeats.
    let start = (0..decls.len())
        .find(|&i| !resolved[i])
        .unwrap_or_default();
    let mut seen = vec![false; decls.len()];
    let mut path: Vec<usize> = Vec::new();
    let mut current = start;
    loop {
        if seen[current] {
            let begin = path.iter().position(|&i| i == current).unwrap_or(0);
            let mut chain: Vec<String> =
                path[begin..].iter().map(|&i| decls[i].name.clone()).collect();
            chain.push(decls[current].name.clone());
            return OrderError::Cycle { chain };
        }
        seen[current] = true;
        path.push(current);
        // Follow the first edge into another stalled declaration.
        let next = decls[current]
            .references
            .iter()
            .filter_map(|r| local.get(r.as_str()).copied())
            .find(|&j| !resolved[j]);
        match next {
            Some(j) => current = j,
            None => {
                // Unreachable given the stall, but a truncated chain beats
                // a panic inside a diagnostic.
                let chain = path.iter().map(|&i| decls[i].name.clone()).collect();
                return OrderError::Cycle { chain };
            }
        }
    }
}
