//! Type and value environments.
//!
//! Both environments are append-only parent/child chains: assuming a
//! branch builds a cheap child layer over the parent, and dropping the
//! child discards every fact the branch assumed. Nothing ever mutates a
//! parent through a child, so two branches narrowing the same binding can
//! never interfere -- safe by construction rather than by discipline.
//!
//! Lookup is by [`BindingId`]; the name index exists only for ordering
//! (enclosing-scope visibility) and for did-you-mean hints.

use rustc_hash::{FxHashMap, FxHashSet};

use rill_common::BindingId;

use crate::ty::Ty;
use crate::value::Value;

/// The facts one branch learned: binding id to refined type.
pub type Facts = FxHashMap<BindingId, Ty>;

/// A scoped mapping from bindings to their currently known types.
#[derive(Debug, Default)]
pub struct TypeEnv<'a> {
    parent: Option<&'a TypeEnv<'a>>,
    bindings: FxHashMap<BindingId, Ty>,
    names: FxHashMap<String, BindingId>,
    state: FxHashMap<String, Ty>,
    this_ty: Option<Ty>,
}

impl<'a> TypeEnv<'a> {
    pub fn new() -> TypeEnv<'static> {
        TypeEnv::default()
    }

    /// An empty child layer shadowing `self`.
    pub fn child(&'a self) -> TypeEnv<'a> {
        TypeEnv {
            parent: Some(self),
            ..TypeEnv::default()
        }
    }

    /// A child layer pre-populated with branch facts.
    pub fn with_facts(&'a self, facts: Facts) -> TypeEnv<'a> {
        TypeEnv {
            parent: Some(self),
            bindings: facts,
            ..TypeEnv::default()
        }
    }

    /// Declare a named binding in this layer.
    pub fn bind(&mut self, id: BindingId, name: impl Into<String>, ty: Ty) {
        let name = name.into();
        self.names.insert(name, id);
        self.bindings.insert(id, ty);
    }

    /// Refine an existing binding in this layer without declaring a name.
    pub fn refine(&mut self, id: BindingId, ty: Ty) {
        self.bindings.insert(id, ty);
    }

    pub fn ty_of(&self, id: BindingId) -> Option<&Ty> {
        match self.bindings.get(&id) {
            Some(ty) => Some(ty),
            None => self.parent.and_then(|p| p.ty_of(id)),
        }
    }

    /// Resolve a name to its nearest binding, innermost layer first.
    pub fn lookup_name(&self, name: &str) -> Option<BindingId> {
        match self.names.get(name) {
            Some(id) => Some(*id),
            None => self.parent.and_then(|p| p.lookup_name(name)),
        }
    }

    /// All names visible from this environment, used as the enclosing
    /// scope when ordering a declaration block.
    pub fn visible_names(&self) -> FxHashSet<String> {
        let mut out = match self.parent {
            Some(p) => p.visible_names(),
            None => FxHashSet::default(),
        };
        out.extend(self.names.keys().cloned());
        out
    }

    pub fn set_state(&mut self, name: impl Into<String>, ty: Ty) {
        self.state.insert(name.into(), ty);
    }

    pub fn state_ty(&self, name: &str) -> Option<&Ty> {
        match self.state.get(name) {
            Some(ty) => Some(ty),
            None => self.parent.and_then(|p| p.state_ty(name)),
        }
    }

    pub fn set_this(&mut self, ty: Ty) {
        self.this_ty = Some(ty);
    }

    pub fn this_ty(&self) -> Option<&Ty> {
        match &self.this_ty {
            Some(ty) => Some(ty),
            None => self.parent.and_then(|p| p.this_ty()),
        }
    }
}

/// A scoped mapping from bindings to runtime values, mirroring [`TypeEnv`].
/// A failed evaluation simply drops the in-progress child layer; parents
/// are never left half-updated.
#[derive(Debug, Default)]
pub struct Env<'a> {
    parent: Option<&'a Env<'a>>,
    bindings: FxHashMap<BindingId, Value>,
    state: FxHashMap<String, Value>,
    this_val: Option<Value>,
}

impl<'a> Env<'a> {
    pub fn new() -> Env<'static> {
        Env::default()
    }

    pub fn child(&'a self) -> Env<'a> {
        Env {
            parent: Some(self),
            ..Env::default()
        }
    }

    pub fn bind(&mut self, id: BindingId, value: Value) {
        self.bindings.insert(id, value);
    }

    pub fn value_of(&self, id: BindingId) -> Option<&Value> {
        match self.bindings.get(&id) {
            Some(v) => Some(v),
            None => self.parent.and_then(|p| p.value_of(id)),
        }
    }

    pub fn set_state(&mut self, name: impl Into<String>, value: Value) {
        self.state.insert(name.into(), value);
    }

    pub fn state_value(&self, name: &str) -> Option<&Value> {
        match self.state.get(name) {
            Some(v) => Some(v),
            None => self.parent.and_then(|p| p.state_value(name)),
        }
    }

    pub fn set_this(&mut self, value: Value) {
        self.this_val = Some(value);
    }

    pub fn this_value(&self) -> Option<&Value> {
        match &self.this_val {
            Some(v) => Some(v),
            None => self.parent.and_then(|p| p.this_value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_shadows_parent() {
        let mut root = TypeEnv::new();
        root.bind(BindingId(0), "x", Ty::int());

        let mut facts = Facts::default();
        facts.insert(BindingId(0), Ty::int_exact(3));
        let child = root.with_facts(facts);

        assert_eq!(child.ty_of(BindingId(0)), Some(&Ty::int_exact(3)));
        // The parent is untouched.
        assert_eq!(root.ty_of(BindingId(0)), Some(&Ty::int()));
    }

    #[test]
    fn sibling_branches_do_not_interfere() {
        let mut root = TypeEnv::new();
        root.bind(BindingId(0), "x", Ty::int());

        let mut a = root.child();
        a.refine(BindingId(0), Ty::int_exact(1));
        let mut b = root.child();
        b.refine(BindingId(0), Ty::int_exact(2));

        assert_eq!(a.ty_of(BindingId(0)), Some(&Ty::int_exact(1)));
        assert_eq!(b.ty_of(BindingId(0)), Some(&Ty::int_exact(2)));
    }

    #[test]
    fn name_lookup_is_innermost_first() {
        let mut root = TypeEnv::new();
        root.bind(BindingId(0), "x", Ty::int());
        let mut child = root.child();
        child.bind(BindingId(1), "x", Ty::str());

        assert_eq!(child.lookup_name("x"), Some(BindingId(1)));
        assert_eq!(root.lookup_name("x"), Some(BindingId(0)));
    }

    #[test]
    fn state_and_this_fall_through() {
        let mut root = TypeEnv::new();
        root.set_state("count", Ty::int());
        root.set_this(Ty::str());
        let child = root.child();
        assert_eq!(child.state_ty("count"), Some(&Ty::int()));
        assert_eq!(child.this_ty(), Some(&Ty::str()));
    }

    #[test]
    fn value_env_child_discards_on_drop() {
        let mut root = Env::new();
        root.bind(BindingId(0), Value::Int(1));
        {
            let mut child = root.child();
            child.bind(BindingId(1), Value::Int(2));
            assert_eq!(child.value_of(BindingId(0)), Some(&Value::Int(1)));
        }
        assert_eq!(root.value_of(BindingId(1)), None);
    }
}
