//! Lexical scopes.
//!
//! A [`Context`] is a node in a parent-linked tree of scopes.  Handles are
//! cheap to clone and share the node, so a function keeps the scope it was
//! defined in alive for as long as the function exists.
//!
//! Whether a scope lies inside a function body is fixed when it is created:
//! children of a function scope inherit the flag.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::symbol::Symbol;

use super::value::Value;

struct Scope {
    parent: Option<Context>,
    refs: RwLock<IndexMap<Symbol, Value>>,
    is_function: bool,
}

/// Shared handle to a scope node.
#[derive(Clone)]
pub struct Context(Arc<Scope>);

impl Context {
    /// A scope with no parent.
    pub fn root() -> Self {
        Context(Arc::new(Scope { parent: None, refs: RwLock::default(), is_function: false }))
    }

    fn child(&self, is_function: bool) -> Self {
        Context(Arc::new(Scope {
            parent: Some(self.clone()),
            refs: RwLock::default(),
            is_function,
        }))
    }

    /// A nested block scope.
    pub fn new_child(&self) -> Self {
        self.child(self.0.is_function)
    }

    /// The scope a function body runs in.
    pub fn new_function_child(&self) -> Self {
        self.child(true)
    }

    pub fn parent(&self) -> Option<&Context> {
        self.0.parent.as_ref()
    }

    pub fn is_inside_function(&self) -> bool {
        self.0.is_function
    }

    /// `true` if `sym` is not bound in this scope's own bindings.
    /// Ancestors are not consulted.
    pub fn can_bind(&self, sym: &Symbol) -> bool {
        !self.0.refs.read().unwrap_or_else(PoisonError::into_inner).contains_key(sym)
    }

    /// Bind `sym` unless this scope already binds it.  Returns whether the
    /// binding was made.
    pub fn bind(&self, sym: Symbol, value: Value) -> bool {
        let mut refs = self.0.refs.write().unwrap_or_else(PoisonError::into_inner);
        if refs.contains_key(&sym) {
            return false;
        }
        refs.insert(sym, value);
        true
    }

    /// Bind or overwrite `sym` in this scope.
    pub fn set(&self, sym: Symbol, value: Value) {
        self.0.refs.write().unwrap_or_else(PoisonError::into_inner).insert(sym, value);
    }

    /// Look `name` up here, then in each ancestor.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            if let Some(v) = ctx.0.refs.read().unwrap_or_else(PoisonError::into_inner).get(name) {
                return Some(v.clone());
            }
            scope = ctx.parent();
        }
        None
    }

    /// Names bound directly in this scope, in binding order.
    pub fn local_names(&self) -> Vec<Symbol> {
        self.0.refs.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect()
    }

    pub fn same_scope(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("names", &self.local_names())
            .field("is_function", &self.0.is_function)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    #[test]
    fn bind_refuses_own_duplicates_only() {
        let root = Context::root();
        assert!(root.bind(sym("a"), Value::Number(1.0)));
        assert!(!root.bind(sym("a"), Value::Number(2.0)));
        assert_eq!(root.get("a"), Some(Value::Number(1.0)));

        let child = root.new_child();
        assert!(child.can_bind(&sym("a")));
        assert!(child.bind(sym("a"), Value::Number(3.0)));
        assert_eq!(child.get("a"), Some(Value::Number(3.0)));
        assert_eq!(root.get("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn set_always_writes_locally() {
        let root = Context::root();
        root.set(sym("x"), Value::from("outer"));
        let child = root.new_child();
        child.set(sym("x"), Value::from("inner"));
        child.set(sym("x"), Value::from("again"));
        assert_eq!(child.get("x"), Some(Value::from("again")));
        assert_eq!(root.get("x"), Some(Value::from("outer")));
    }

    #[test]
    fn lookup_walks_parents() {
        let root = Context::root();
        root.set(sym("deep"), Value::Number(1.0));
        let leaf = root.new_child().new_child().new_child();
        assert_eq!(leaf.get("deep"), Some(Value::Number(1.0)));
        assert_eq!(leaf.get("missing"), None);
    }

    #[test]
    fn function_flag_is_inherited() {
        let root = Context::root();
        assert!(!root.new_child().is_inside_function());
        let f = root.new_function_child();
        assert!(f.is_inside_function());
        assert!(f.new_child().new_child().is_inside_function());
    }

    #[test]
    fn clones_share_bindings() {
        let a = Context::root();
        let b = a.clone();
        a.set(sym("k"), Value::from(true));
        assert!(b.get("k").is_some());
        assert!(a.same_scope(&b));
        assert!(!a.same_scope(&a.new_child()));
    }

    #[test]
    fn local_names_keep_binding_order() {
        let ctx = Context::root();
        for n in ["z", "a", "m"] {
            ctx.set(sym(n), Value::Nothing);
        }
        let names: Vec<String> = ctx.local_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, ["z", "a", "m"]);
    }
}
