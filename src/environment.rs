//! Lexically nested name bindings for the tree-walking evaluator.
//!
//! Mirrors the classic `Environment{store, outer}` shape, but backed by `Rc<RefCell<_>>` instead
//! of an unsafe global store: closures capture an `Environment` by cloning the `Rc`, which is
//! exactly how the evaluator needs function values to share (and, via `set`, observe mutations to)
//! their defining scope.

use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

struct Inner {
    store: HashMap<String, Value>,
    outer: Option<Environment>,
}

/// A cheaply-cloneable handle to a lexical scope. Cloning an `Environment` shares the same
/// underlying bindings; it does not copy them.
#[derive(Clone)]
pub struct Environment(Rc<RefCell<Inner>>);

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Environment")
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment(Rc::new(RefCell::new(Inner {
            store: HashMap::new(),
            outer: None,
        })))
    }

    /// Creates a child scope whose lookups fall through to `outer` on miss.
    pub fn new_enclosed(outer: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Inner {
            store: HashMap::new(),
            outer: Some(outer.clone()),
        })))
    }

    /// Looks up `name`, walking outward through enclosing scopes.
    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.0.borrow();
        if let Some(v) = inner.store.get(name) {
            return Some(v.clone());
        }
        inner.outer.as_ref().and_then(|outer| outer.get(name))
    }

    /// Binds `name` to `value` in this scope only, shadowing any outer binding of the same name.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().store.insert(name.into(), value);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn get_and_set_in_same_scope() {
        let env = Environment::new();
        env.set("x", Value::Integer(5));
        assert_eq!(Some(Value::Integer(5)), env.get("x"));
    }

    #[test]
    fn enclosed_scope_sees_outer_bindings() {
        let outer = Environment::new();
        outer.set("x", Value::Integer(1));
        let inner = Environment::new_enclosed(&outer);
        assert_eq!(Some(Value::Integer(1)), inner.get("x"));
    }

    #[test]
    fn inner_binding_shadows_outer_without_mutating_it() {
        let outer = Environment::new();
        outer.set("x", Value::Integer(1));
        let inner = Environment::new_enclosed(&outer);
        inner.set("x", Value::Integer(2));
        assert_eq!(Some(Value::Integer(2)), inner.get("x"));
        assert_eq!(Some(Value::Integer(1)), outer.get("x"));
    }

    #[test]
    fn unknown_name_is_none() {
        let env = Environment::new();
        assert_eq!(None, env.get("missing"));
    }
}
