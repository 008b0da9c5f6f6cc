//! Compiler-side lexical scope tracking: maps names to `(scope, index)` pairs and resolves free
//! variables across nested function scopes.

use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// The symbol table's own enclosing function, resolved when a function literal refers to the
    /// name it was bound to by an enclosing `let` — used by `OpCurrentClosure` for recursion.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Default)]
struct Inner {
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    outer: Option<SymbolTable>,
    /// Free variables captured from an enclosing scope, in the order they were first resolved.
    /// Each entry is the `Symbol` as it was found in the *enclosing* table.
    free_symbols: Vec<Symbol>,
}

/// A cheaply-cloneable handle to one lexical scope of the compiler's symbol table.
#[derive(Debug, Clone)]
pub struct SymbolTable(Rc<std::cell::RefCell<Inner>>);

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable(Rc::new(std::cell::RefCell::new(Inner::default())))
    }

    pub fn new_enclosed(outer: &SymbolTable) -> Self {
        let table = SymbolTable::new();
        table.0.borrow_mut().outer = Some(outer.clone());
        table
    }

    /// The enclosing scope, if any. Used by the compiler to restore its active symbol table when
    /// leaving a function-literal's compilation scope.
    pub fn outer(&self) -> Option<SymbolTable> {
        self.0.borrow().outer.clone()
    }

    pub fn define(&self, name: &str) -> Symbol {
        let mut inner = self.0.borrow_mut();
        let scope = if inner.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: inner.num_definitions,
        };
        inner.num_definitions += 1;
        inner.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.0
            .borrow_mut()
            .store
            .insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Binds `name` as a reference to the symbol table's own enclosing function, so a named
    /// function literal can call itself recursively.
    pub fn define_function_name(&self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.0
            .borrow_mut()
            .store
            .insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&self, original: Symbol) -> Symbol {
        let mut inner = self.0.borrow_mut();
        inner.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: inner.free_symbols.len() - 1,
        };
        inner.store.insert(original.name, symbol.clone());
        symbol
    }

    /// Resolves `name`, walking outward through enclosing scopes. A name found in an enclosing
    /// *function* scope (not the global scope) is captured as a free variable in every scope
    /// between here and there.
    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.0.borrow().store.get(name).cloned() {
            return Some(symbol);
        }

        let outer = self.0.borrow().outer.clone()?;
        let symbol = outer.resolve(name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.define_free(symbol)),
        }
    }

    /// The free variables captured by this scope, in capture order — parallel to the `OpGetFree`
    /// indices the compiler emits inside this scope's body.
    pub fn free_symbols(&self) -> Vec<Symbol> {
        self.0.borrow().free_symbols.clone()
    }

    pub fn num_definitions(&self) -> usize {
        self.0.borrow().num_definitions
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn define_resolve_global() {
        let global = SymbolTable::new();
        let a = global.define("a");
        let b = global.define("b");

        assert_eq!(SymbolScope::Global, a.scope);
        assert_eq!(0, a.index);
        assert_eq!(SymbolScope::Global, b.scope);
        assert_eq!(1, b.index);

        assert_eq!(Some(a), global.resolve("a"));
        assert_eq!(Some(b), global.resolve("b"));
    }

    #[test]
    fn resolve_local() {
        let global = SymbolTable::new();
        global.define("a");
        let local = SymbolTable::new_enclosed(&global);
        local.define("b");

        assert_eq!(SymbolScope::Global, local.resolve("a").unwrap().scope);
        assert_eq!(SymbolScope::Local, local.resolve("b").unwrap().scope);
    }

    #[test]
    fn resolve_nested_local() {
        let global = SymbolTable::new();
        global.define("a");
        let first = SymbolTable::new_enclosed(&global);
        first.define("b");
        let second = SymbolTable::new_enclosed(&first);
        second.define("c");

        assert_eq!(SymbolScope::Global, second.resolve("a").unwrap().scope);
        assert_eq!(SymbolScope::Free, second.resolve("b").unwrap().scope);
        assert_eq!(SymbolScope::Local, second.resolve("c").unwrap().scope);
    }

    #[test]
    fn resolve_builtin() {
        let global = SymbolTable::new();
        global.define_builtin(0, "len");
        let local = SymbolTable::new_enclosed(&global);

        assert_eq!(SymbolScope::Builtin, local.resolve("len").unwrap().scope);
    }

    #[test]
    fn resolve_unresolvable_free_variable_is_none() {
        let global = SymbolTable::new();
        let local = SymbolTable::new_enclosed(&global);
        assert_eq!(None, local.resolve("missing"));
    }

    #[test]
    fn function_name_resolves_within_its_own_body() {
        let global = SymbolTable::new();
        let local = SymbolTable::new_enclosed(&global);
        local.define_function_name("counter");

        let symbol = local.resolve("counter").unwrap();
        assert_eq!(SymbolScope::Function, symbol.scope);
    }
}
