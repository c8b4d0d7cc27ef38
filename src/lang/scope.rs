//! Variable scopes: module globals, function frames and comprehension
//! frames.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::lang::ast::FunctionDef;
use crate::lang::value::Value;

/// One level of the scope chain. Function frames carry their definition so
/// lookups can tell a local that is not yet assigned from a free variable.
#[derive(Debug)]
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    pub parent: Option<Rc<Scope>>,
    pub def: Option<Rc<FunctionDef>>,
}

impl Scope {
    pub fn function(def: Rc<FunctionDef>, parent: Option<Rc<Scope>>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent,
            def: Some(def),
        })
    }

    pub fn comprehension(parent: Option<Rc<Scope>>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent,
            def: None,
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().remove(name)
    }

    pub fn declares_local(&self, name: &str) -> bool {
        match &self.def {
            Some(def) => def.locals.iter().any(|n| n == name),
            None => self.vars.borrow().contains_key(name),
        }
    }

    pub fn declares_global(&self, name: &str) -> bool {
        self.def
            .as_ref()
            .is_some_and(|def| def.globals.iter().any(|n| n == name))
    }

    pub fn declares_nonlocal(&self, name: &str) -> bool {
        self.def
            .as_ref()
            .is_some_and(|def| def.nonlocals.iter().any(|n| n == name))
    }

    /// Drops every binding. Used at teardown to break closure cycles.
    pub fn clear(&self) {
        let drained: Vec<Value> = self.vars.borrow_mut().drain().map(|(_, v)| v).collect();
        drop(drained);
    }
}

/// Module-level namespace.
#[derive(Debug, Default)]
pub struct Globals {
    vars: RefCell<HashMap<String, Value>>,
}

impl Globals {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().remove(name)
    }

    pub fn clear(&self) {
        let drained: Vec<Value> = self.vars.borrow_mut().drain().map(|(_, v)| v).collect();
        drop(drained);
    }
}
