use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use crate::utils::prelude::{Source, SrcSpan};

use super::prelude::Value;

/// One level of name bindings. Lookups walk up the parent chain; writes
/// always land in the table they are made on.
#[derive(Debug, Default)]
pub struct SymbolTable {
    bindings: RwLock<HashMap<String, Value>>,
    pub parent: Option<Arc<SymbolTable>>,
}

impl SymbolTable {
    pub fn new(parent: Option<Arc<SymbolTable>>) -> Arc<Self> {
        Arc::new(Self {
            bindings: RwLock::new(HashMap::new()),
            parent,
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self.get_local(name) {
            Some(value) => Some(value),
            None => self.parent.as_ref().and_then(|parent| parent.get(name)),
        }
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.bindings.read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.bindings.read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn set(&self, name: &str, value: Value) {
        self.bindings.write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.bindings.write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn root(self: &Arc<Self>) -> Arc<SymbolTable> {
        let mut table = self.clone();
        while let Some(parent) = table.parent.clone() {
            table = parent;
        }
        table
    }

    pub fn ancestor(self: &Arc<Self>, distance: usize) -> Option<Arc<SymbolTable>> {
        let mut table = self.clone();
        for _ in 0..distance {
            table = table.parent.clone()?;
        }
        Some(table)
    }

    /// Distance to the nearest strict ancestor binding `name`.
    pub fn find_outer(&self, name: &str) -> Option<usize> {
        let mut distance = 1;
        let mut table = self.parent.as_ref();

        while let Some(current) = table {
            if current.contains_local(name) {
                return Some(distance);
            }
            distance += 1;
            table = current.parent.as_ref();
        }
        None
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        let bindings = self.bindings.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries = bindings.iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect::<Vec<_>>();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

/// Where a name declared with `using` reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local,
    Global,
    /// That many tables up from the current scope.
    Outer(usize),
}

/// The state of one running module, function call or namespace body.
#[derive(Debug)]
pub struct Context {
    pub display_name: String,
    /// The context that started this one. Only used for tracebacks.
    pub parent: Option<Arc<Context>>,
    /// Where this context was entered from, inside the parent's source.
    pub entry_span: SrcSpan,
    pub source: Arc<Source>,
    pub scope: Arc<SymbolTable>,
    /// Mirrors every assignment; looked up after `scope` misses.
    pub private_scope: Arc<SymbolTable>,
    escapes: RwLock<HashMap<String, Binding>>,
}

impl Context {
    /// A module level context. Its scope is the shared global table.
    pub fn module(
        display_name: impl Into<String>,
        source: Arc<Source>,
        globals: Arc<SymbolTable>,
        parent: Option<Arc<Context>>,
        entry_span: SrcSpan,
    ) -> Arc<Self> {
        Arc::new(Self {
            display_name: display_name.into(),
            parent,
            entry_span,
            source,
            scope: globals,
            private_scope: SymbolTable::new(None),
            escapes: RwLock::new(HashMap::new()),
        })
    }

    /// A context nested lexically inside `lexical`, entered from `parent`.
    pub fn nested(
        display_name: impl Into<String>,
        lexical: &Context,
        parent: Option<Arc<Context>>,
        entry_span: SrcSpan,
    ) -> Arc<Self> {
        Arc::new(Self {
            display_name: display_name.into(),
            parent,
            entry_span,
            source: lexical.source.clone(),
            scope: SymbolTable::new(Some(lexical.scope.clone())),
            private_scope: SymbolTable::new(Some(lexical.private_scope.clone())),
            escapes: RwLock::new(HashMap::new()),
        })
    }

    pub fn is_global(&self) -> bool {
        self.scope.parent.is_none()
    }

    pub fn binding(&self, name: &str) -> Binding {
        self.escapes.read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(Binding::Local)
    }

    fn target(&self, name: &str) -> Arc<SymbolTable> {
        match self.binding(name) {
            Binding::Local => self.scope.clone(),
            Binding::Global => self.scope.root(),
            Binding::Outer(distance) => self.scope.ancestor(distance)
                .unwrap_or_else(|| self.scope.root()),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        match self.binding(name) {
            Binding::Local => self.scope.get(name)
                .or_else(|| self.private_scope.get(name)),
            _ => self.target(name).get(name),
        }
    }

    pub fn assign(&self, name: &str, value: Value) {
        self.target(name).set(name, value.clone());
        self.private_scope.set(name, value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        let removed = self.target(name).remove(name);
        self.private_scope.remove(name);
        removed
    }

    /// Registers `using name` (global) or `using parent name` (nearest
    /// enclosing binding). The name has to exist already.
    pub fn declare_escape(&self, name: &str, parent: bool) -> Result<Binding, String> {
        if self.is_global() {
            return Err("'using' cannot be used at the global level".into());
        }

        let binding = if parent {
            self.scope.find_outer(name)
                .map(Binding::Outer)
                .ok_or_else(|| format!("No binding for nonlocal variable '{name}' found"))?
        } else if self.scope.root().contains_local(name) {
            Binding::Global
        } else {
            return Err(format!("'{name}' is not defined in the global scope"));
        };

        self.escapes.write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), binding);

        Ok(binding)
    }
}
