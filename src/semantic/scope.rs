//! Lexical scopes.
//!
//! Scopes form a tree owned by a single arena; each scope stores its entries
//! and a non-owning parent index. Lookup is an iterative walk toward the
//! root. The resolver records which scope each syntax node introduced so its
//! second pass re-enters the same scope instances.

use rustc_hash::FxHashMap;

use super::symbol::SymbolId;
use crate::error::CompileError;

/// Dense index of a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct Scope {
    entries: FxHashMap<String, SymbolId>,
    parent: Option<ScopeId>,
}

#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            entries: FxHashMap::default(),
            parent,
        });
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.index()].parent
    }

    /// Declare a name in a scope. A clash with an existing entry is fatal;
    /// overload merging is the resolver's job and goes through [`rebind`].
    ///
    /// [`rebind`]: ScopeArena::rebind
    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        symbol: SymbolId,
    ) -> Result<(), CompileError> {
        let entries = &mut self.scopes[scope.index()].entries;
        if entries.contains_key(name) {
            return Err(CompileError::DuplicateSymbol {
                name: name.to_string(),
            });
        }
        entries.insert(name.to_string(), symbol);
        Ok(())
    }

    /// Point an existing entry at a different symbol (function -> overload
    /// set promotion).
    pub fn rebind(&mut self, scope: ScopeId, name: &str, symbol: SymbolId) {
        self.scopes[scope.index()]
            .entries
            .insert(name.to_string(), symbol);
    }

    /// Look up a name in this scope only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.index()].entries.get(name).copied()
    }

    /// Look up a name walking outward to the root.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(found) = self.lookup_local(id, name) {
                return Some(found);
            }
            current = self.parent(id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_to_parent() {
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc(None);
        let child = scopes.alloc(Some(root));
        scopes.declare(root, "x", SymbolId(0)).unwrap();

        assert_eq!(scopes.lookup(child, "x"), Some(SymbolId(0)));
        assert_eq!(scopes.lookup_local(child, "x"), None);
    }

    #[test]
    fn inner_declaration_shadows_outer() {
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc(None);
        let child = scopes.alloc(Some(root));
        scopes.declare(root, "x", SymbolId(0)).unwrap();
        scopes.declare(child, "x", SymbolId(1)).unwrap();

        assert_eq!(scopes.lookup(child, "x"), Some(SymbolId(1)));
        assert_eq!(scopes.lookup(root, "x"), Some(SymbolId(0)));
    }

    #[test]
    fn duplicate_in_same_scope_is_fatal() {
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc(None);
        scopes.declare(root, "x", SymbolId(0)).unwrap();

        let err = scopes.declare(root, "x", SymbolId(1)).unwrap_err();
        assert_eq!(
            err,
            CompileError::DuplicateSymbol {
                name: "x".to_string()
            }
        );
    }

    #[test]
    fn unresolved_name_is_none() {
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc(None);
        assert_eq!(scopes.lookup(root, "missing"), None);
    }
}
