//! Symbols and symbol tables.
//!
//! Tables form a tree with upward parent references. Per the arena note in
//! spec §9 ("Symbol-table parent pointers ... use arena allocation with
//! indices, not owning references"), the tree lives in one [`SymbolArena`]
//! and AST nodes that introduce scopes record only a [`SymbolTableId`].

use std::collections::HashMap;

use crate::ast::NodeId;
use crate::error::CompileError;

pub type SymbolTableId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
}

/// What `Symbol::info` holds, depending on `kind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolInfo {
    /// 0-based offset: parameter position in the declaration list, or
    /// variable position within the owning `Body`.
    Offset(usize),
    /// The `DeclarationFunction`/`Function` AST node this symbol names.
    Function(NodeId),
}

impl SymbolInfo {
    pub fn offset(&self) -> Option<usize> {
        match self {
            SymbolInfo::Offset(o) => Some(*o),
            SymbolInfo::Function(_) => None,
        }
    }

    pub fn function_node(&self) -> Option<NodeId> {
        match self {
            SymbolInfo::Function(n) => Some(*n),
            SymbolInfo::Offset(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub ty: String,
    pub kind: SymbolKind,
    pub info: SymbolInfo,
    /// Virtual register currently caching this symbol's value. Set only by
    /// the register code generator (§4.5), and only for non-escaping
    /// locals; `None` otherwise.
    pub sr: Option<u32>,
    /// True iff some use or assignment of this symbol occurs in a scope
    /// strictly nested below its declaring scope (§4.2). The `for`
    /// induction variable is unconditionally `true`.
    pub escaping: bool,
}

impl Symbol {
    pub fn new(ty: impl Into<String>, kind: SymbolKind, info: SymbolInfo) -> Symbol {
        Symbol {
            ty: ty.into(),
            kind,
            info,
            sr: None,
            escaping: false,
        }
    }
}

/// One scope: a name → symbol map, a parent link, and a nesting level
/// (root is 0).
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub parent: Option<SymbolTableId>,
    pub level: usize,
    symbols: HashMap<String, Symbol>,
    /// Declaration order, preserved for deterministic iteration (debug
    /// dumps, graph construction).
    order: Vec<String>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn iter_in_order(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.order.iter().map(move |n| (n.as_str(), &self.symbols[n]))
    }
}

/// Owns every [`SymbolTable`] produced while collecting symbols for one
/// compile run.
#[derive(Debug, Default)]
pub struct SymbolArena {
    tables: Vec<SymbolTable>,
}

impl SymbolArena {
    pub fn new() -> SymbolArena {
        SymbolArena { tables: Vec::new() }
    }

    pub fn new_root(&mut self) -> SymbolTableId {
        self.tables.push(SymbolTable {
            parent: None,
            level: 0,
            symbols: HashMap::new(),
            order: Vec::new(),
        });
        self.tables.len() - 1
    }

    pub fn new_child(&mut self, parent: SymbolTableId) -> SymbolTableId {
        let level = self.tables[parent].level + 1;
        self.tables.push(SymbolTable {
            parent: Some(parent),
            level,
            symbols: HashMap::new(),
            order: Vec::new(),
        });
        self.tables.len() - 1
    }

    pub fn table(&self, id: SymbolTableId) -> &SymbolTable {
        &self.tables[id]
    }

    pub fn table_mut(&mut self, id: SymbolTableId) -> &mut SymbolTable {
        &mut self.tables[id]
    }

    /// Insert `sym` under `name` in `table`. Fails with a *Redeclaration*
    /// error if `name` is already bound in that exact table (spec §4.2).
    pub fn insert(
        &mut self,
        table: SymbolTableId,
        name: &str,
        sym: Symbol,
        lineno: usize,
    ) -> Result<(), CompileError> {
        let t = &mut self.tables[table];
        if t.symbols.contains_key(name) {
            // Spec §8's N1 scenario pins this message to the word "function"
            // even when the redeclared name is a plain `int x; int x;`
            // variable pair — the reference compiler's redeclaration message
            // hardcodes that word regardless of the symbol's actual kind, so
            // this is reproduced verbatim rather than "corrected" to vary by
            // `sym.kind`.
            return Err(CompileError::symbol(
                lineno,
                format!("Redeclaration of function '{name}' in the same scope."),
            ));
        }
        t.order.push(name.to_string());
        t.symbols.insert(name.to_string(), sym);
        Ok(())
    }

    /// Walk parent-ward from `table` looking for `name`. Returns the
    /// symbol's declaring table id and declaring level alongside a
    /// reference, or `None` if undefined (spec §3: "undefined references
    /// ... surface later as lookup failures").
    pub fn lookup(&self, table: SymbolTableId, name: &str) -> Option<(&Symbol, SymbolTableId)> {
        let mut cur = Some(table);
        while let Some(id) = cur {
            if let Some(sym) = self.tables[id].symbols.get(name) {
                return Some((sym, id));
            }
            cur = self.tables[id].parent;
        }
        None
    }

    /// Mutable counterpart of [`lookup`](Self::lookup), used to flip
    /// `escaping` or write an `sr` cache entry on the symbol wherever it
    /// actually lives.
    pub fn lookup_mut(
        &mut self,
        table: SymbolTableId,
        name: &str,
    ) -> Option<(&mut Symbol, SymbolTableId)> {
        let mut cur = Some(table);
        while let Some(id) = cur {
            if self.tables[id].symbols.contains_key(name) {
                return Some((self.tables[id].symbols.get_mut(name).unwrap(), id));
            }
            cur = self.tables[id].parent;
        }
        None
    }

    pub fn level(&self, table: SymbolTableId) -> usize {
        self.tables[table].level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_to_parent_and_reports_declaring_level() {
        let mut arena = SymbolArena::new();
        let root = arena.new_root();
        arena
            .insert(
                root,
                "x",
                Symbol::new("int", SymbolKind::Variable, SymbolInfo::Offset(0)),
                1,
            )
            .unwrap();
        let child = arena.new_child(root);
        let (sym, declaring) = arena.lookup(child, "x").expect("found");
        assert_eq!(sym.ty, "int");
        assert_eq!(declaring, root);
        assert_eq!(arena.level(declaring), 0);
        assert_eq!(arena.level(child), 1);
    }

    #[test]
    fn redeclaration_in_same_scope_is_an_error() {
        let mut arena = SymbolArena::new();
        let root = arena.new_root();
        arena
            .insert(
                root,
                "x",
                Symbol::new("int", SymbolKind::Variable, SymbolInfo::Offset(0)),
                1,
            )
            .unwrap();
        let err = arena
            .insert(
                root,
                "x",
                Symbol::new("int", SymbolKind::Variable, SymbolInfo::Offset(1)),
                1,
            )
            .unwrap_err();
        assert!(err.to_string().contains("Redeclaration"));
    }

    /// Spec §8 N1 pins this exact wording, "function", even though `x` here
    /// is a plain variable — the redeclaration message hardcodes that word
    /// regardless of `SymbolKind`.
    #[test]
    fn redeclaration_message_says_function_regardless_of_kind() {
        let mut arena = SymbolArena::new();
        let root = arena.new_root();
        arena
            .insert(
                root,
                "x",
                Symbol::new("int", SymbolKind::Variable, SymbolInfo::Offset(0)),
                1,
            )
            .unwrap();
        let err = arena
            .insert(
                root,
                "x",
                Symbol::new("int", SymbolKind::Variable, SymbolInfo::Offset(1)),
                1,
            )
            .unwrap_err();
        assert_eq!(err.message, "Redeclaration of function 'x' in the same scope.");
    }

    #[test]
    fn shadowing_in_a_child_scope_does_not_error() {
        let mut arena = SymbolArena::new();
        let root = arena.new_root();
        let child = arena.new_child(root);
        arena
            .insert(
                root,
                "x",
                Symbol::new("int", SymbolKind::Variable, SymbolInfo::Offset(0)),
                1,
            )
            .unwrap();
        assert!(
            arena
                .insert(
                    child,
                    "x",
                    Symbol::new("int", SymbolKind::Variable, SymbolInfo::Offset(0)),
                    2
                )
                .is_ok()
        );
    }

    #[test]
    fn undefined_lookup_returns_none() {
        let mut arena = SymbolArena::new();
        let root = arena.new_root();
        assert!(arena.lookup(root, "nope").is_none());
    }
}
