//! Side-tables for per-pass AST annotations.
//!
//! Spec §9 ("Recursive AST with annotations") offers two Rust encodings
//! for the reference compiler's habit of stapling new attributes onto AST
//! nodes pass by pass; this crate takes the side-table route, keyed by the
//! stable [`NodeId`]s the parser hands out, so earlier passes' output AST
//! is never mutated — only ever read by later passes, matching spec §5's
//! "each pass takes a deep copy ... earlier passes' outputs remain
//! available".

use std::collections::HashMap;

use crate::ast::NodeId;
use crate::symbols::SymbolTableId;

/// What the symbol collector (§4.2) records about one `Body`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyInfo {
    pub number_of_variables: usize,
}

/// What the symbol collector records about one `Function`, plus the
/// start/end labels a code generator assigns the first time it (or a
/// forward call site) needs them.
#[derive(Debug, Clone, Default)]
pub struct FunctionInfo {
    pub symbol_table: Option<SymbolTableId>,
    pub number_of_parameters: usize,
    pub start_label: Option<String>,
    pub end_label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IfInfo {
    pub symbol_table_then: Option<SymbolTableId>,
    pub symbol_table_else: Option<SymbolTableId>,
    pub else_label: Option<String>,
    pub esle_label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WhileInfo {
    pub symbol_table: Option<SymbolTableId>,
    pub while_label: Option<String>,
    pub elihw_label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ForInfo {
    pub symbol_table: Option<SymbolTableId>,
    pub number_of_parameters: usize,
    pub for_label: Option<String>,
    pub rof_label: Option<String>,
}

/// All annotations collected across passes for one compile run.
#[derive(Debug, Default)]
pub struct Annotations {
    pub bodies: HashMap<NodeId, BodyInfo>,
    pub functions: HashMap<NodeId, FunctionInfo>,
    pub ifs: HashMap<NodeId, IfInfo>,
    pub whiles: HashMap<NodeId, WhileInfo>,
    pub fors: HashMap<NodeId, ForInfo>,
}

impl Annotations {
    pub fn new() -> Annotations {
        Annotations::default()
    }

    pub fn body(&mut self, id: NodeId) -> &mut BodyInfo {
        self.bodies.entry(id).or_default()
    }

    pub fn function(&mut self, id: NodeId) -> &mut FunctionInfo {
        self.functions.entry(id).or_default()
    }

    pub fn if_stmt(&mut self, id: NodeId) -> &mut IfInfo {
        self.ifs.entry(id).or_default()
    }

    pub fn while_stmt(&mut self, id: NodeId) -> &mut WhileInfo {
        self.whiles.entry(id).or_default()
    }

    pub fn for_stmt(&mut self, id: NodeId) -> &mut ForInfo {
        self.fors.entry(id).or_default()
    }
}
