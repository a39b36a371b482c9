//! Flat `NodeId -> &Function` index.
//!
//! Code generation only ever has a `Function`'s [`NodeId`] in hand at a
//! call site (the symbol table stores `SymbolInfo::Function(NodeId)`, not
//! a borrow), so this is built once up front by walking the whole program
//! and handed to both code generators by shared reference.

use std::collections::HashMap;

use crate::ast::{Body, Declaration, Function, NodeId, Program, Statement};

pub struct FunctionIndex<'a> {
    by_id: HashMap<NodeId, &'a Function>,
}

impl<'a> FunctionIndex<'a> {
    pub fn build(program: &'a Program) -> FunctionIndex<'a> {
        let mut by_id = HashMap::new();
        collect_fn(&program.main, &mut by_id);
        FunctionIndex { by_id }
    }

    pub fn get(&self, id: NodeId) -> &'a Function {
        self.by_id
            .get(&id)
            .copied()
            .expect("every function symbol's NodeId was indexed from the same AST")
    }
}

fn collect_fn<'a>(f: &'a Function, out: &mut HashMap<NodeId, &'a Function>) {
    out.insert(f.id, f);
    collect_body(&f.body, out);
}

fn collect_body<'a>(b: &'a Body, out: &mut HashMap<NodeId, &'a Function>) {
    for decl in &b.decls {
        if let Declaration::Function(df) = decl {
            collect_fn(&df.function, out);
        }
    }
    for stmt in &b.stm_list {
        collect_stmt(stmt, out);
    }
}

fn collect_stmt<'a>(s: &'a Statement, out: &mut HashMap<NodeId, &'a Function>) {
    match s {
        Statement::IfThenElse(ite) => {
            collect_body(&ite.then, out);
            if let Some(els) = &ite.els {
                collect_body(els, out);
            }
        }
        Statement::While(w) => collect_body(&w.body, out),
        Statement::For(f) => collect_body(&f.body, out),
        Statement::Assignment(_) | Statement::Print(_) | Statement::Return(_) => {}
    }
}
