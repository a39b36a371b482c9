//! Symbol collection (spec §4.2).
//!
//! Walks the AST depth-first with an explicit scope pointer, builds the
//! nested symbol-table tree, assigns parameter/variable offsets, and marks
//! every symbol referenced from below its declaring scope as escaping.

use crate::annotations::Annotations;
use crate::ast::{
    Body, Declaration, Expression, Function, Program, Statement, StatementAssignment,
};
use crate::error::{CompileError, CompileResult};
use crate::symbols::{Symbol, SymbolArena, SymbolInfo, SymbolKind, SymbolTableId};

pub struct CollectResult {
    pub arena: SymbolArena,
    pub annotations: Annotations,
    /// The nominal scope enclosing `?main` — never an activation record,
    /// just a parent for the main function's own scope to point at.
    pub root: SymbolTableId,
}

/// Run symbol collection over the whole program.
pub fn collect(program: &Program) -> CompileResult<CollectResult> {
    let mut arena = SymbolArena::new();
    let mut annotations = Annotations::new();
    let root = arena.new_root();

    let mut c = Collector {
        arena: &mut arena,
        annotations: &mut annotations,
    };
    c.collect_function(&program.main, root)?;

    Ok(CollectResult {
        arena,
        annotations,
        root,
    })
}

struct Collector<'a> {
    arena: &'a mut SymbolArena,
    annotations: &'a mut Annotations,
}

impl<'a> Collector<'a> {
    fn collect_function(&mut self, func: &Function, parent: SymbolTableId) -> CompileResult<()> {
        let scope = self.arena.new_child(parent);
        self.annotations.function(func.id).symbol_table = Some(scope);

        let mut offset = 0usize;
        for p in &func.params {
            self.arena.insert(
                scope,
                &p.name,
                Symbol::new(p.ty.name(), SymbolKind::Parameter, SymbolInfo::Offset(offset)),
                p.lineno,
            )?;
            offset += 1;
        }
        self.annotations.function(func.id).number_of_parameters = offset;

        self.collect_body(&func.body, scope)
    }

    fn collect_body(&mut self, body: &Body, scope: SymbolTableId) -> CompileResult<()> {
        let mut var_offset = 0usize;
        for decl in &body.decls {
            self.collect_declaration(decl, scope, &mut var_offset)?;
        }
        self.annotations.body(body.id).number_of_variables = var_offset;

        for stmt in &body.stm_list {
            self.collect_statement(stmt, scope)?;
        }
        Ok(())
    }

    fn collect_declaration(
        &mut self,
        decl: &Declaration,
        scope: SymbolTableId,
        var_offset: &mut usize,
    ) -> CompileResult<()> {
        match decl {
            Declaration::Function(df) => {
                let f = &df.function;
                self.arena.insert(
                    scope,
                    &f.name,
                    Symbol::new(
                        f.return_type.name(),
                        SymbolKind::Function,
                        SymbolInfo::Function(f.id),
                    ),
                    f.lineno,
                )?;
                self.collect_function(f, scope)
            }
            Declaration::VariableList(vl) => {
                for name in &vl.names {
                    self.arena.insert(
                        scope,
                        name,
                        Symbol::new(
                            vl.ty.name(),
                            SymbolKind::Variable,
                            SymbolInfo::Offset(*var_offset),
                        ),
                        vl.lineno,
                    )?;
                    *var_offset += 1;
                }
                Ok(())
            }
            Declaration::VariableInit(vi) => {
                self.arena.insert(
                    scope,
                    &vi.name,
                    Symbol::new(
                        vi.ty.name(),
                        SymbolKind::Variable,
                        SymbolInfo::Offset(*var_offset),
                    ),
                    vi.lineno,
                )?;
                *var_offset += 1;
                self.collect_expression(&vi.init, scope)
            }
        }
    }

    fn collect_statement(&mut self, stmt: &Statement, scope: SymbolTableId) -> CompileResult<()> {
        match stmt {
            Statement::Assignment(a) => self.collect_assignment(a, scope),
            Statement::IfThenElse(ite) => {
                self.collect_expression(&ite.exp, scope)?;

                let then_scope = self.arena.new_child(scope);
                self.annotations.if_stmt(ite.id).symbol_table_then = Some(then_scope);
                self.collect_body(&ite.then, then_scope)?;

                if let Some(els) = &ite.els {
                    let else_scope = self.arena.new_child(scope);
                    self.annotations.if_stmt(ite.id).symbol_table_else = Some(else_scope);
                    self.collect_body(els, else_scope)?;
                }
                Ok(())
            }
            Statement::While(w) => {
                let child = self.arena.new_child(scope);
                self.annotations.while_stmt(w.id).symbol_table = Some(child);
                // The condition is re-evaluated on every iteration inside the
                // loop's own scope, so it can see locals declared in the
                // previous pass of the loop body just like the increment can.
                self.collect_expression(&w.exp, child)?;
                self.collect_body(&w.body, child)
            }
            Statement::For(f) => {
                let child = self.arena.new_child(scope);
                self.annotations.for_stmt(f.id).symbol_table = Some(child);
                self.annotations.for_stmt(f.id).number_of_parameters = 1;

                // The induction variable is modeled as an escaping PARAMETER
                // at offset 0 so the precall/postreturn machinery transports
                // its initial value the same way an ordinary call argument
                // would (spec §9).
                self.arena.insert(
                    child,
                    &f.iter.name,
                    Symbol {
                        ty: f.iter.ty.name().to_string(),
                        kind: SymbolKind::Parameter,
                        info: SymbolInfo::Offset(0),
                        sr: None,
                        escaping: true,
                    },
                    f.iter.lineno,
                )?;

                // The initializer is evaluated in the enclosing scope, like
                // an argument expression at a call site.
                self.collect_expression(&f.iter.init, scope)?;
                self.collect_expression(&f.exp, child)?;
                self.collect_assignment(&f.assign, child)?;
                self.collect_body(&f.body, child)
            }
            Statement::Print(p) => self.collect_expression(&p.exp, scope),
            Statement::Return(r) => match &r.exp {
                Some(e) => self.collect_expression(e, scope),
                None => Ok(()),
            },
        }
    }

    fn collect_assignment(
        &mut self,
        a: &StatementAssignment,
        scope: SymbolTableId,
    ) -> CompileResult<()> {
        self.mark_escaping_if_needed(scope, &a.lhs);
        self.collect_expression(&a.rhs, scope)
    }

    fn collect_expression(&mut self, expr: &Expression, scope: SymbolTableId) -> CompileResult<()> {
        match expr {
            Expression::Identifier { name, .. } => {
                self.mark_escaping_if_needed(scope, name);
                Ok(())
            }
            Expression::Integer { .. } | Expression::Float { .. } => Ok(()),
            Expression::Binop { lhs, rhs, .. } => {
                self.collect_expression(lhs, scope)?;
                self.collect_expression(rhs, scope)
            }
            Expression::Call { args, .. } => {
                for a in args {
                    self.collect_expression(a, scope)?;
                }
                Ok(())
            }
        }
    }

    /// The canonical escape signal (spec §9): compare the declaring scope's
    /// level against the level of the scope the reference occurs in, never
    /// a same-scope boolean. A miss here is not an error — undefined names
    /// surface later as code-gen lookup failures (spec §3, §4.8).
    fn mark_escaping_if_needed(&mut self, scope: SymbolTableId, name: &str) {
        let current_level = self.arena.level(scope);
        // Resolve the declaring level first (immutable walk), then flip the
        // flag through a second, mutable walk — symbol tables are shallow,
        // so two walks is simpler than threading borrows through one.
        let declaring_level = match self.arena.lookup(scope, name) {
            Some((_, declaring_table)) => self.arena.level(declaring_table),
            None => return,
        };
        if declaring_level < current_level {
            if let Some((sym, _)) = self.arena.lookup_mut(scope, name) {
                sym.escaping = true;
            }
        }
    }
}

/// Find a *Redeclaration* as the sole recoverable-to-test failure mode; any
/// other error indicates a bug in this pass, not the input program.
pub fn is_redeclaration(err: &CompileError) -> bool {
    err.message.starts_with("Redeclaration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn body(id: NodeId, decls: Vec<Declaration>, stm_list: Vec<Statement>) -> Body {
        Body {
            id,
            decls,
            stm_list,
            lineno: 1,
        }
    }

    fn ident(name: &str) -> Expression {
        Expression::Identifier {
            name: name.to_string(),
            lineno: 1,
        }
    }

    fn int(v: i64) -> Expression {
        Expression::Integer {
            value: v,
            lineno: 1,
        }
    }

    #[test]
    fn duplicate_declaration_in_same_scope_is_fatal() {
        let main = Function {
            id: 0,
            return_type: Type::Void,
            name: MAIN_NAME.to_string(),
            params: vec![],
            body: body(
                1,
                vec![
                    Declaration::VariableList(DeclarationVariableList {
                        ty: Type::Int,
                        names: vec!["x".to_string()],
                        lineno: 1,
                    }),
                    Declaration::VariableList(DeclarationVariableList {
                        ty: Type::Int,
                        names: vec!["x".to_string()],
                        lineno: 1,
                    }),
                ],
                vec![],
            ),
            lineno: 1,
        };
        let err = collect(&Program { main }).unwrap_err();
        assert!(is_redeclaration(&err));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn nested_function_reading_outer_local_marks_it_escaping() {
        // int outer() { int a; a = 7; int inner() { return a + 1; } return inner(); }
        let inner = Function {
            id: 2,
            return_type: Type::Int,
            name: "inner".to_string(),
            params: vec![],
            body: body(
                3,
                vec![],
                vec![Statement::Return(StatementReturn {
                    exp: Some(Expression::Binop {
                        op: BinOp::Add,
                        lhs: Box::new(ident("a")),
                        rhs: Box::new(int(1)),
                        lineno: 1,
                    }),
                    lineno: 1,
                })],
            ),
            lineno: 1,
        };
        let outer = Function {
            id: 1,
            return_type: Type::Int,
            name: "outer".to_string(),
            params: vec![],
            body: body(
                4,
                vec![
                    Declaration::VariableList(DeclarationVariableList {
                        ty: Type::Int,
                        names: vec!["a".to_string()],
                        lineno: 1,
                    }),
                    Declaration::Function(DeclarationFunction { function: inner }),
                ],
                vec![
                    Statement::Assignment(StatementAssignment {
                        lhs: "a".to_string(),
                        rhs: int(7),
                        lineno: 1,
                    }),
                    Statement::Return(StatementReturn {
                        exp: Some(Expression::Call {
                            name: "inner".to_string(),
                            args: vec![],
                            lineno: 1,
                        }),
                        lineno: 1,
                    }),
                ],
            ),
            lineno: 1,
        };
        let main = Function {
            id: 0,
            return_type: Type::Void,
            name: MAIN_NAME.to_string(),
            params: vec![],
            body: body(
                5,
                vec![Declaration::Function(DeclarationFunction { function: outer })],
                vec![],
            ),
            lineno: 1,
        };
        let result = collect(&Program { main }).unwrap();
        let outer_scope = result.annotations.functions[&1].symbol_table.unwrap();
        let a = result.arena.table(outer_scope).get("a").unwrap();
        assert!(a.escaping, "outer local read from nested function must escape");
    }

    #[test]
    fn for_induction_variable_is_escaping_parameter() {
        let for_stmt = StatementFor {
            id: 10,
            iter: DeclarationVariableInit {
                ty: Type::Int,
                name: "i".to_string(),
                init: int(0),
                lineno: 1,
            },
            exp: Expression::Binop {
                op: BinOp::Lt,
                lhs: Box::new(ident("i")),
                rhs: Box::new(int(3)),
                lineno: 1,
            },
            assign: StatementAssignment {
                lhs: "i".to_string(),
                rhs: Expression::Binop {
                    op: BinOp::Add,
                    lhs: Box::new(ident("i")),
                    rhs: Box::new(int(1)),
                    lineno: 1,
                },
                lineno: 1,
            },
            body: body(
                11,
                vec![],
                vec![Statement::Print(StatementPrint {
                    exp: ident("i"),
                    lineno: 1,
                })],
            ),
            lineno: 1,
        };
        let main = Function {
            id: 0,
            return_type: Type::Void,
            name: MAIN_NAME.to_string(),
            params: vec![],
            body: body(12, vec![], vec![Statement::For(for_stmt)]),
            lineno: 1,
        };
        let result = collect(&Program { main }).unwrap();
        let for_scope = result.annotations.fors[&10].symbol_table.unwrap();
        let i = result.arena.table(for_scope).get("i").unwrap();
        assert!(i.escaping);
        assert_eq!(i.kind, SymbolKind::Parameter);
        assert_eq!(result.annotations.fors[&10].number_of_parameters, 1);
    }
}
