//! Stack-machine code generation (spec §4.4).
//!
//! Every expression leaves exactly one value on the hardware stack; every
//! statement consumes what it needs from the stack and leaves it balanced.
//! No virtual registers, no allocator — this path runs straight from the
//! AST to [`crate::codegen::emitter`]. The two fixed scratch registers
//! `ADD`/`SUB`/`MUL`/`DIV`/`CMP` work through are physical register slots
//! 1 and 2 of the emitter's register table (spec §4.7), chosen directly
//! rather than via the allocator, since this backend never runs one.

use crate::annotations::Annotations;
use crate::ast::{
    self, Body, Declaration, Expression, Function, Program, Statement, StatementAssignment,
};
use crate::error::CompileResult;
use crate::index::FunctionIndex;
use crate::ir::{Instruction, Meta, Op, Operand, Target};
use crate::label::LabelGen;
use crate::symbols::{SymbolArena, SymbolTableId};

use super::support::{
    arith_op, cmp_op, emit_precall_tail, hops, lookup_or_err, static_link_walk, symbol_operand,
};

/// Scratch registers `R1`/`R2` used to pop two stack values, combine them,
/// and push the result back (spec §4.4's `ADD`/`CMP` sequences).
const R1: u32 = 1;
const R2: u32 = 2;

pub fn generate(
    program: &Program,
    arena: &SymbolArena,
    annotations: &mut Annotations,
    labels: &mut LabelGen,
    index: &FunctionIndex,
) -> CompileResult<Vec<Instruction>> {
    let mut gen = StackCodeGen {
        arena,
        annotations,
        labels,
        index,
        out: Vec::new(),
        function_stack: Vec::new(),
        body_stack: Vec::new(),
    };
    gen.gen_function(&program.main, None)?;
    Ok(gen.out)
}

struct StackCodeGen<'a> {
    arena: &'a SymbolArena,
    annotations: &'a mut Annotations,
    labels: &'a mut LabelGen,
    index: &'a FunctionIndex<'a>,
    out: Vec<Instruction>,
    /// `(function NodeId, own body's variable count)` for every function
    /// currently being generated, innermost last — consulted by `Return`.
    function_stack: Vec<(ast::NodeId, usize)>,
    /// `Body::id` of every `if`/`while`/`for` trampoline currently open
    /// between the nearest enclosing `Return` and its owning function,
    /// consulted by `Return`'s unwind arithmetic (spec §9's `16·`
    /// coefficient — see `codegen::support` module docs).
    body_stack: Vec<ast::NodeId>,
}

impl<'a> StackCodeGen<'a> {
    fn ensure_function_labels(&mut self, func: &Function) -> (String, String) {
        if let Some(info) = self.annotations.functions.get(&func.id) {
            if let (Some(s), Some(e)) = (&info.start_label, &info.end_label) {
                return (s.clone(), e.clone());
            }
        }
        let (start, end) = if func.name == ast::MAIN_NAME {
            ("main".to_string(), "end_main".to_string())
        } else {
            self.labels.next_fn_pair(&func.name)
        };
        let info = self.annotations.function(func.id);
        info.start_label = Some(start.clone());
        info.end_label = Some(end.clone());
        (start, end)
    }

    fn prereg_nested_labels(&mut self, body: &Body) {
        for decl in &body.decls {
            if let Declaration::Function(df) = decl {
                self.ensure_function_labels(&df.function);
            }
        }
    }

    fn gen_nested_function_decls(&mut self, body: &Body, parent_scope: SymbolTableId) -> CompileResult<()> {
        for decl in &body.decls {
            if let Declaration::Function(df) = decl {
                self.gen_function(&df.function, Some(parent_scope))?;
            }
        }
        Ok(())
    }

    /// `parent_scope` is only used to emit labels/errors scoped to the
    /// right place; the function's own scope is read back from the
    /// collector's annotations.
    fn gen_function(&mut self, func: &Function, _parent_scope: Option<SymbolTableId>) -> CompileResult<()> {
        let scope = self.annotations.functions[&func.id]
            .symbol_table
            .expect("symbol collection ran first");
        let nvars = self.annotations.bodies[&func.body.id].number_of_variables;
        let (start, end) = self.ensure_function_labels(func);

        self.out.push(Instruction::label(start));
        self.out.push(Instruction::meta(Meta::Prolog));
        self.out.push(Instruction::new(
            Op::Sub,
            vec![
                Operand::direct(Target::imm(8 * nvars as i64)),
                Operand::direct(Target::rsp()),
            ],
        ));

        self.function_stack.push((func.id, nvars));
        let saved_body_stack = std::mem::take(&mut self.body_stack);

        self.prereg_nested_labels(&func.body);
        for stmt in &func.body.stm_list {
            self.gen_statement(stmt, scope)?;
        }

        self.body_stack = saved_body_stack;
        self.function_stack.pop();

        self.out.push(Instruction::label(end));
        self.out.push(Instruction::meta(Meta::Epilog));
        self.out.push(Instruction::meta(Meta::Ret));

        self.gen_nested_function_decls(&func.body, scope)
    }

    /// The `PRECALL`/pseudo-return/`PROLOG` .. `EPILOG`/`POSTRETURN`
    /// trampoline shared by `if`/`else` branches, `while` bodies, and
    /// `for` bodies (spec §4.4). `args` is empty for `if`/`while`, and the
    /// loop initializer (evaluated by the caller, in the caller's scope)
    /// for `for`.
    fn gen_trampoline(
        &mut self,
        body_id: ast::NodeId,
        branch_scope: SymbolTableId,
        enclosing_scope: SymbolTableId,
        body: &Body,
        run: impl FnOnce(&mut Self) -> CompileResult<()>,
    ) -> CompileResult<()> {
        let level = self.arena.level(enclosing_scope);
        emit_precall_tail(&mut self.out, level, level);
        self.out.push(Instruction::new(
            Op::Sub,
            vec![
                Operand::direct(Target::imm(8)),
                Operand::direct(Target::rsp()),
            ],
        ));
        self.out.push(Instruction::meta(Meta::Prolog));

        let nvars = self.annotations.bodies[&body.id].number_of_variables;
        self.out.push(Instruction::new(
            Op::Sub,
            vec![
                Operand::direct(Target::imm(8 * nvars as i64)),
                Operand::direct(Target::rsp()),
            ],
        ));

        self.body_stack.push(body_id);
        self.prereg_nested_labels(body);
        run(self)?;
        self.body_stack.pop();

        self.out.push(Instruction::meta(Meta::Epilog));
        self.out.push(Instruction::new(
            Op::Add,
            vec![
                Operand::direct(Target::imm(8)),
                Operand::direct(Target::rsp()),
            ],
        ));
        self.out.push(Instruction::meta(Meta::Postreturn));

        self.gen_nested_function_decls(body, branch_scope)
    }

    fn gen_statement(&mut self, stmt: &Statement, scope: SymbolTableId) -> CompileResult<()> {
        match stmt {
            Statement::Assignment(a) => self.gen_assignment(a, scope),
            Statement::IfThenElse(ite) => {
                self.gen_expression(&ite.exp, scope)?;
                self.out.push(Instruction::new(Op::Pop, vec![Operand::direct(Target::reg(R1))]));
                self.out.push(Instruction::new(
                    Op::Move,
                    vec![Operand::direct(Target::imm(0)), Operand::direct(Target::reg(R2))],
                ));
                self.out.push(Instruction::new(
                    Op::Cmp,
                    vec![Operand::direct(Target::reg(R1)), Operand::direct(Target::reg(R2))],
                ));

                let info = self.annotations.if_stmt(ite.id).clone();
                let (else_label, esle_label) = match (info.else_label, info.esle_label) {
                    (Some(e), Some(x)) => (e, x),
                    _ => {
                        let (e, x) = self.labels.next_mirrored_pair("else");
                        let info = self.annotations.if_stmt(ite.id);
                        info.else_label = Some(e.clone());
                        info.esle_label = Some(x.clone());
                        (e, x)
                    }
                };

                self.out.push(Instruction::new(
                    Op::Je,
                    vec![Operand::direct(Target::label(else_label.clone()))],
                ));

                let then_scope = self.annotations.ifs[&ite.id].symbol_table_then.unwrap();
                self.gen_trampoline(ite.id, then_scope, scope, &ite.then, |g| {
                    for s in &ite.then.stm_list {
                        g.gen_statement(s, then_scope)?;
                    }
                    Ok(())
                })?;
                self.out.push(Instruction::new(
                    Op::Jmp,
                    vec![Operand::direct(Target::label(esle_label.clone()))],
                ));
                self.out.push(Instruction::label(else_label));

                if let Some(els) = &ite.els {
                    let else_scope = self.annotations.ifs[&ite.id].symbol_table_else.unwrap();
                    self.gen_trampoline(ite.id, else_scope, scope, els, |g| {
                        for s in &els.stm_list {
                            g.gen_statement(s, else_scope)?;
                        }
                        Ok(())
                    })?;
                }
                self.out.push(Instruction::label(esle_label));
                Ok(())
            }
            Statement::While(w) => {
                let child = self.annotations.whiles[&w.id].symbol_table.unwrap();
                let info = self.annotations.while_stmt(w.id).clone();
                let (while_label, elihw_label) = match (info.while_label, info.elihw_label) {
                    (Some(a), Some(b)) => (a, b),
                    _ => {
                        let (a, b) = self.labels.next_mirrored_pair("while");
                        let info = self.annotations.while_stmt(w.id);
                        info.while_label = Some(a.clone());
                        info.elihw_label = Some(b.clone());
                        (a, b)
                    }
                };

                self.gen_trampoline(w.id, child, scope, &w.body, |g| {
                    g.out.push(Instruction::label(while_label.clone()));
                    g.gen_expression(&w.exp, child)?;
                    g.out.push(Instruction::new(Op::Pop, vec![Operand::direct(Target::reg(R1))]));
                    g.out.push(Instruction::new(
                        Op::Move,
                        vec![Operand::direct(Target::imm(0)), Operand::direct(Target::reg(R2))],
                    ));
                    g.out.push(Instruction::new(
                        Op::Cmp,
                        vec![Operand::direct(Target::reg(R1)), Operand::direct(Target::reg(R2))],
                    ));
                    g.out.push(Instruction::new(
                        Op::Je,
                        vec![Operand::direct(Target::label(elihw_label.clone()))],
                    ));
                    for s in &w.body.stm_list {
                        g.gen_statement(s, child)?;
                    }
                    g.out.push(Instruction::new(
                        Op::Jmp,
                        vec![Operand::direct(Target::label(while_label.clone()))],
                    ));
                    g.out.push(Instruction::label(elihw_label.clone()));
                    Ok(())
                })
            }
            Statement::For(f) => {
                let child = self.annotations.fors[&f.id].symbol_table.unwrap();
                self.gen_expression(&f.iter.init, scope)?;

                let info = self.annotations.for_stmt(f.id).clone();
                let (for_label, rof_label) = match (info.for_label, info.rof_label) {
                    (Some(a), Some(b)) => (a, b),
                    _ => {
                        let (a, b) = self.labels.next_mirrored_pair("for");
                        let info = self.annotations.for_stmt(f.id);
                        info.for_label = Some(a.clone());
                        info.rof_label = Some(b.clone());
                        (a, b)
                    }
                };

                // The initializer was already pushed above; _precall's arg
                // push is a no-op here, only the PRECALL/static-link/PUSH
                // RSL tail plus pseudo-return/PROLOG happen inside
                // gen_trampoline. The pushed initializer lands at the
                // induction variable's own frame slot (offset 0) the same
                // way a real call's first argument would.
                self.gen_trampoline(f.id, child, scope, &f.body, |g| {
                    g.out.push(Instruction::new(Op::Pop, vec![symbol_operand(
                        g.arena.lookup(child, &f.iter.name).unwrap().0,
                    )]));
                    g.out.push(Instruction::label(for_label.clone()));
                    g.gen_expression(&f.exp, child)?;
                    g.out.push(Instruction::new(Op::Pop, vec![Operand::direct(Target::reg(R1))]));
                    g.out.push(Instruction::new(
                        Op::Move,
                        vec![Operand::direct(Target::imm(0)), Operand::direct(Target::reg(R2))],
                    ));
                    g.out.push(Instruction::new(
                        Op::Cmp,
                        vec![Operand::direct(Target::reg(R1)), Operand::direct(Target::reg(R2))],
                    ));
                    g.out.push(Instruction::new(
                        Op::Je,
                        vec![Operand::direct(Target::label(rof_label.clone()))],
                    ));
                    for s in &f.body.stm_list {
                        g.gen_statement(s, child)?;
                    }
                    g.gen_assignment(&f.assign, child)?;
                    g.out.push(Instruction::new(
                        Op::Jmp,
                        vec![Operand::direct(Target::label(for_label.clone()))],
                    ));
                    g.out.push(Instruction::label(rof_label.clone()));
                    Ok(())
                })
            }
            Statement::Print(p) => {
                self.gen_expression(&p.exp, scope)?;
                self.out.push(Instruction::meta(Meta::Precall));
                self.out.push(Instruction::meta(Meta::CallPrintf));
                self.out.push(Instruction::meta(Meta::Postreturn));
                Ok(())
            }
            Statement::Return(r) => {
                if let Some(e) = &r.exp {
                    self.gen_expression(e, scope)?;
                    self.out.push(Instruction::new(Op::Pop, vec![Operand::direct(Target::rrt())]));
                }
                if !self.body_stack.is_empty() {
                    let sum_nvars: usize = self
                        .body_stack
                        .iter()
                        .map(|id| self.annotations.bodies[id].number_of_variables)
                        .sum();
                    let (_, func_nvars) = *self.function_stack.last().expect("return inside a function");
                    let disp = 16 * 8 * self.body_stack.len() as i64
                        + 8 * sum_nvars as i64
                        + 8 * func_nvars as i64;
                    self.out.push(Instruction::new(
                        Op::Add,
                        vec![Operand::direct(Target::imm(disp)), Operand::direct(Target::rsp())],
                    ));
                    self.out.push(Instruction::new(
                        Op::Move,
                        vec![Operand::direct(Target::rsp()), Operand::direct(Target::rbp())],
                    ));
                }
                let (_, end) = self.ensure_function_labels(
                    self.index.get(self.function_stack.last().expect("return inside a function").0),
                );
                self.out.push(Instruction::new(Op::Jmp, vec![Operand::direct(Target::label(end))]));
                Ok(())
            }
        }
    }

    fn gen_assignment(&mut self, a: &StatementAssignment, scope: SymbolTableId) -> CompileResult<()> {
        self.gen_expression(&a.rhs, scope)?;
        let (sym, declaring_scope) = lookup_or_err(self.arena, scope, &a.lhs, a.lineno)?;
        let steps = hops(self.arena.level(scope), self.arena.level(declaring_scope));
        self.out.extend(static_link_walk(steps));
        let operand = symbol_operand(sym);
        self.out.push(Instruction::new(Op::Pop, vec![operand]));
        Ok(())
    }

    fn gen_expression(&mut self, expr: &Expression, scope: SymbolTableId) -> CompileResult<()> {
        match expr {
            Expression::Identifier { name, lineno } => {
                let (sym, declaring_scope) = lookup_or_err(self.arena, scope, name, *lineno)?;
                let steps = hops(self.arena.level(scope), self.arena.level(declaring_scope));
                self.out.extend(static_link_walk(steps));
                let operand = symbol_operand(sym);
                self.out.push(Instruction::new(Op::Push, vec![operand]));
                Ok(())
            }
            Expression::Integer { value, .. } => {
                self.out.push(Instruction::new(
                    Op::Push,
                    vec![Operand::direct(Target::imm(*value))],
                ));
                Ok(())
            }
            Expression::Float { lineno, .. } => Err(crate::error::CompileError::codegen(
                *lineno,
                "Floats are not implemented, yet.",
            )),
            Expression::Binop { op, lhs, rhs, .. } if op.is_arith() => {
                self.gen_expression(lhs, scope)?;
                self.gen_expression(rhs, scope)?;
                self.out.push(Instruction::new(Op::Pop, vec![Operand::direct(Target::reg(R1))]));
                self.out.push(Instruction::new(Op::Pop, vec![Operand::direct(Target::reg(R2))]));
                self.out.push(Instruction::new(
                    arith_op(*op),
                    vec![Operand::direct(Target::reg(R1)), Operand::direct(Target::reg(R2))],
                ));
                self.out.push(Instruction::new(Op::Push, vec![Operand::direct(Target::reg(R2))]));
                Ok(())
            }
            Expression::Binop { op, lhs, rhs, .. } => {
                self.gen_expression(lhs, scope)?;
                self.gen_expression(rhs, scope)?;
                self.out.push(Instruction::new(Op::Pop, vec![Operand::direct(Target::reg(R1))]));
                self.out.push(Instruction::new(Op::Pop, vec![Operand::direct(Target::reg(R2))]));
                self.out.push(Instruction::new(
                    Op::Cmp,
                    vec![Operand::direct(Target::reg(R1)), Operand::direct(Target::reg(R2))],
                ));
                let (true_label, end_label) = (self.labels.next("true"), self.labels.next("end"));
                self.out.push(Instruction::new(
                    cmp_op(*op),
                    vec![Operand::direct(Target::label(true_label.clone()))],
                ));
                self.out.push(Instruction::new(Op::Push, vec![Operand::direct(Target::imm(0))]));
                self.out.push(Instruction::new(
                    Op::Jmp,
                    vec![Operand::direct(Target::label(end_label.clone()))],
                ));
                self.out.push(Instruction::label(true_label));
                self.out.push(Instruction::new(Op::Push, vec![Operand::direct(Target::imm(1))]));
                self.out.push(Instruction::label(end_label));
                Ok(())
            }
            Expression::Call { name, args, lineno } => {
                let (sym, declaring_scope) = lookup_or_err(self.arena, scope, name, *lineno)?;
                let func_id = sym.info.function_node().ok_or_else(|| {
                    crate::error::CompileError::codegen(*lineno, format!("'{name}' is not a function."))
                })?;
                let func = self.index.get(func_id);
                let (start, _) = self.ensure_function_labels(func);
                let target_level = self.arena.level(declaring_scope);
                let from_level = self.arena.level(scope);

                for arg in args.iter().rev() {
                    self.gen_expression(arg, scope)?;
                }
                emit_precall_tail(&mut self.out, from_level, target_level);
                self.out.push(Instruction::new(Op::Call, vec![Operand::direct(Target::label(start))]));
                self.out.push(Instruction::new(
                    Op::Add,
                    vec![Operand::direct(Target::imm(8)), Operand::direct(Target::rsp())],
                ));
                self.out.push(Instruction::meta(Meta::Postreturn));
                self.out.push(Instruction::new(
                    Op::Add,
                    vec![
                        Operand::direct(Target::imm(8 * func.params.len() as i64)),
                        Operand::direct(Target::rsp()),
                    ],
                ));
                if func.return_type != ast::Type::Void {
                    self.out.push(Instruction::new(Op::Push, vec![Operand::direct(Target::rrt())]));
                }
                Ok(())
            }
        }
    }
}
