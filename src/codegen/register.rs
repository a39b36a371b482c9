//! Register code generator (spec §4.5).
//!
//! Same AST traversal and high-level sequences as [`super::stack`], but
//! intermediate values live in a virtual-register arena instead of on the
//! hardware stack. Spec §4.5's `_reg_stack` ("operand stack of virtual
//! registers, replaces hardware stack pushes for intermediate values") is
//! realized here as ordinary Rust call/return — `gen_expression` returns
//! the virtual register id holding its result, which its caller consumes
//! directly — rather than a second, parallel runtime `Vec<u32>`; no IR
//! `PUSH`/`POP` is ever emitted for an intermediate value on this path
//! (only for values that must physically cross a call boundary: call
//! arguments and `print`'s operand, which `printf`/the callee's frame
//! layout require on the hardware stack regardless of backend).
//!
//! `_used_symbols`/`_symbol_restore` (spec §4.5) is the `scopes` stack of
//! [`ScopeFrame`]s below: entering a block snapshots and clears every
//! symbol's current `SR` binding (`Symbol::sr`), so a register cached in
//! an outer frame is never read across a trampoline boundary; exiting
//! drops the block's own bindings and restores the snapshot.

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

/// One function's worth of register-codegen output (spec §4.5: "nested
/// lists grouped per function, so intra-function control-flow analysis
/// can treat each function as an independent program block"). The
/// allocator (§4.6) builds one interference graph per entry.
pub type FunctionBlock = Vec<Instruction>;

pub fn generate(
    program: &Program,
    arena: &mut SymbolArena,
    annotations: &mut Annotations,
    labels: &mut LabelGen,
    index: &FunctionIndex,
) -> CompileResult<Vec<FunctionBlock>> {
    let mut gen = RegisterCodeGen {
        arena,
        annotations,
        labels,
        index,
        reg_count: 0,
        blocks: Vec::new(),
        cur: Vec::new(),
        function_stack: Vec::new(),
        body_stack: Vec::new(),
        active: Vec::new(),
        scopes: Vec::new(),
    };
    gen.gen_function(&program.main)?;
    Ok(gen.blocks)
}

struct ScopeFrame {
    saved: Vec<(SymbolTableId, String, u32)>,
    used: Vec<(SymbolTableId, String)>,
}

struct RegisterCodeGen<'a> {
    arena: &'a mut SymbolArena,
    annotations: &'a mut Annotations,
    labels: &'a mut LabelGen,
    index: &'a FunctionIndex<'a>,
    reg_count: u32,
    /// Completed function blocks, in emission order.
    blocks: Vec<FunctionBlock>,
    /// The function currently being built; moved into `blocks` when done.
    cur: FunctionBlock,
    function_stack: Vec<(ast::NodeId, usize)>,
    body_stack: Vec<ast::NodeId>,
    /// Every `(declaring table, name)` that currently has a live `SR`.
    active: Vec<(SymbolTableId, String)>,
    scopes: Vec<ScopeFrame>,
}

impl<'a> RegisterCodeGen<'a> {
    fn new_reg(&mut self) -> u32 {
        let r = self.reg_count;
        self.reg_count += 1;
        r
    }

    fn push(&mut self, insn: Instruction) {
        self.cur.push(insn);
    }

    fn reg_operand(r: u32) -> Operand {
        Operand::direct(Target::reg(r))
    }

    /// Spec §4.5's scope enter: snapshot and clear every currently-cached
    /// symbol's `SR`, push a fresh used-list.
    fn enter_scope(&mut self) {
        let saved: Vec<_> = self
            .active
            .iter()
            .map(|(t, n)| {
                let sr = self.arena.table(*t).get(n).and_then(|s| s.sr).expect("active implies cached");
                (*t, n.clone(), sr)
            })
            .collect();
        for (t, n, _) in &saved {
            self.arena.table_mut(*t).get_mut(n).unwrap().sr = None;
        }
        self.active.clear();
        self.scopes.push(ScopeFrame {
            saved,
            used: Vec::new(),
        });
    }

    /// Spec §4.5's scope exit: drop this block's own bindings, restore
    /// the snapshot taken on entry.
    fn exit_scope(&mut self) {
        let frame = self.scopes.pop().expect("enter/exit_scope are paired");
        for (t, n) in &frame.used {
            self.arena.table_mut(*t).get_mut(n).unwrap().sr = None;
        }
        self.active.clear();
        for (t, n, sr) in frame.saved {
            self.arena.table_mut(t).get_mut(&n).unwrap().sr = Some(sr);
            self.active.push((t, n));
        }
    }

    fn mark_cached(&mut self, table: SymbolTableId, name: &str, reg: u32) {
        self.arena.table_mut(table).get_mut(name).unwrap().sr = Some(reg);
        self.active.push((table, name.to_string()));
        if let Some(frame) = self.scopes.last_mut() {
            frame.used.push((table, name.to_string()));
        }
    }

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

    fn gen_nested_function_decls(&mut self, body: &Body) -> CompileResult<()> {
        for decl in &body.decls {
            if let Declaration::Function(df) = decl {
                self.gen_function(&df.function)?;
            }
        }
        Ok(())
    }

    fn gen_function(&mut self, func: &Function) -> CompileResult<()> {
        let scope = self.annotations.functions[&func.id]
            .symbol_table
            .expect("symbol collection ran first");
        let nvars = self.annotations.bodies[&func.body.id].number_of_variables;
        let (start, end) = self.ensure_function_labels(func);

        let saved_cur = std::mem::take(&mut self.cur);
        self.push(Instruction::label(start));
        self.push(Instruction::meta(Meta::Prolog));
        self.push(Instruction::new(
            Op::Sub,
            vec![
                Operand::direct(Target::imm(8 * nvars as i64)),
                Operand::direct(Target::rsp()),
            ],
        ));

        self.function_stack.push((func.id, nvars));
        let saved_body_stack = std::mem::take(&mut self.body_stack);
        self.enter_scope();

        self.prereg_nested_labels(&func.body);
        for stmt in &func.body.stm_list {
            self.gen_statement(stmt, scope)?;
        }

        self.exit_scope();
        self.body_stack = saved_body_stack;
        self.function_stack.pop();

        self.push(Instruction::label(end));
        self.push(Instruction::meta(Meta::Epilog));
        self.push(Instruction::meta(Meta::Ret));

        let block = std::mem::replace(&mut self.cur, saved_cur);
        self.blocks.push(block);

        self.gen_nested_function_decls(&func.body)
    }

    fn gen_trampoline(
        &mut self,
        body_id: ast::NodeId,
        enclosing_scope: SymbolTableId,
        body: &Body,
        run: impl FnOnce(&mut Self) -> CompileResult<()>,
    ) -> CompileResult<()> {
        let level = self.arena.level(enclosing_scope);
        emit_precall_tail(&mut self.cur, level, level);
        self.push(Instruction::new(
            Op::Sub,
            vec![
                Operand::direct(Target::imm(8)),
                Operand::direct(Target::rsp()),
            ],
        ));
        self.push(Instruction::meta(Meta::Prolog));

        let nvars = self.annotations.bodies[&body.id].number_of_variables;
        self.push(Instruction::new(
            Op::Sub,
            vec![
                Operand::direct(Target::imm(8 * nvars as i64)),
                Operand::direct(Target::rsp()),
            ],
        ));

        self.body_stack.push(body_id);
        self.enter_scope();
        self.prereg_nested_labels(body);
        run(self)?;
        self.exit_scope();
        self.body_stack.pop();

        self.push(Instruction::meta(Meta::Epilog));
        self.push(Instruction::new(
            Op::Add,
            vec![
                Operand::direct(Target::imm(8)),
                Operand::direct(Target::rsp()),
            ],
        ));
        self.push(Instruction::meta(Meta::Postreturn));

        self.gen_nested_function_decls(body)
    }

    fn gen_statement(&mut self, stmt: &Statement, scope: SymbolTableId) -> CompileResult<()> {
        match stmt {
            Statement::Assignment(a) => self.gen_assignment(a, scope),
            Statement::IfThenElse(ite) => {
                let cond = self.gen_expression(&ite.exp, scope)?;
                let zero = self.new_reg();
                self.push(Instruction::new(
                    Op::Move,
                    vec![Operand::direct(Target::imm(0)), Self::reg_operand(zero)],
                ));
                self.push(Instruction::new(
                    Op::Cmp,
                    vec![Self::reg_operand(cond), Self::reg_operand(zero)],
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

                self.push(Instruction::new(
                    Op::Je,
                    vec![Operand::direct(Target::label(else_label.clone()))],
                ));

                self.gen_trampoline(ite.id, scope, &ite.then, |g| {
                    let then_scope = g.annotations.ifs[&ite.id].symbol_table_then.unwrap();
                    for s in &ite.then.stm_list {
                        g.gen_statement(s, then_scope)?;
                    }
                    Ok(())
                })?;
                self.push(Instruction::new(
                    Op::Jmp,
                    vec![Operand::direct(Target::label(esle_label.clone()))],
                ));
                self.push(Instruction::label(else_label));

                if let Some(els) = &ite.els {
                    self.gen_trampoline(ite.id, scope, els, |g| {
                        let else_scope = g.annotations.ifs[&ite.id].symbol_table_else.unwrap();
                        for s in &els.stm_list {
                            g.gen_statement(s, else_scope)?;
                        }
                        Ok(())
                    })?;
                }
                self.push(Instruction::label(esle_label));
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

                self.gen_trampoline(w.id, scope, &w.body, |g| {
                    g.push(Instruction::label(while_label.clone()));
                    let cond = g.gen_expression(&w.exp, child)?;
                    let zero = g.new_reg();
                    g.push(Instruction::new(
                        Op::Move,
                        vec![Operand::direct(Target::imm(0)), Self::reg_operand(zero)],
                    ));
                    g.push(Instruction::new(
                        Op::Cmp,
                        vec![Self::reg_operand(cond), Self::reg_operand(zero)],
                    ));
                    g.push(Instruction::new(
                        Op::Je,
                        vec![Operand::direct(Target::label(elihw_label.clone()))],
                    ));
                    for s in &w.body.stm_list {
                        g.gen_statement(s, child)?;
                    }
                    g.push(Instruction::new(
                        Op::Jmp,
                        vec![Operand::direct(Target::label(while_label.clone()))],
                    ));
                    g.push(Instruction::label(elihw_label.clone()));
                    Ok(())
                })
            }
            Statement::For(f) => {
                let child = self.annotations.fors[&f.id].symbol_table.unwrap();
                let init_reg = self.gen_expression(&f.iter.init, scope)?;
                self.push(Instruction::new(Op::Push, vec![Self::reg_operand(init_reg)]));

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

                self.gen_trampoline(f.id, scope, &f.body, |g| {
                    let slot = symbol_operand(g.arena.lookup(child, &f.iter.name).unwrap().0);
                    g.push(Instruction::new(Op::Pop, vec![slot]));
                    g.push(Instruction::label(for_label.clone()));
                    let cond = g.gen_expression(&f.exp, child)?;
                    let zero = g.new_reg();
                    g.push(Instruction::new(
                        Op::Move,
                        vec![Operand::direct(Target::imm(0)), Self::reg_operand(zero)],
                    ));
                    g.push(Instruction::new(
                        Op::Cmp,
                        vec![Self::reg_operand(cond), Self::reg_operand(zero)],
                    ));
                    g.push(Instruction::new(
                        Op::Je,
                        vec![Operand::direct(Target::label(rof_label.clone()))],
                    ));
                    for s in &f.body.stm_list {
                        g.gen_statement(s, child)?;
                    }
                    g.gen_assignment(&f.assign, child)?;
                    g.push(Instruction::new(
                        Op::Jmp,
                        vec![Operand::direct(Target::label(for_label.clone()))],
                    ));
                    g.push(Instruction::label(rof_label.clone()));
                    Ok(())
                })
            }
            Statement::Print(p) => {
                let reg = self.gen_expression(&p.exp, scope)?;
                self.push(Instruction::new(Op::Push, vec![Self::reg_operand(reg)]));
                self.push(Instruction::meta(Meta::Precall));
                self.push(Instruction::meta(Meta::CallPrintf));
                self.push(Instruction::meta(Meta::Postreturn));
                Ok(())
            }
            Statement::Return(r) => {
                if let Some(e) = &r.exp {
                    let reg = self.gen_expression(e, scope)?;
                    self.push(Instruction::new(
                        Op::Move,
                        vec![Self::reg_operand(reg), Operand::direct(Target::rrt())],
                    ));
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
                    self.push(Instruction::new(
                        Op::Add,
                        vec![Operand::direct(Target::imm(disp)), Operand::direct(Target::rsp())],
                    ));
                    self.push(Instruction::new(
                        Op::Move,
                        vec![Operand::direct(Target::rsp()), Operand::direct(Target::rbp())],
                    ));
                }
                let (_, end) = self.ensure_function_labels(
                    self.index.get(self.function_stack.last().expect("return inside a function").0),
                );
                self.push(Instruction::new(Op::Jmp, vec![Operand::direct(Target::label(end))]));
                Ok(())
            }
        }
    }

    /// True iff `name` can be cached: non-escaping and declared in the
    /// current scope (spec §4.5: "one whose declaring scope differs from
    /// the current scope ... always go through the frame slot").
    fn cacheable(&self, scope: SymbolTableId, declaring_scope: SymbolTableId, escaping: bool) -> bool {
        !escaping && hops(self.arena.level(scope), self.arena.level(declaring_scope)) == 0
    }

    fn gen_assignment(&mut self, a: &StatementAssignment, scope: SymbolTableId) -> CompileResult<()> {
        let rhs_reg = self.gen_expression(&a.rhs, scope)?;
        let (sym, declaring_scope) = lookup_or_err(self.arena, scope, &a.lhs, a.lineno)?;
        let escaping = sym.escaping;
        let operand = symbol_operand(sym);

        if self.cacheable(scope, declaring_scope, escaping) {
            self.mark_cached(declaring_scope, &a.lhs, rhs_reg);
            return Ok(());
        }

        let steps = hops(self.arena.level(scope), self.arena.level(declaring_scope));
        self.cur.extend(static_link_walk(steps));
        self.push(Instruction::new(Op::Move, vec![Self::reg_operand(rhs_reg), operand]));
        Ok(())
    }

    fn gen_expression(&mut self, expr: &Expression, scope: SymbolTableId) -> CompileResult<u32> {
        match expr {
            Expression::Identifier { name, lineno } => {
                let (sym, declaring_scope) = lookup_or_err(self.arena, scope, name, *lineno)?;
                let escaping = sym.escaping;
                let cached = sym.sr;
                let operand = symbol_operand(sym);

                if self.cacheable(scope, declaring_scope, escaping) {
                    if let Some(r) = cached {
                        return Ok(r);
                    }
                    let r = self.new_reg();
                    self.push(Instruction::new(Op::Move, vec![operand, Self::reg_operand(r)]));
                    self.mark_cached(declaring_scope, name, r);
                    return Ok(r);
                }

                let steps = hops(self.arena.level(scope), self.arena.level(declaring_scope));
                self.cur.extend(static_link_walk(steps));
                let r = self.new_reg();
                self.push(Instruction::new(Op::Move, vec![operand, Self::reg_operand(r)]));
                Ok(r)
            }
            Expression::Integer { value, .. } => {
                let r = self.new_reg();
                self.push(Instruction::new(
                    Op::Move,
                    vec![Operand::direct(Target::imm(*value)), Self::reg_operand(r)],
                ));
                Ok(r)
            }
            Expression::Float { lineno, .. } => Err(crate::error::CompileError::codegen(
                *lineno,
                "Floats are not implemented, yet.",
            )),
            Expression::Binop { op, lhs, rhs, .. } if op.is_arith() => {
                let lhs_reg = self.gen_expression(lhs, scope)?;
                let rhs_reg = self.gen_expression(rhs, scope)?;
                let dst = self.new_reg();
                self.push(Instruction::new(Op::Move, vec![Self::reg_operand(lhs_reg), Self::reg_operand(dst)]));
                self.push(Instruction::new(
                    arith_op(*op),
                    vec![Self::reg_operand(rhs_reg), Self::reg_operand(dst)],
                ));
                Ok(dst)
            }
            Expression::Binop { op, lhs, rhs, .. } => {
                let lhs_reg = self.gen_expression(lhs, scope)?;
                let rhs_reg = self.gen_expression(rhs, scope)?;
                self.push(Instruction::new(
                    Op::Cmp,
                    vec![Self::reg_operand(rhs_reg), Self::reg_operand(lhs_reg)],
                ));
                let dst = self.new_reg();
                let (true_label, end_label) = (self.labels.next("true"), self.labels.next("end"));
                self.push(Instruction::new(
                    cmp_op(*op),
                    vec![Operand::direct(Target::label(true_label.clone()))],
                ));
                self.push(Instruction::new(
                    Op::Move,
                    vec![Operand::direct(Target::imm(0)), Self::reg_operand(dst)],
                ));
                self.push(Instruction::new(
                    Op::Jmp,
                    vec![Operand::direct(Target::label(end_label.clone()))],
                ));
                self.push(Instruction::label(true_label));
                self.push(Instruction::new(
                    Op::Move,
                    vec![Operand::direct(Target::imm(1)), Self::reg_operand(dst)],
                ));
                self.push(Instruction::label(end_label));
                Ok(dst)
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

                let mut arg_regs = Vec::with_capacity(args.len());
                for arg in args {
                    arg_regs.push(self.gen_expression(arg, scope)?);
                }
                for &r in arg_regs.iter().rev() {
                    self.push(Instruction::new(Op::Push, vec![Self::reg_operand(r)]));
                }
                emit_precall_tail(&mut self.cur, from_level, target_level);
                self.push(Instruction::new(Op::Call, vec![Operand::direct(Target::label(start))]));
                self.push(Instruction::new(
                    Op::Add,
                    vec![Operand::direct(Target::imm(8)), Operand::direct(Target::rsp())],
                ));
                self.push(Instruction::meta(Meta::Postreturn));
                self.push(Instruction::new(
                    Op::Add,
                    vec![
                        Operand::direct(Target::imm(8 * func.params.len() as i64)),
                        Operand::direct(Target::rsp()),
                    ],
                ));
                let dst = self.new_reg();
                if func.return_type != ast::Type::Void {
                    self.push(Instruction::new(
                        Op::Move,
                        vec![Operand::direct(Target::rrt()), Self::reg_operand(dst)],
                    ));
                }
                Ok(dst)
            }
        }
    }
}
