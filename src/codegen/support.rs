//! Shared machinery used by both code generators: frame offset arithmetic,
//! operator-to-opcode mapping, and the `_precall` convention that `Call`,
//! `if`/`else`, `while`, and `for` all funnel through.
//!
//! # The `_precall` convention
//!
//! Spec §4.4 spells out the exact push sequence for a real call
//! (`_precall(exp_list, declared_level)`: push args, `PRECALL`, walk the
//! static link `declared_level` steps, `PUSH RSL`) and separately says the
//! `for` loop's initializer is "passed as a single-element argument list
//! through `_precall`" — i.e. `if`/`while`/`for` reuse the very same
//! helper a real `Call` uses, just with `declared_level` pinned to the
//! *current* scope's own level (zero static-link hops: the branch/loop is
//! lexically declared exactly where it appears) and an empty argument
//! list for `if`/`while`.
//!
//! Reusing one `_precall` for all four call sites also explains the `16`
//! coefficient in `StatementReturn`'s unwind arithmetic (spec §9): each
//! `if`/`while`/`for` trampoline pushes exactly 16 eight-byte slots of
//! overhead before its own locals — 8 caller-save registers (`PRECALL`),
//! 1 static-link word (`PUSH RSL`), 1 pseudo return address
//! (`SUB $8,RSP`), and 6 callee-save registers (`PROLOG`) — which is what
//! a `Return` nested inside `n` such trampolines has to add back before it
//! can safely `jmp` to the enclosing function's `end` label.

use crate::ast::BinOp;
use crate::error::{CompileError, CompileResult};
use crate::ir::{Instruction, Op, Operand, Target};
use crate::symbols::{Symbol, SymbolArena, SymbolKind, SymbolTableId};

/// `ADD`/`SUB`/`MUL`/`DIV` for the arithmetic operator class.
pub fn arith_op(op: BinOp) -> Op {
    match op {
        BinOp::Add => Op::Add,
        BinOp::Sub => Op::Sub,
        BinOp::Mul => Op::Mul,
        BinOp::Div => Op::Div,
        _ => unreachable!("arith_op called with a comparison operator"),
    }
}

/// `JE`/`JNE`/`JL`/`JLE`/`JG`/`JGE` for the comparison operator class.
///
/// Given the evaluation order `emit lhs; emit rhs; POP R1; POP R2` (R1 =
/// rhs, R2 = lhs) and `CMP R1,R2` (AT&T: flags = R2 - R1 = lhs - rhs), the
/// condition codes below map directly without flipping: `Jl` after that
/// `CMP` is true exactly when `lhs < rhs`.
pub fn cmp_op(op: BinOp) -> Op {
    match op {
        BinOp::Eq => Op::Je,
        BinOp::Ne => Op::Jne,
        BinOp::Lt => Op::Jl,
        BinOp::Le => Op::Jle,
        BinOp::Gt => Op::Jg,
        BinOp::Ge => Op::Jge,
        _ => unreachable!("cmp_op called with an arithmetic operator"),
    }
}

/// Local variable `k`'s frame slot, relative to `RSL` after the static
/// link walk (spec §3 frame-offset table).
pub fn local_var_operand(k: usize) -> Operand {
    Operand::indirect(Target::rsl(), (k as i64) + 1)
}

/// Parameter `k`'s frame slot, relative to `RSL` after the static link
/// walk.
pub fn parameter_operand(k: usize) -> Operand {
    Operand::indirect(Target::rsl(), -((k as i64) + 16))
}

/// The enclosing frame's ARP, stored at a fixed offset relative to the
/// current frame's `RSL`.
pub fn static_link_slot() -> Operand {
    Operand::indirect(Target::rsl(), -7)
}

/// The frame slot that holds `sym`'s value.
pub fn symbol_operand(sym: &Symbol) -> Operand {
    let k = sym
        .info
        .offset()
        .expect("variable/parameter symbols carry an offset");
    match sym.kind {
        SymbolKind::Parameter => parameter_operand(k),
        SymbolKind::Variable => local_var_operand(k),
        SymbolKind::Function => unreachable!("function symbols have no frame slot"),
    }
}

/// `MOVE RBP,RSL` followed by `steps` hops of `MOVE -7(RSL),RSL`, landing
/// `RSL` on the frame `steps` static-link levels above the current one.
pub fn static_link_walk(steps: usize) -> Vec<Instruction> {
    let mut v = Vec::with_capacity(steps + 1);
    v.push(Instruction::new(
        Op::Move,
        vec![Operand::direct(Target::rbp()), Operand::direct(Target::rsl())],
    ));
    for _ in 0..steps {
        v.push(Instruction::new(
            Op::Move,
            vec![static_link_slot(), Operand::direct(Target::rsl())],
        ));
    }
    v
}

/// Number of static-link hops from a use at `from_level` to a declaration
/// at `declaring_level`.
pub fn hops(from_level: usize, declaring_level: usize) -> usize {
    from_level.saturating_sub(declaring_level)
}

/// The `_precall` preamble shared by `Call`, `if`/`else`, `while`, and
/// `for` (see module docs): emits `META PRECALL`, walks the static link
/// from `from_level` to `target_level`, then pushes the parent ARP.
/// Argument pushes are the caller's responsibility (their evaluation
/// order/scope differs between a real call and a loop initializer), so
/// this only covers the parts every call site shares.
///
/// When `from_level == target_level` (the callee is declared exactly
/// where it's called — the `if`/`while`/`for` trampolines, or a direct
/// same-level call), the walk already lands `RSL` on the caller's own
/// frame, which *is* the parent ARP: push it directly. Otherwise the
/// walk lands on the frame at `target_level`, and the parent ARP is one
/// more static-link hop up from there: push `-7(RSL)` instead.
pub fn emit_precall_tail(out: &mut Vec<Instruction>, from_level: usize, target_level: usize) {
    out.push(Instruction::meta(crate::ir::Meta::Precall));
    let steps = hops(from_level, target_level);
    out.extend(static_link_walk(steps));
    let parent_arp = if steps == 0 {
        Operand::direct(Target::rsl())
    } else {
        static_link_slot()
    };
    out.push(Instruction::new(Op::Push, vec![parent_arp]));
}

/// Look up `name` and report an undefined-reference failure the same way
/// the reference compiler's lookup-failure path does (spec §3, §4.8): a
/// code-gen-phase error, since this is the phase that actually observes
/// the miss.
pub fn lookup_or_err<'a>(
    arena: &'a SymbolArena,
    scope: SymbolTableId,
    name: &str,
    lineno: usize,
) -> CompileResult<(&'a Symbol, SymbolTableId)> {
    arena
        .lookup(scope, name)
        .ok_or_else(|| CompileError::codegen(lineno, format!("Undefined identifier '{name}'.")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Same-level call (an `if`/`while`/`for` trampoline, or a direct
    /// call to a function declared in the caller's own scope): the
    /// static-link walk already lands `RSL` on the parent ARP, so it's
    /// pushed directly.
    #[test]
    fn precall_tail_pushes_rsl_directly_at_zero_hops() {
        let mut out = Vec::new();
        emit_precall_tail(&mut out, 1, 1);
        let last = out.last().unwrap();
        assert_eq!(last.op, Op::Push);
        assert_eq!(last.args, vec![Operand::direct(Target::rsl())]);
    }

    /// A call to a function declared in a strictly enclosing scope (spec
    /// §8 S3's recursive `fib`): the walk lands on the declaring frame,
    /// but the parent ARP to push is one more static-link hop up from
    /// there, at `-7(RSL)`.
    #[test]
    fn precall_tail_pushes_static_link_slot_when_hops_is_nonzero() {
        let mut out = Vec::new();
        emit_precall_tail(&mut out, 1, 0);
        let last = out.last().unwrap();
        assert_eq!(last.op, Op::Push);
        assert_eq!(last.args, vec![static_link_slot()]);
    }
}

