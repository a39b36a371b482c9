//! x86-64 SysV emitter (spec §4.7).
//!
//! Translates the flat, fully-colored ILOC stream (stack backend output,
//! or register backend output after [`super::allocator::allocate`]) into
//! AT&T-syntax assembly text. Three concerns live here that no earlier
//! pass touches: the physical-register naming table, meta-instruction
//! expansion (`PROLOG`/`EPILOG`/`PRECALL`/`POSTRETURN`/`RET`/
//! `CALL_PRINTF`), and spill-slot resolution for any color above 9.
//!
//! # Spill addressing
//!
//! A color in `1..=9` is one of the nine physical registers below. A
//! color above 9 never reaches the physical register file; it is a
//! stack slot carved out of the *current* frame, addressed
//! `%rbp`-relative exactly like an ordinary local variable (spec §3's
//! frame-offset convention), at the next free word past the function's
//! (or trampoline's) own locals. Because every `PROLOG`/trampoline-PROLOG
//! is always immediately followed by the fixed `SUB $(8*nvars),%rsp` that
//! the stack and register code generators both emit unconditionally
//! (spec §4.4, §4.5), the emitter learns `nvars` for the frame currently
//! on top of [`Emitter::frames`] simply by pattern-matching that
//! instruction as it streams past — no separate pass over the IR is
//! needed to compute it up front.
//!
//! Since each PROLOG resets `%rbp` to the current `%rsp`, and a register
//! id is only ever defined and used within the span of one
//! `PROLOG..EPILOG` nesting (register codegen's scope bookkeeping never
//! lets a temporary outlive the block that created it), tracking one
//! [`FrameSpill`] per currently-open `PROLOG` — not one per function — is
//! exactly the scoping the spilled addresses need.

use std::collections::HashMap;

use crate::ir::{Instruction, M, Meta, Op, Operand, T, TargetVal};

/// Physical register names for colors `1..=9`, in the fixed order spec
/// §4.7 lists them.
const PHYS: [&str; 9] = [
    "%rbx", "%rcx", "%rsi", "%rdi", "%r8", "%r9", "%r10", "%r12", "%r13",
];

/// The two scratch registers spill code routes through. Also the last two
/// entries `PROLOG`/`EPILOG` push/pop as callee-saved.
const SPILL_TMP_A: &str = "%r14";
const SPILL_TMP_B: &str = "%r15";

struct FrameSpill {
    /// Word count of this frame's own locals, learned from the `SUB
    /// $(8*nvars),%rsp` that always follows a `PROLOG`. `None` until that
    /// instruction has been seen.
    base_locals: Option<i64>,
    map: HashMap<u32, i64>,
    next_slot: i64,
}

impl FrameSpill {
    fn new() -> FrameSpill {
        FrameSpill {
            base_locals: None,
            map: HashMap::new(),
            next_slot: 0,
        }
    }
}

pub struct Emitter {
    lines: Vec<String>,
    frames: Vec<FrameSpill>,
    aligned_counter: usize,
}

impl Emitter {
    fn new() -> Emitter {
        Emitter {
            lines: Vec::new(),
            frames: Vec::new(),
            aligned_counter: 0,
        }
    }

    fn line(&mut self, s: impl Into<String>) {
        self.lines.push(format!("    {}", s.into()));
    }

    fn raw(&mut self, s: impl Into<String>) {
        self.lines.push(s.into());
    }

    /// Allocate (or recall) the `%rbp`-relative memory text for spilled
    /// color `id`. The first reference to a color always allocates,
    /// since every such color is first defined by a `MOVE` into a fresh
    /// virtual register before any other instruction can reference it
    /// (spec §4.5: code generation always introduces a register via a
    /// defining `MOVE`).
    fn spill_slot(&mut self, id: u32) -> String {
        let idx = self.frames.len() - 1;
        if let Some(&slot) = self.frames[idx].map.get(&id) {
            let base = self.frames[idx].base_locals.unwrap_or(0);
            return format!("{}(%rbp)", -8 * (base + 1 + slot));
        }
        let slot = self.frames[idx].next_slot;
        self.frames[idx].next_slot += 1;
        self.frames[idx].map.insert(id, slot);
        self.line("subq $8, %rsp");
        let base = self.frames[idx].base_locals.unwrap_or(0);
        format!("{}(%rbp)", -8 * (base + 1 + slot))
    }

    /// Render `t`'s text and whether it is a memory reference (spilled
    /// register, or a frame/static-link-relative operand) — the fact two
    /// ALU-class instructions can never both take a memory operand is
    /// what drives temp-register bridging below.
    fn resolve(&mut self, op: &Operand) -> (String, bool) {
        match op.mode {
            M::Dir => match (&op.target.spec, &op.target.val) {
                (T::Imi, Some(TargetVal::Imm(v))) => (format!("${v}"), false),
                (T::Mem, Some(TargetVal::Label(l))) => (l.clone(), false),
                (T::Rbp, _) => ("%rbp".to_string(), false),
                (T::Rsp, _) => ("%rsp".to_string(), false),
                (T::Rrt, _) => ("%rax".to_string(), false),
                (T::Rsl, _) => ("%rdx".to_string(), false),
                (T::Reg, Some(TargetVal::Reg(id))) if *id >= 1 && *id <= 9 => {
                    (PHYS[(*id - 1) as usize].to_string(), false)
                }
                (T::Reg, Some(TargetVal::Reg(id))) => (self.spill_slot(*id), true),
                (T::Reg, None) => unreachable!("every register the allocator touches is colored"),
                (T::Cmp, _) => unreachable!("no pass constructs a CMP-spec target operand"),
                _ => unreachable!("malformed direct operand"),
            },
            M::Irl => {
                let base = match op.target.spec {
                    T::Rbp => "%rbp",
                    T::Rsp => "%rsp",
                    T::Rrt => "%rax",
                    T::Rsl => "%rdx",
                    _ => unreachable!("indirect addressing only ever bases off an architectural register"),
                };
                (format!("{}({})", -8 * op.offset, base), true)
            }
        }
    }

    /// `movq src, dst`, bridging through a temp register if both sides
    /// resolved to memory (two spilled/frame operands can never appear
    /// together in one real `movq`).
    fn mem_safe_mov(&mut self, src: (String, bool), dst: (String, bool)) {
        let (src_text, src_mem) = src;
        let (dst_text, dst_mem) = dst;
        if src_mem && dst_mem {
            self.line(format!("movq {src_text}, {SPILL_TMP_A}"));
            self.line(format!("movq {SPILL_TMP_A}, {dst_text}"));
        } else {
            self.line(format!("movq {src_text}, {dst_text}"));
        }
    }

    /// `true` if this operand names a register the allocator left
    /// uncolored — a virtual register that never turned up in any
    /// live-in set, so phase 4 never gave it a node (spec §4.6).
    fn is_uncolored_reg(op: &Operand) -> bool {
        matches!((&op.target.spec, &op.target.val), (T::Reg, None))
    }

    /// Spec §4.7 dead-MOVE elimination: a `MOVE` touching an uncolored
    /// register carries no useful effect and is dropped whole rather than
    /// rendered.
    fn emit_move(&mut self, instr: &Instruction) {
        if Self::is_uncolored_reg(&instr.args[0]) || Self::is_uncolored_reg(&instr.args[1]) {
            return;
        }
        let src = self.resolve(&instr.args[0]);
        let dst = self.resolve(&instr.args[1]);
        self.mem_safe_mov(src, dst);
    }

    /// `ADD`/`SUB`/`MUL`: `op src, dst`, result in `dst`. Bridges through
    /// both temps only when both operands are memory.
    fn emit_alu(&mut self, mnemonic: &str, instr: &Instruction) {
        let (src_text, src_mem) = self.resolve(&instr.args[0]);
        let (dst_text, dst_mem) = self.resolve(&instr.args[1]);
        if src_mem && dst_mem {
            self.line(format!("movq {dst_text}, {SPILL_TMP_B}"));
            self.line(format!("movq {src_text}, {SPILL_TMP_A}"));
            self.line(format!("{mnemonic} {SPILL_TMP_A}, {SPILL_TMP_B}"));
            self.line(format!("movq {SPILL_TMP_B}, {dst_text}"));
        } else {
            self.line(format!("{mnemonic} {src_text}, {dst_text}"));
        }
    }

    fn emit_cmp(&mut self, instr: &Instruction) {
        let (a_text, a_mem) = self.resolve(&instr.args[0]);
        let (b_text, b_mem) = self.resolve(&instr.args[1]);
        if a_mem && b_mem {
            self.line(format!("movq {a_text}, {SPILL_TMP_A}"));
            self.line(format!("movq {b_text}, {SPILL_TMP_B}"));
            self.line(format!("cmpq {SPILL_TMP_A}, {SPILL_TMP_B}"));
        } else {
            self.line(format!("cmpq {a_text}, {b_text}"));
        }
    }

    /// `idivq`: dividend in `%rax`, quotient back out of `%rax` (spec
    /// §4.7). `args[0]` is the divisor, `args[1]` the dividend/destination
    /// — the same `src, dst` convention as `MOVE`/the ALU ops.
    fn emit_div(&mut self, instr: &Instruction) {
        let (divisor_text, _) = self.resolve(&instr.args[0]);
        let (dividend_text, _) = self.resolve(&instr.args[1]);
        self.line(format!("movq {dividend_text}, %rax"));
        self.raw("    cqto");
        if divisor_text.starts_with('$') {
            // idivq has no immediate form; bridge through a temp.
            self.line(format!("movq {divisor_text}, {SPILL_TMP_A}"));
            self.line(format!("idivq {SPILL_TMP_A}"));
        } else {
            self.line(format!("idivq {divisor_text}"));
        }
        self.line(format!("movq %rax, {dividend_text}"));
    }

    fn emit_push(&mut self, instr: &Instruction) {
        let (text, _) = self.resolve(&instr.args[0]);
        self.line(format!("pushq {text}"));
    }

    fn emit_pop(&mut self, instr: &Instruction) {
        let (text, _) = self.resolve(&instr.args[0]);
        self.line(format!("popq {text}"));
    }

    fn emit_jump(&mut self, mnemonic: &str, instr: &Instruction) {
        let (text, _) = self.resolve(&instr.args[0]);
        self.line(format!("{mnemonic} {text}"));
    }

    fn emit_call(&mut self, instr: &Instruction) {
        let (text, _) = self.resolve(&instr.args[0]);
        self.line(format!("callq {text}"));
    }

    fn emit_prolog(&mut self) {
        self.frames.push(FrameSpill::new());
        self.line("pushq %rbx");
        self.line("pushq %r12");
        self.line("pushq %r13");
        self.line("pushq %r14");
        self.line("pushq %r15");
        self.line("pushq %rbp");
        self.line("movq %rsp, %rbp");
    }

    fn emit_epilog(&mut self) {
        self.frames.pop().expect("PROLOG/EPILOG are paired");
        self.line("movq %rbp, %rsp");
        self.line("popq %rbp");
        self.line("popq %r15");
        self.line("popq %r14");
        self.line("popq %r13");
        self.line("popq %r12");
        self.line("popq %rbx");
    }

    fn emit_precall(&mut self) {
        for r in ["%rcx", "%rdx", "%rsi", "%rdi", "%r8", "%r9", "%r10", "%r11"] {
            self.line(format!("pushq {r}"));
        }
    }

    fn emit_postreturn(&mut self) {
        for r in ["%r11", "%r10", "%r9", "%r8", "%rdi", "%rsi", "%rdx", "%rcx"] {
            self.line(format!("popq {r}"));
        }
    }

    /// `printf("%d\n", <arg>)` with a runtime 16-byte stack-alignment
    /// check (spec §4.7): the `PRECALL` that always precedes this meta
    /// leaves 8 caller-saved pushes between the top of stack and the
    /// `print` argument, so the argument sits at `64(%rsp)`.
    fn emit_call_printf(&mut self) {
        let n = self.aligned_counter;
        self.aligned_counter += 1;
        self.raw("    leaq form(%rip), %rdi");
        self.line("movq 64(%rsp), %rsi");
        self.line("xorq %rax, %rax");
        self.line("movq %rsp, %rcx");
        self.line("andq $-16, %rsp");
        self.line("cmpq %rcx, %rsp");
        self.line(format!("je aligned_{n}"));
        self.line("movq $1, %r11");
        self.line(format!("jmp aligned_end_{n}"));
        self.raw(format!("aligned_{n}:"));
        self.line("movq $0, %r11");
        self.raw(format!("aligned_end_{n}:"));
        self.line("pushq %r11");
        self.line("subq $8, %rsp");
        self.line("callq printf@plt");
        self.line("addq $8, %rsp");
        self.line("popq %r11");
        self.line("cmpq $1, %r11");
        self.line(format!("jne aligned_done_{n}"));
        self.line("addq $8, %rsp");
        self.raw(format!("aligned_done_{n}:"));
        self.line("addq $8, %rsp");
    }

    fn emit_meta(&mut self, m: Meta) {
        match m {
            Meta::Prolog => self.emit_prolog(),
            Meta::Epilog => self.emit_epilog(),
            Meta::Precall => self.emit_precall(),
            Meta::Postreturn => self.emit_postreturn(),
            Meta::Ret => self.line("ret"),
            Meta::CallPrintf => self.emit_call_printf(),
        }
    }

    /// Learn the current frame's local-word count the first time the
    /// unconditional post-`PROLOG` `SUB $(8*nvars),%rsp` streams past, so
    /// later spill slots land right after the frame's own locals.
    fn maybe_capture_frame_locals(&mut self, instr: &Instruction) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        if frame.base_locals.is_some() {
            return;
        }
        if instr.op != Op::Sub {
            return;
        }
        let Some(TargetVal::Imm(v)) = &instr.args[0].target.val else {
            return;
        };
        if instr.args[1].target.spec != T::Rsp {
            return;
        }
        frame.base_locals = Some(v / 8);
    }

    fn emit_instruction(&mut self, instr: &Instruction) {
        self.maybe_capture_frame_locals(instr);
        match instr.op {
            Op::Move => self.emit_move(instr),
            Op::Push => self.emit_push(instr),
            Op::Pop => self.emit_pop(instr),
            Op::Call => self.emit_call(instr),
            Op::Jmp => self.emit_jump("jmp", instr),
            Op::Je => self.emit_jump("je", instr),
            Op::Jne => self.emit_jump("jne", instr),
            Op::Jl => self.emit_jump("jl", instr),
            Op::Jle => self.emit_jump("jle", instr),
            Op::Jg => self.emit_jump("jg", instr),
            Op::Jge => self.emit_jump("jge", instr),
            Op::Add => self.emit_alu("addq", instr),
            Op::Sub => self.emit_alu("subq", instr),
            Op::Mul => self.emit_alu("imulq", instr),
            Op::Div => self.emit_div(instr),
            Op::Cmp => self.emit_cmp(instr),
            Op::Label => {
                let name = instr.label_name().expect("LABEL instruction carries its own name");
                self.raw(format!("{name}:"));
            }
            Op::Meta => self.emit_meta(instr.meta.expect("META instruction carries its kind")),
        }
    }
}

/// Render a flat ILOC instruction stream as a complete x86-64 SysV
/// assembly file (spec §4.7's program prolog plus the instruction-by
/// -instruction translation).
pub fn emit(instructions: &[Instruction]) -> String {
    let mut e = Emitter::new();
    e.raw(".data");
    e.raw("form:");
    e.line(".string \"%d\\n\"");
    e.raw(".text");
    e.raw(".globl main");
    for instr in instructions {
        e.emit_instruction(instr);
    }
    let mut out = e.lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Meta, Op, Operand, Target};

    #[test]
    fn dead_move_to_uncolored_register_is_dropped() {
        let instr = Instruction::new(
            Op::Move,
            vec![
                Operand::direct(Target::imm(9)),
                Operand::direct(Target {
                    spec: T::Reg,
                    val: None,
                }),
            ],
        );
        let asm = emit(&[instr]);
        assert_eq!(asm.trim(), [".data", "form:", "    .string \"%d\\n\"", ".text", ".globl main"].join("\n"));
    }

    #[test]
    fn program_prolog_contains_data_and_text_sections() {
        let asm = emit(&[]);
        assert!(asm.contains(".data"));
        assert!(asm.contains("form:"));
        assert!(asm.contains(".string \"%d\\n\""));
        assert!(asm.contains(".text"));
        assert!(asm.contains(".globl main"));
    }

    #[test]
    fn physical_register_colors_render_by_fixed_table() {
        let instr = Instruction::new(
            Op::Move,
            vec![
                Operand::direct(Target::imm(5)),
                Operand::direct(Target::reg(1)),
            ],
        );
        let asm = emit(&[instr]);
        assert!(asm.contains("movq $5, %rbx"));
    }

    #[test]
    fn spilled_register_gets_rbp_relative_slot_past_locals() {
        let prolog = Instruction::meta(Meta::Prolog);
        let sub_locals = Instruction::new(
            Op::Sub,
            vec![
                Operand::direct(Target::imm(16)), // nvars = 2
                Operand::direct(Target::rsp()),
            ],
        );
        let define_spill = Instruction::new(
            Op::Move,
            vec![
                Operand::direct(Target::imm(9)),
                Operand::direct(Target::reg(10)),
            ],
        );
        let asm = emit(&[prolog, sub_locals, define_spill]);
        // nvars=2, so the first spill slot is at -8*(2+1+0) = -24(%rbp).
        assert!(asm.contains("subq $8, %rsp"));
        assert!(asm.contains("movq $9, -24(%rbp)"));
    }

    #[test]
    fn div_lowers_to_cqto_idivq_sequence() {
        let instr = Instruction::new(
            Op::Div,
            vec![
                Operand::direct(Target::reg(1)),
                Operand::direct(Target::reg(2)),
            ],
        );
        let asm = emit(&[instr]);
        assert!(asm.contains("cqto"));
        assert!(asm.contains("idivq %rbx"));
        assert!(asm.contains("movq %rax, %rcx"));
    }

    #[test]
    fn call_printf_reaches_past_caller_save_area() {
        let asm = emit(&[Instruction::meta(Meta::CallPrintf)]);
        assert!(asm.contains("movq 64(%rsp), %rsi"));
        assert!(asm.contains("callq printf@plt"));
    }

    /// The expansion must end with an unconditional `addq $8, %rsp` that
    /// removes the printed argument itself, separate from the conditional
    /// one that only undoes alignment padding — without it `%rsp` stays 8
    /// bytes low after every `print` (spec §8.7's frame-balance property).
    #[test]
    fn call_printf_removes_the_printed_argument_from_the_stack() {
        let asm = emit(&[Instruction::meta(Meta::CallPrintf)]);
        let lines: Vec<&str> = asm.lines().map(str::trim).collect();
        let done_idx = lines
            .iter()
            .position(|l| l.starts_with("aligned_done_"))
            .expect("aligned_done label present");
        assert_eq!(lines[done_idx + 1], "addq $8, %rsp");
    }

    #[test]
    fn prolog_epilog_push_and_pop_callee_saved_in_mirrored_order() {
        let asm = emit(&[Instruction::meta(Meta::Prolog), Instruction::meta(Meta::Epilog)]);
        let lines: Vec<&str> = asm.lines().map(str::trim).collect();
        assert_eq!(lines[0], "pushq %rbx");
        assert_eq!(lines[5], "pushq %rbp");
        assert_eq!(lines[6], "movq %rbp, %rsp");
        assert_eq!(lines[7], "popq %rbp");
        assert_eq!(lines[12], "popq %rbx");
    }
}
