//! `-d/--debug` support: textual IR dumps.
//!
//! Graphviz rendering of the AST and symbol-table tree (spec §6's
//! `-d` description) is out of core scope — it has no bearing on
//! compilation semantics — and is not implemented here; this module only
//! covers the half spec §2 calls out as determined entirely by the
//! passive IR types: `NAME.stack.iloc` / `NAME.register.iloc` dumps of the
//! instruction stream that ran through the emitter.

use crate::ir::{Instruction, M, Meta, Op, T, TargetVal};

fn target_text(spec: T, val: &Option<TargetVal>) -> String {
    match (spec, val) {
        (T::Imi, Some(TargetVal::Imm(v))) => format!("IMI {v}"),
        (T::Mem, Some(TargetVal::Label(l))) => format!("MEM {l}"),
        (T::Reg, Some(TargetVal::Reg(r))) => format!("REG {r}"),
        (T::Rbp, _) => "RBP".to_string(),
        (T::Rsp, _) => "RSP".to_string(),
        (T::Rrt, _) => "RRT".to_string(),
        (T::Rsl, _) => "RSL".to_string(),
        (spec, _) => format!("{spec:?}"),
    }
}

fn operand_text(op: &crate::ir::Operand) -> String {
    let target = target_text(op.target.spec, &op.target.val);
    match op.mode {
        M::Dir => target,
        M::Irl => format!("[{target} -{}]", op.offset),
    }
}

fn meta_text(m: Meta) -> &'static str {
    match m {
        Meta::Prolog => "PROLOG",
        Meta::Epilog => "EPILOG",
        Meta::Precall => "PRECALL",
        Meta::Postreturn => "POSTRETURN",
        Meta::Ret => "RET",
        Meta::CallPrintf => "CALL_PRINTF",
    }
}

/// Render one instruction as one line, in roughly the shape spec §3
/// describes an `Instruction` (opcode plus up to three operands).
fn instruction_line(instr: &Instruction) -> String {
    if instr.op == Op::Label {
        return format!("{}:", instr.label_name().unwrap_or("?"));
    }
    if instr.op == Op::Meta {
        return format!("META {}", meta_text(instr.meta.expect("META carries its kind")));
    }
    let args: Vec<String> = instr.args.iter().map(operand_text).collect();
    format!("{:?} {}", instr.op, args.join(", "))
}

/// Dump a flat instruction stream as one line per instruction, matching
/// the `NAME.stack.iloc`/`NAME.register.iloc` artifact spec §6's `-d` flag
/// calls for.
pub fn dump_iloc(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for instr in instructions {
        out.push_str(&instruction_line(instr));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Operand, Target};

    #[test]
    fn labels_render_as_bare_colon_lines() {
        let dump = dump_iloc(&[Instruction::label("main")]);
        assert_eq!(dump.trim(), "main:");
    }

    #[test]
    fn meta_instructions_render_by_name() {
        let dump = dump_iloc(&[Instruction::meta(Meta::Prolog)]);
        assert_eq!(dump.trim(), "META PROLOG");
    }

    #[test]
    fn move_renders_both_operands() {
        let instr = Instruction::new(
            Op::Move,
            vec![
                Operand::direct(Target::imm(5)),
                Operand::direct(Target::reg(1)),
            ],
        );
        let dump = dump_iloc(&[instr]);
        assert!(dump.contains("IMI 5"));
        assert!(dump.contains("REG 1"));
    }
}
