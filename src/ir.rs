//! ILOC-style intermediate representation.
//!
//! This is passive data shared by both code generators (`codegen::stack`,
//! `codegen::register`), the allocator (`codegen::allocator`) and the
//! emitter (`codegen::emitter`). Nothing in this module walks the AST or
//! owns a symbol table; it only describes the shape of one instruction.

/// Opcode of an [`Instruction`].
///
/// `Je`..`Jge` double as condition codes: which variant is chosen is driven
/// directly by the comparison operator the front end parsed
/// (`BinOp::Lt` → `Jl`, etc. — see `codegen::binop_to_cond`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Move,
    Push,
    Pop,
    Call,
    Jmp,
    Label,
    Meta,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    Add,
    Sub,
    Mul,
    Div,
    Cmp,
}

impl Op {
    /// `true` for the arithmetic class `{ADD, SUB, MUL, DIV}` (spec §9:
    /// "be explicit that these are the only arithmetic ... classes").
    pub fn is_arith(self) -> bool {
        matches!(self, Op::Add | Op::Sub | Op::Mul | Op::Div)
    }

    /// `true` for the conditional-jump class `{JE, JNE, JL, JLE, JG, JGE}`.
    pub fn is_cond_jump(self) -> bool {
        matches!(
            self,
            Op::Je | Op::Jne | Op::Jl | Op::Jle | Op::Jg | Op::Jge
        )
    }
}

/// A meta-instruction: a placeholder the emitter expands into a fixed
/// multi-instruction x86-64 sequence. Meta instructions carry no operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Meta {
    Prolog,
    Epilog,
    Precall,
    Postreturn,
    Ret,
    CallPrintf,
}

/// Which architectural or virtual thing an [`Operand`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum T {
    /// Immediate integer literal.
    Imi,
    /// A label used as a memory/jump target operand.
    Mem,
    /// `%rbp`.
    Rbp,
    /// `%rsp`.
    Rsp,
    /// Return-value register, `%rax`.
    Rrt,
    /// Static-link scratch register, `%rdx`.
    Rsl,
    /// A virtual or (post-allocation) physical register.
    Reg,
    /// Reserved tag inherited from the source instruction set's operand
    /// vocabulary; no pass in this crate constructs a `Target` with this
    /// spec (CMP's operands are ordinary `Reg`/`Imi` targets, not a
    /// dedicated flags register).
    Cmp,
}

/// The concrete value carried by a [`Target`]: an immediate, a label, or a
/// register index. Architectural register targets (`Rbp`, `Rsp`, `Rrt`,
/// `Rsl`) carry no value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetVal {
    Imm(i64),
    Label(String),
    Reg(u32),
}

/// One operand's storage location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub spec: T,
    pub val: Option<TargetVal>,
}

impl Target {
    pub fn imm(v: i64) -> Target {
        Target {
            spec: T::Imi,
            val: Some(TargetVal::Imm(v)),
        }
    }

    pub fn label(name: impl Into<String>) -> Target {
        Target {
            spec: T::Mem,
            val: Some(TargetVal::Label(name.into())),
        }
    }

    pub fn reg(id: u32) -> Target {
        Target {
            spec: T::Reg,
            val: Some(TargetVal::Reg(id)),
        }
    }

    pub fn rbp() -> Target {
        Target {
            spec: T::Rbp,
            val: None,
        }
    }

    pub fn rsp() -> Target {
        Target {
            spec: T::Rsp,
            val: None,
        }
    }

    pub fn rrt() -> Target {
        Target {
            spec: T::Rrt,
            val: None,
        }
    }

    pub fn rsl() -> Target {
        Target {
            spec: T::Rsl,
            val: None,
        }
    }

    /// Register index if this target names a (virtual or physical) register.
    pub fn reg_id(&self) -> Option<u32> {
        match (&self.spec, &self.val) {
            (T::Reg, Some(TargetVal::Reg(r))) => Some(*r),
            _ => None,
        }
    }
}

/// Addressing mode applied on top of a [`Target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum M {
    /// Use the target directly (a register, an immediate, a label).
    Dir,
    /// Indirect-relative: `-8*offset(target)`, i.e. a frame-relative or
    /// spill-slot memory reference.
    Irl,
}

/// A fully resolved operand: a target plus its addressing mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operand {
    pub target: Target,
    pub mode: M,
    /// Signed offset in 8-byte units, only meaningful when `mode == Irl`.
    pub offset: i64,
}

impl Operand {
    pub fn direct(target: Target) -> Operand {
        Operand {
            target,
            mode: M::Dir,
            offset: 0,
        }
    }

    pub fn indirect(target: Target, offset: i64) -> Operand {
        Operand {
            target,
            mode: M::Irl,
            offset,
        }
    }

    pub fn reg_id(&self) -> Option<u32> {
        self.target.reg_id()
    }
}

/// One ILOC instruction: an opcode, up to three operands, and (for `Meta`)
/// the meta-instruction kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub args: Vec<Operand>,
    pub meta: Option<Meta>,
}

impl Instruction {
    pub fn new(op: Op, args: Vec<Operand>) -> Instruction {
        Instruction {
            op,
            args,
            meta: None,
        }
    }

    pub fn meta(meta: Meta) -> Instruction {
        Instruction {
            op: Op::Meta,
            args: Vec::new(),
            meta: Some(meta),
        }
    }

    pub fn label(name: impl Into<String>) -> Instruction {
        Instruction {
            op: Op::Label,
            args: vec![Operand::direct(Target::label(name))],
            meta: None,
        }
    }

    /// The label this `LABEL` instruction defines, if this is one.
    pub fn label_name(&self) -> Option<&str> {
        if self.op != Op::Label {
            return None;
        }
        match &self.args.first()?.target.val {
            Some(TargetVal::Label(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// `true` if any operand names a register (virtual or physical) — the
    /// allocator's "register-touching instruction" predicate (spec §4.6,
    /// phase 1).
    pub fn touches_register(&self) -> bool {
        self.args.iter().any(|a| a.reg_id().is_some())
    }
}
