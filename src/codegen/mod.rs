//! x86-64 code generation.
//!
//! Two independent backends turn a desugared [`crate::ast::Program`] into
//! the same flat [`crate::ir::Instruction`] stream; an optional allocation
//! pass and a shared emitter finish the job from there.
//!
//! # Module structure
//!
//! - `support.rs`: helpers shared by both backends (operand construction,
//!   static-link frame walks, symbol lookup).
//! - `stack.rs`: the stack-machine backend. Every intermediate value lives
//!   on the unbounded hardware stack; no register pressure, no allocator.
//! - `register.rs`: the register backend. Expressions evaluate into fresh
//!   virtual registers, with non-escaping locals cached in a register
//!   across a lexical scope instead of reloaded from memory each time.
//! - `allocator.rs`: Chaitin-style graph coloring, run only over
//!   `register.rs`'s output, assigning each virtual register a physical
//!   slot (or a spill).
//! - `emitter.rs`: renders a colored instruction stream as AT&T-syntax
//!   x86-64 assembly text, expanding `PROLOG`/`EPILOG`/`PRECALL`/
//!   `POSTRETURN`/`RET`/`CALL_PRINTF` meta-instructions along the way.

pub mod allocator;
pub mod emitter;
pub mod register;
pub mod stack;
pub mod support;

use crate::annotations::Annotations;
use crate::ast::Program;
use crate::error::CompileResult;
use crate::index::FunctionIndex;
use crate::label::LabelGen;
use crate::symbols::SymbolArena;

/// Compile via the stack-machine backend straight through to assembly text.
pub fn compile_stack(
    program: &Program,
    arena: &SymbolArena,
    annotations: &mut Annotations,
    labels: &mut LabelGen,
    index: &FunctionIndex,
) -> CompileResult<String> {
    let instructions = stack::generate(program, arena, annotations, labels, index)?;
    Ok(emitter::emit(&instructions))
}

/// Compile via the register backend, run the allocator, then emit.
pub fn compile_register(
    program: &Program,
    arena: &mut SymbolArena,
    annotations: &mut Annotations,
    labels: &mut LabelGen,
    index: &FunctionIndex,
) -> CompileResult<String> {
    let blocks = register::generate(program, arena, annotations, labels, index)?;
    let instructions = allocator::allocate(blocks);
    Ok(emitter::emit(&instructions))
}
