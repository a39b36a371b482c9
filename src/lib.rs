//! Panda Compiler Library
//!
//! Compiles Panda source to x86-64 SysV assembly text. The pipeline is
//! fixed and single-threaded: lex, parse, collect symbols, desugar, run
//! one of two code generators, optionally allocate registers, then emit.
//!
//! `main.rs` is a thin shell around [`compile_source`]/[`compile_file`],
//! the way the teacher's `seqc` binary is a thin shell around
//! `seqc::compile_file_with_config`.

pub mod annotations;
pub mod ast;
pub mod codegen;
pub mod collector;
pub mod debug;
pub mod desugar;
pub mod error;
pub mod index;
pub mod ir;
pub mod label;
pub mod lexer;
pub mod parser;
pub mod symbols;
pub mod test_runner;

pub use ast::Program;
pub use error::{CompileError, CompileResult, Phase};

use index::FunctionIndex;
use ir::Instruction;
use label::LabelGen;

/// Compile a Panda source string to assembly text.
///
/// `use_stack` selects spec §4.4's stack-machine backend; otherwise the
/// register backend (§4.5) followed by the allocator (§4.6) runs.
pub fn compile_source(source: &str, use_stack: bool) -> CompileResult<String> {
    Ok(compile_source_with_ir(source, use_stack)?.0)
}

/// Same pipeline as [`compile_source`], but also returns the flat IR
/// stream that fed the emitter — the `-d/--debug` flag's
/// `NAME.{stack|register}.iloc` dump (spec §6) needs it, and `compile_source`
/// alone has no way to hand it back out since the emitter consumes it.
pub fn compile_source_with_ir(
    source: &str,
    use_stack: bool,
) -> CompileResult<(String, Vec<Instruction>)> {
    let tokens = lexer::tokenize(source)?;
    let program = parser::parse(tokens)?;

    let collector::CollectResult {
        mut arena,
        mut annotations,
        root: _root,
    } = collector::collect(&program)?;

    let desugared = desugar::desugar(&program);
    let index = FunctionIndex::build(&desugared);
    let mut labels = LabelGen::new();

    let instructions = if use_stack {
        codegen::stack::generate(&desugared, &arena, &mut annotations, &mut labels, &index)?
    } else {
        let blocks = codegen::register::generate(&desugared, &mut arena, &mut annotations, &mut labels, &index)?;
        codegen::allocator::allocate(blocks)
    };
    let asm = codegen::emitter::emit(&instructions);
    Ok((asm, instructions))
}

/// Compile the Panda source at `path` to assembly text.
///
/// File I/O failures are reported as plain strings rather than
/// [`CompileError`], since they never carry a compile phase (spec §7's
/// four error kinds are all about source content, not the filesystem).
pub fn compile_file(path: &std::path::Path, use_stack: bool) -> Result<String, String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    compile_source(&source, use_stack).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_literal_arithmetic_emits_a_printf_call() {
        let asm = compile_source("print(1+2*3);", false).unwrap();
        assert!(asm.contains("callq printf@plt"));
        assert!(asm.contains(".globl main"));
    }

    #[test]
    fn compile_source_with_ir_returns_the_same_assembly_as_compile_source() {
        let (asm, instructions) = compile_source_with_ir("print(1+2*3);", false).unwrap();
        assert_eq!(asm, compile_source("print(1+2*3);", false).unwrap());
        assert!(!instructions.is_empty());
    }

    #[test]
    fn stack_and_register_backends_both_compile_the_same_program() {
        let src = "int x; x = 10; while (x > 0) { print(x); x = x - 1; }";
        assert!(compile_source(src, true).is_ok());
        assert!(compile_source(src, false).is_ok());
    }

    #[test]
    fn n1_duplicate_declaration_is_a_symbol_collection_error() {
        let err = compile_source("int x; int x;", false).unwrap_err();
        assert_eq!(err.phase, Phase::Symbol);
        assert_eq!(err.line, 1);
        assert_eq!(err.message, "Redeclaration of function 'x' in the same scope.");
    }

    #[test]
    fn n2_float_literal_is_a_codegen_error() {
        let err = compile_source("print(1.0);", false).unwrap_err();
        assert_eq!(err.phase, Phase::CodeGen);
        assert_eq!(err.message, "Floats are not implemented, yet.");
    }

    #[test]
    fn n3_missing_operand_is_a_syntax_error() {
        let err = compile_source("1 + ;", false).unwrap_err();
        assert_eq!(err.phase, Phase::Syntax);
        assert_eq!(err.line, 1);
        assert_eq!(err.message, "Problem detected at ';'.");
    }

    #[test]
    fn s3_recursive_function_compiles_under_both_backends() {
        let src = "int fib(int n) { if (n < 2) { return n; } else { return fib(n-1)+fib(n-2); } } print(fib(10));";
        assert!(compile_source(src, true).is_ok());
        assert!(compile_source(src, false).is_ok());
    }

    #[test]
    fn s6_escaping_local_compiles_under_both_backends() {
        let src = "int outer() { int a; a = 7; int inner() { return a + 1; } return inner(); } print(outer());";
        assert!(compile_source(src, true).is_ok());
        assert!(compile_source(src, false).is_ok());
    }

    #[test]
    fn compile_file_reports_missing_file_as_a_plain_string_error() {
        let err = compile_file(std::path::Path::new("/nonexistent/panda/source.pd"), false).unwrap_err();
        assert!(err.contains("/nonexistent/panda/source.pd"));
    }
}
