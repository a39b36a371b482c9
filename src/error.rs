//! Phase-tagged compiler errors.
//!
//! Every pass (lexer, parser, symbol collector, code generator) reports
//! failures through a single [`CompileError`], which the top-level driver
//! renders as the two-line diagnostic format the rest of the toolchain
//! expects and translates into a process exit code.

use std::fmt;

/// Which compilation phase raised an error.
///
/// `CodeGen`'s `Display` deliberately renders as `"code Generation"`
/// (lower-case `code`) to match the diagnostic text produced by the
/// reference compiler this crate's error messages are tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexical,
    Syntax,
    Symbol,
    CodeGen,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Lexical => "Lexical Analysis",
            Phase::Syntax => "Syntax Analysis",
            Phase::Symbol => "Symbol Collection",
            Phase::CodeGen => "code Generation",
        };
        write!(f, "{s}")
    }
}

/// A single fatal compiler error: the phase that raised it, the source
/// line it points at, and a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub phase: Phase,
    pub line: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(phase: Phase, line: usize, message: impl Into<String>) -> Self {
        CompileError {
            phase,
            line,
            message: message.into(),
        }
    }

    pub fn lexical(line: usize, message: impl Into<String>) -> Self {
        Self::new(Phase::Lexical, line, message)
    }

    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::new(Phase::Syntax, line, message)
    }

    pub fn symbol(line: usize, message: impl Into<String>) -> Self {
        Self::new(Phase::Symbol, line, message)
    }

    pub fn codegen(line: usize, message: impl Into<String>) -> Self {
        Self::new(Phase::CodeGen, line, message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\nError in phase {}, line {}:\n{}",
            self.phase, self.line, self.message
        )
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;
