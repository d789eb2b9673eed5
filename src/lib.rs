//! # Romualdo compiler and virtual machine
//!
//! A compiler and bytecode virtual machine for a small statically-typed
//! scripting language used to author interactive narratives. The pipeline
//! is: scan -> parse -> semantic check -> resolve -> generate -> execute.
//! See [`compiler::compile`] for the frontend and [`vm::run`] for
//! execution.

pub mod ast;
pub mod bytecode;
pub mod codegen;
pub mod compiler;
pub mod debug;
pub mod persist;
pub mod value;
pub mod vm;

pub use compiler::compile;
pub use compiler::error::{CompileError, InternalError, RuntimeError};

/// Compiles `source` and runs it to completion, writing `print` output to
/// `out`. Returns the process exit status the run implies.
pub fn compile_and_run(source: &str, out: &mut dyn std::io::Write) -> Result<i32, CompileAndRunError> {
    let mut unit = compiler::compile(source).map_err(CompileAndRunError::Compile)?;
    vm::run(&mut unit, out).map_err(CompileAndRunError::Exec)
}

#[derive(Debug)]
pub enum CompileAndRunError {
    Compile(Vec<CompileError>),
    Exec(vm::ExecError),
}

impl std::fmt::Display for CompileAndRunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileAndRunError::Compile(errors) => {
                for e in errors {
                    writeln!(f, "{e}")?;
                }
                Ok(())
            }
            CompileAndRunError::Exec(e) => write!(f, "{e}"),
        }
    }
}
