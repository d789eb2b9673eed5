//! # Compiler module
//!
//! The core entry point and orchestrator. Aggregates the lexer, parser,
//! semantic checker, resolver, and the crate-level code generator, and
//! defines the [`Compiler`] struct that drives a source file from raw text
//! through to a [`CompiledUnit`] ready for the virtual machine.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod semantic;

use crate::codegen;
use crate::value::CompiledUnit;
use error::CompileError;
use lexer::Scanner;

/// Drives a storyworld source string through every frontend phase and
/// returns the artifact the virtual machine executes. Each phase can fail
/// with a batch of diagnostics; the first phase to fail stops the pipeline,
/// matching how the resolver and code generator both assume a storyworld
/// that already passed semantic checking.
pub fn compile(source: &str) -> Result<CompiledUnit, Vec<CompileError>> {
    let timer = crate::debug::PerfTimer::new("compile");
    crate::debug::log_compiler("starting compilation pipeline");
    let tokens = Scanner::tokenize_all(source);
    let storyworld = parser::parse(tokens)?;
    semantic::check(&storyworld)?;
    resolver::resolve(&storyworld)?;
    let unit = codegen::generate(&storyworld);
    timer.finish();
    unit
}

/// The central structure managing a storyworld's compilation. Thin by
/// design: the actual work lives in the phase modules above, `Compiler`
/// only remembers where the source came from.
pub struct Compiler {
    pub source_path: std::path::PathBuf,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            source_path: std::path::PathBuf::from("."),
        }
    }

    /// Reads `self.source_path` and compiles it to a [`CompiledUnit`].
    pub fn build(&self) -> Result<CompiledUnit, CompileError> {
        let content = std::fs::read_to_string(&self.source_path)?;
        compile(&content).map_err(|errors| {
            errors
                .into_iter()
                .next()
                .expect("a failing compile always reports at least one diagnostic")
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_trivial_storyworld() {
        let result = compile("function main(): void .print(1) end");
        assert!(result.is_ok());
    }

    #[test]
    fn reports_parse_errors() {
        let result = compile("function main(: void end");
        assert!(result.is_err());
    }

    #[test]
    fn recovers_from_a_stray_top_level_keyword_instead_of_looping_forever() {
        // `return` (and `if`/`while`) are recognized sync points but not
        // valid declaration starters, so recovery must skip past them.
        let result = compile("return");
        assert!(result.is_err());
    }

    #[test]
    fn reports_semantic_errors() {
        let result = compile("function main(): void end function main(): void end");
        assert!(result.is_err());
    }
}
