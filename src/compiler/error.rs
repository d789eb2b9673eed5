//! # Error taxonomy
//!
//! Three error families, matching the three failure modes the pipeline can
//! hit: [`CompileError`] for diagnostics collected while reading a source
//! file (scanner, parser, semantic checker, resolver), [`InternalError`] for
//! invariants the frontend was supposed to have already established, and
//! [`RuntimeError`] for VM faults. All three are plain `thiserror` enums, the
//! way the rest of this crate reports failures.

use thiserror::Error;

/// A compile-time diagnostic: scanner error token, parse error, semantic
/// rule violation, or unresolved name. Always carries a source line; the
/// lexeme is the token text the diagnostic is anchored to (empty string for
/// diagnostics not anchored to a specific token, e.g. "missing `main`").
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("[line {line}] Error at '{lexeme}': {message}")]
    Diagnostic {
        line: usize,
        lexeme: String,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn diagnostic(line: usize, lexeme: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::Diagnostic {
            line,
            lexeme: lexeme.into(),
            message: message.into(),
        }
    }

    /// Convenience for diagnostics with no single anchoring lexeme.
    pub fn at_line(line: usize, message: impl Into<String>) -> Self {
        Self::diagnostic(line, "", message)
    }
}

/// An invariant the frontend should have already guaranteed (unknown
/// operator lexeme reaching codegen, missing global after the resolver
/// reported success, and so on). Reaching one of these is a bug in this
/// crate, not in the source program, so it is reported distinctly from
/// [`CompileError`] and aborts compilation immediately rather than being
/// collected.
#[derive(Error, Debug)]
#[error("Internal compiler error: {0}")]
pub struct InternalError(pub String);

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        InternalError(message.into())
    }
}

/// A fault raised by the VM while executing a compiled unit: an opcode saw
/// an operand of the wrong type, a conversion default didn't match the
/// target type, or similar. Always carries the source line of the
/// instruction that faulted (via the chunk's debug info).
#[derive(Error, Debug)]
#[error("[line {line}] {message}")]
pub struct RuntimeError {
    pub line: usize,
    pub message: String,
}

impl RuntimeError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        RuntimeError {
            line,
            message: message.into(),
        }
    }
}
