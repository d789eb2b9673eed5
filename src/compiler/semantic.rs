//! # Semantic checker
//!
//! Post-parse structural rules that don't need type information: exactly
//! one `globals` block, no duplicate global names (variables and functions
//! share one namespace), global initializers are literal constants, and
//! exactly one `main` function exists. Every violation is collected before
//! returning, the same way the resolver does.

use crate::ast::nodes::{Declaration, Expr, Storyworld};
use crate::compiler::error::CompileError;
use std::collections::HashSet;

pub fn check(storyworld: &Storyworld) -> Result<(), Vec<CompileError>> {
    let mut errors = Vec::new();
    let mut globals_blocks = 0;
    let mut seen_names: HashSet<&str> = HashSet::new();
    let mut main_count = 0;

    for decl in &storyworld.declarations {
        match decl {
            Declaration::Globals(block) => {
                globals_blocks += 1;
                if globals_blocks > 1 {
                    errors.push(CompileError::at_line(
                        block.line,
                        "Only one 'globals' block is allowed.",
                    ));
                }
                for var in &block.vars {
                    if !seen_names.insert(&var.name) {
                        errors.push(CompileError::diagnostic(
                            var.line,
                            &var.name,
                            format!("Duplicate global name '{}'.", var.name),
                        ));
                    }
                    if !is_literal(&var.initializer) {
                        errors.push(CompileError::at_line(
                            var.line,
                            format!(
                                "Global variable '{}' must be initialized with a literal constant.",
                                var.name
                            ),
                        ));
                    }
                }
            }
            Declaration::Function(f) => {
                if !seen_names.insert(&f.name) {
                    errors.push(CompileError::diagnostic(
                        f.line,
                        &f.name,
                        format!("Duplicate global name '{}'.", f.name),
                    ));
                }
                if f.name == "main" {
                    main_count += 1;
                }
            }
        }
    }

    if main_count == 0 {
        errors.push(CompileError::at_line(0, "A function named 'main' is required."));
    } else if main_count > 1 {
        errors.push(CompileError::at_line(0, "Duplicate function 'main'."));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_literal(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::IntLiteral(..)
            | Expr::FloatLiteral(..)
            | Expr::BNumLiteral(..)
            | Expr::BoolLiteral(..)
            | Expr::StringLiteral(..)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Scanner;
    use crate::compiler::parser::parse;

    fn parse_ok(src: &str) -> Storyworld {
        parse(Scanner::tokenize_all(src)).expect("parse should succeed")
    }

    #[test]
    fn requires_main() {
        let sw = parse_ok("function other(): void end");
        assert!(check(&sw).is_err());
    }

    #[test]
    fn rejects_non_literal_global_initializer() {
        let sw = parse_ok("globals x: int = 1 y: int = x end function main(): void end");
        assert!(check(&sw).is_err());
    }

    #[test]
    fn accepts_well_formed_program() {
        let sw = parse_ok("globals x: int = 1 end function main(): void end");
        assert!(check(&sw).is_ok());
    }
}
