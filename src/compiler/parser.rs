//! # Parser
//!
//! Converts the token stream produced by the scanner into a [`Storyworld`]
//! AST. Declaration and statement parsing live in [`common`] and
//! [`statement_parser`]; Pratt-style expression parsing lives in
//! [`expression_parser`]. All three add `impl Parser` blocks to the single
//! [`common::Parser`] struct rather than splitting parsing across
//! free-standing helper types, since every rule needs the same token-stream
//! state.

pub mod common;
pub mod expression_parser;
pub mod statement_parser;

use crate::ast::nodes::Storyworld;
use crate::compiler::error::CompileError;
use crate::compiler::lexer::Token;
use common::Parser;

/// Parses a full token stream. Returns every diagnostic collected across
/// panic-mode regions; an empty `Storyworld` is never returned alongside
/// errors (`Err` means parsing produced no usable tree).
pub fn parse(tokens: Vec<Token>) -> Result<Storyworld, Vec<CompileError>> {
    crate::debug::log_parser(&format!("parsing {} tokens", tokens.len()));
    Parser::new(tokens).parse_storyworld()
}
