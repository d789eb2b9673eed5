//! # Parser state and shared helpers
//!
//! The [`Parser`] struct owns the token stream and the cursor into it, plus
//! the panic-mode bookkeeping shared by every parsing rule. Declaration- and
//! statement-level grammar live here and in [`super::statement_parser`];
//! expression grammar lives in [`super::expression_parser`].

use crate::ast::nodes::*;
use crate::ast::types::Type;
use crate::compiler::error::CompileError;
use crate::compiler::lexer::{Token, TokenKind, is_sync_point};
use std::cell::Cell;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    panic_mode: bool,
    errors: Vec<CompileError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            panic_mode: false,
            errors: Vec::new(),
        }
    }

    // --- token stream primitives -------------------------------------

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
    }

    pub fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        tok
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, ()> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let tok = self.peek().clone();
            self.error_at(&tok, message);
            Err(())
        }
    }

    pub fn get_identifier(&mut self) -> Result<String, ()> {
        let tok = self.expect(TokenKind::Identifier, "Expect identifier.")?;
        Ok(tok.lexeme)
    }

    /// Records a diagnostic. Suppressed while already in panic mode so one
    /// syntax error per unsynchronized region is reported, as specified.
    pub fn error_at(&mut self, token: &Token, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.errors
            .push(CompileError::diagnostic(token.line, token.lexeme.clone(), message));
    }

    /// Advances past tokens until a declaration-starter keyword or EOF,
    /// leaving the parser able to resume at the next plausible top-level
    /// construct. Always consumes at least one token first: the erroring
    /// token can itself be a sync-point keyword that isn't a valid
    /// declaration starter (a stray top-level `if`/`while`/`return`), and
    /// returning without advancing would just re-error on it forever.
    pub fn synchronize(&mut self) {
        self.panic_mode = false;
        if self.is_at_end() {
            return;
        }
        self.advance();
        while !self.is_at_end() {
            if is_sync_point(self.peek_kind()) {
                return;
            }
            self.advance();
        }
    }

    pub fn line(&self) -> usize {
        self.previous().line
    }

    // --- type annotations ----------------------------------------------

    pub fn parse_type(&mut self) -> Result<Type, ()> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Void => Ok(Type::Void),
            TokenKind::KwInt => Ok(Type::Int),
            TokenKind::KwFloat => Ok(Type::Float),
            TokenKind::KwBNum => Ok(Type::BNum),
            TokenKind::KwBool => Ok(Type::Bool),
            TokenKind::KwString => Ok(Type::String),
            _ => {
                self.error_at(&tok, "Expect type name.");
                Err(())
            }
        }
    }

    // --- entry point and declarations -----------------------------------

    pub fn parse_storyworld(mut self) -> Result<Storyworld, Vec<CompileError>> {
        let mut declarations = Vec::new();
        while !self.is_at_end() {
            match self.parse_declaration() {
                Ok(decl) => declarations.push(decl),
                Err(()) => self.synchronize(),
            }
        }
        if self.errors.is_empty() {
            Ok(Storyworld { declarations })
        } else {
            Err(self.errors)
        }
    }

    fn parse_declaration(&mut self) -> Result<Declaration, ()> {
        if self.check(TokenKind::Globals) {
            self.parse_globals_block().map(Declaration::Globals)
        } else if self.check(TokenKind::Function) {
            self.parse_function_decl().map(Declaration::Function)
        } else {
            let tok = self.peek().clone();
            self.error_at(&tok, "Expect 'globals' or 'function' declaration.");
            Err(())
        }
    }

    fn parse_globals_block(&mut self) -> Result<GlobalsBlock, ()> {
        let start = self.advance(); // 'globals'
        let line = start.line;
        let mut vars = Vec::new();
        while !self.check(TokenKind::End) && !self.is_at_end() {
            vars.push(self.parse_var_decl()?);
        }
        self.expect(TokenKind::End, "Expect 'end' after globals block.")?;
        Ok(GlobalsBlock { vars, line })
    }

    pub fn parse_var_decl(&mut self) -> Result<VarDecl, ()> {
        let start = self.expect(TokenKind::Var, "Expect 'var'.")?;
        let name = self.get_identifier()?;
        self.expect(TokenKind::Colon, "Expect ':' after variable name.")?;
        let declared_type = self.parse_type()?;
        self.expect(TokenKind::Equal, "Expect '=' in variable declaration.")?;
        let initializer = self.parse_expression()?;
        Ok(VarDecl {
            name,
            declared_type,
            initializer,
            line: start.line,
        })
    }

    fn parse_function_decl(&mut self) -> Result<FunctionDecl, ()> {
        let start = self.advance(); // 'function'
        let line = start.line;
        let name = self.get_identifier()?;
        self.expect(TokenKind::LeftParen, "Expect '(' after function name.")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                let pname = self.get_identifier()?;
                self.expect(TokenKind::Colon, "Expect ':' after parameter name.")?;
                let ptoken = self.peek().clone();
                let pty = self.parse_type()?;
                if pty == Type::Void {
                    self.error_at(&ptoken, "A parameter cannot have type 'void'.");
                    return Err(());
                }
                params.push(Param { name: pname, ty: pty });
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "Expect ')' after parameters.")?;
        self.expect(TokenKind::Colon, "Expect ':' before return type.")?;
        let return_type = self.parse_type()?;
        let body = self.parse_block_until(&[TokenKind::End])?;
        self.expect(TokenKind::End, "Expect 'end' after function body.")?;
        Ok(FunctionDecl {
            name,
            params,
            return_type,
            body,
            line,
            chunk_index: Cell::new(None),
        })
    }

    pub fn parse_block_until(&mut self, terminators: &[TokenKind]) -> Result<Block, ()> {
        let line = self.peek().line;
        let mut statements = Vec::new();
        while !terminators.iter().any(|t| self.check(*t)) && !self.is_at_end() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => {
                    self.synchronize();
                    if terminators.iter().any(|t| self.check(*t)) || self.is_at_end() {
                        break;
                    }
                }
            }
        }
        Ok(Block { statements, line })
    }
}
