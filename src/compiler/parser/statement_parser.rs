//! # Statement parser
//!
//! Recursive-descent rules for everything inside a function body: variable
//! declarations, `if`/`elseif`/`else`, `while`, bare `do...end` blocks, and
//! expression statements (which also covers `.print(...)` built-in calls,
//! since those are ordinary expressions that happen to have type `void`).

use super::common::Parser;
use crate::ast::nodes::*;
use crate::compiler::lexer::TokenKind;
use std::cell::Cell;

impl Parser {
    pub fn parse_statement(&mut self) -> Result<Stmt, ()> {
        match self.peek_kind() {
            TokenKind::Var => self.parse_var_decl().map(Stmt::VarDecl),
            TokenKind::If => self.parse_if_stmt().map(Stmt::If),
            TokenKind::While => self.parse_while_stmt().map(Stmt::While),
            TokenKind::Do => self.parse_do_block().map(Stmt::Block),
            _ => {
                let line = self.peek().line;
                let expr = self.parse_expression()?;
                Ok(Stmt::ExpressionStmt(expr, line))
            }
        }
    }

    fn parse_do_block(&mut self) -> Result<Block, ()> {
        self.advance(); // 'do'
        let block = self.parse_block_until(&[TokenKind::End])?;
        self.expect(TokenKind::End, "Expect 'end' after 'do' block.")?;
        Ok(block)
    }

    fn parse_while_stmt(&mut self) -> Result<WhileStmt, ()> {
        let start = self.advance(); // 'while'
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Do, "Expect 'do' after while condition.")?;
        let body = self.parse_block_until(&[TokenKind::End])?;
        self.expect(TokenKind::End, "Expect 'end' after while body.")?;
        Ok(WhileStmt {
            condition,
            body,
            line: start.line,
            loop_start: Cell::new(None),
            exit_jump_addr: Cell::new(None),
        })
    }

    fn parse_if_stmt(&mut self) -> Result<IfStmt, ()> {
        self.advance(); // 'if'
        self.parse_if_tail(true)
    }

    /// Parses condition/then/[elseif-chain|else] for one `if` or `elseif`
    /// level. Only the outermost call (`is_top`) consumes the closing
    /// `end`; nested `elseif`s share the same terminating `end`.
    fn parse_if_tail(&mut self, is_top: bool) -> Result<IfStmt, ()> {
        let line = self.line();
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Then, "Expect 'then' after condition.")?;
        let then_branch =
            self.parse_block_until(&[TokenKind::Elseif, TokenKind::Else, TokenKind::End])?;

        let else_branch = if self.match_kind(TokenKind::Elseif) {
            Some(ElseBranch::If(Box::new(self.parse_if_tail(false)?)))
        } else if self.match_kind(TokenKind::Else) {
            let block = self.parse_block_until(&[TokenKind::End])?;
            Some(ElseBranch::Block(block))
        } else {
            None
        };

        if is_top {
            self.expect(TokenKind::End, "Expect 'end' after 'if' statement.")?;
        }

        Ok(IfStmt {
            condition,
            then_branch,
            else_branch,
            line,
            then_skip_addr: Cell::new(None),
            end_skip_addr: Cell::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::lexer::Scanner;
    use crate::compiler::parser::parse;

    #[test]
    fn if_elseif_else_shares_one_end() {
        let src = "function main(): void\nif 1<2 then .print(\"a\") elseif 2<3 then .print(\"b\") else .print(\"c\") end\nend";
        let tokens = Scanner::tokenize_all(src);
        let sw = parse(tokens).expect("should parse");
        assert_eq!(sw.declarations.len(), 1);
    }

    #[test]
    fn while_loop_parses() {
        let src = "function main(): void\ndo var i: int = 0 while i<3 do .print(i) i = i+1 end end\nend";
        let tokens = Scanner::tokenize_all(src);
        assert!(parse(tokens).is_ok());
    }
}
