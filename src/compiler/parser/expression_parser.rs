//! # Expression parser
//!
//! Pratt-style precedence-climbing parser. `canAssign` is threaded through
//! as "is the caller's minimum precedence at or below Assignment" rather
//! than a separate parameter stack, matching the single-pass style the rest
//! of this parser uses.

use super::common::Parser;
use crate::ast::nodes::*;
use crate::compiler::lexer::{Token, TokenKind};
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Precedence {
    None = 0,
    Assignment = 1,
    Or = 2,
    And = 3,
    Equality = 4,
    Comparison = 5,
    Term = 6,
    Factor = 7,
    Blend = 8,
    Unary = 9,
    Power = 10,
    Call = 11,
    Primary = 12,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Blend,
            Precedence::Blend => Precedence::Unary,
            Precedence::Unary => Precedence::Power,
            Precedence::Power => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

fn infix_precedence(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        Or => Precedence::Or,
        And => Precedence::And,
        EqualEqual | BangEqual => Precedence::Equality,
        Less | LessEqual | Greater | GreaterEqual => Precedence::Comparison,
        Plus | Minus => Precedence::Term,
        Star | Slash => Precedence::Factor,
        Tilde => Precedence::Blend,
        Caret => Precedence::Power,
        _ => Precedence::None,
    }
}

impl Parser {
    pub fn parse_expression(&mut self) -> Result<Expr, ()> {
        self.parse_precedence(Precedence::Assignment)
    }

    fn parse_precedence(&mut self, min_prec: Precedence) -> Result<Expr, ()> {
        let can_assign = min_prec <= Precedence::Assignment;
        let tok = self.advance();
        let mut left = self.parse_prefix(tok, can_assign)?;

        while infix_precedence(self.peek_kind()) >= min_prec {
            let op_tok = self.advance();
            left = self.parse_infix(left, op_tok)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self, tok: Token, can_assign: bool) -> Result<Expr, ()> {
        match tok.kind {
            TokenKind::IntLiteral => {
                let value: i64 = tok.lexeme.parse().map_err(|_| {
                    self.error_at(&tok, "Invalid integer literal.");
                })?;
                Ok(Expr::IntLiteral(value, tok.line))
            }
            TokenKind::FloatLiteral => {
                let value: f64 = tok.lexeme.parse().map_err(|_| {
                    self.error_at(&tok, "Invalid float literal.");
                })?;
                Ok(Expr::FloatLiteral(value, tok.line))
            }
            TokenKind::BNumLiteral => {
                let value: f64 = tok.lexeme.parse().map_err(|_| {
                    self.error_at(&tok, "Invalid bnum literal.");
                })?;
                if !(value > 0.0 && value < 1.0) {
                    self.error_at(&tok, "A bnum literal must satisfy 0 < v < 1.");
                    return Err(());
                }
                Ok(Expr::BNumLiteral(value, tok.line))
            }
            TokenKind::True => Ok(Expr::BoolLiteral(true, tok.line)),
            TokenKind::False => Ok(Expr::BoolLiteral(false, tok.line)),
            TokenKind::StringLiteral => Ok(Expr::StringLiteral(tok.lexeme.clone(), tok.line)),
            TokenKind::Identifier => {
                if can_assign && self.check(TokenKind::Equal) {
                    self.advance();
                    let value = self.parse_precedence(Precedence::Assignment)?;
                    Ok(Expr::Assignment(Assignment {
                        name: tok.lexeme.clone(),
                        value: Box::new(value),
                        line: tok.line,
                        resolved_type: RefCell::new(crate::ast::types::Type::Invalid),
                        binding: Cell::new(None),
                    }))
                } else if self.check(TokenKind::LeftParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RightParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.match_kind(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RightParen, "Expect ')' after call arguments.")?;
                    Ok(Expr::Call(FunctionCall {
                        callee: tok.lexeme.clone(),
                        args,
                        line: tok.line,
                        resolved_type: RefCell::new(crate::ast::types::Type::Invalid),
                    }))
                } else {
                    Ok(Expr::VarRef(VarRef {
                        name: tok.lexeme.clone(),
                        line: tok.line,
                        resolved_type: RefCell::new(crate::ast::types::Type::Invalid),
                        binding: Cell::new(None),
                    }))
                }
            }
            TokenKind::LeftParen => {
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "Expect ')' after expression.")?;
                Ok(inner)
            }
            TokenKind::Minus => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::Unary(Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(operand),
                    line: tok.line,
                }))
            }
            TokenKind::Plus => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::Unary(Unary {
                    op: UnaryOp::Plus,
                    operand: Box::new(operand),
                    line: tok.line,
                }))
            }
            TokenKind::Not => {
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::Unary(Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    line: tok.line,
                }))
            }
            TokenKind::KwInt | TokenKind::KwFloat | TokenKind::KwBNum | TokenKind::KwString => {
                self.parse_type_conversion(tok)
            }
            TokenKind::Dot => self.parse_builtin_call(tok),
            _ => {
                self.error_at(&tok, "Expect expression.");
                Err(())
            }
        }
    }

    fn parse_type_conversion(&mut self, tok: Token) -> Result<Expr, ()> {
        use crate::ast::nodes::ConversionTarget as CT;
        let target = match tok.kind {
            TokenKind::KwInt => CT::Int,
            TokenKind::KwFloat => CT::Float,
            TokenKind::KwBNum => CT::BNum,
            TokenKind::KwString => CT::String,
            _ => unreachable!(),
        };
        self.expect(TokenKind::LeftParen, "Expect '(' after conversion name.")?;
        let value = self.parse_expression()?;
        let default = if target != CT::String {
            self.expect(TokenKind::Comma, "Expect ',' before default value.")?;
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.expect(TokenKind::RightParen, "Expect ')' after conversion arguments.")?;
        Ok(Expr::TypeConversion(TypeConversion {
            target,
            value: Box::new(value),
            default,
            line: tok.line,
        }))
    }

    fn parse_builtin_call(&mut self, dot_tok: Token) -> Result<Expr, ()> {
        let name = self.get_identifier()?;
        if name != "print" {
            self.error_at(&dot_tok, &format!("Unknown built-in function '{name}'."));
            return Err(());
        }
        self.expect(TokenKind::LeftParen, "Expect '(' after built-in function name.")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::BuiltInCall(BuiltInCall {
            name,
            args,
            line: dot_tok.line,
        }))
    }

    fn parse_infix(&mut self, left: Expr, op: Token) -> Result<Expr, ()> {
        use crate::ast::nodes::BinaryOp as B;
        let prec = infix_precedence(op.kind);
        match op.kind {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star | TokenKind::Slash => {
                let right = self.parse_precedence(prec.next())?;
                let bop = match op.kind {
                    TokenKind::Plus => B::Add,
                    TokenKind::Minus => B::Subtract,
                    TokenKind::Star => B::Multiply,
                    TokenKind::Slash => B::Divide,
                    _ => unreachable!(),
                };
                Ok(Expr::Binary(Binary {
                    op: bop,
                    left: Box::new(left),
                    right: Box::new(right),
                    line: op.line,
                }))
            }
            TokenKind::Caret => {
                // Right-associative: recurse at the same precedence level.
                let right = self.parse_precedence(prec)?;
                Ok(Expr::Binary(Binary {
                    op: B::Power,
                    left: Box::new(left),
                    right: Box::new(right),
                    line: op.line,
                }))
            }
            TokenKind::EqualEqual
            | TokenKind::BangEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual => {
                let right = self.parse_precedence(prec.next())?;
                let bop = match op.kind {
                    TokenKind::EqualEqual => B::Equal,
                    TokenKind::BangEqual => B::NotEqual,
                    TokenKind::Less => B::Less,
                    TokenKind::LessEqual => B::LessEqual,
                    TokenKind::Greater => B::Greater,
                    TokenKind::GreaterEqual => B::GreaterEqual,
                    _ => unreachable!(),
                };
                Ok(Expr::Binary(Binary {
                    op: bop,
                    left: Box::new(left),
                    right: Box::new(right),
                    line: op.line,
                }))
            }
            TokenKind::And => {
                let right = self.parse_precedence(prec.next())?;
                Ok(Expr::And(ShortCircuit {
                    left: Box::new(left),
                    right: Box::new(right),
                    line: op.line,
                    jump_addr: Cell::new(None),
                }))
            }
            TokenKind::Or => {
                let right = self.parse_precedence(prec.next())?;
                Ok(Expr::Or(ShortCircuit {
                    left: Box::new(left),
                    right: Box::new(right),
                    line: op.line,
                    jump_addr: Cell::new(None),
                }))
            }
            TokenKind::Tilde => {
                let y = self.parse_precedence(Precedence::Unary)?;
                self.expect(TokenKind::Tilde, "Expect second '~' in blend expression.")?;
                let weight = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::Blend(Blend {
                    x: Box::new(left),
                    y: Box::new(y),
                    weight: Box::new(weight),
                    line: op.line,
                }))
            }
            _ => {
                self.error_at(&op, "Unexpected operator.");
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Scanner;
    use crate::compiler::parser::common::Parser as P;

    fn parse_expr(src: &str) -> Expr {
        let tokens = Scanner::tokenize_all(src);
        let mut parser = P::new(tokens);
        parser.parse_expression().expect("should parse")
    }

    #[test]
    fn power_is_right_associative() {
        // 2 ^ 3 ^ 2 should parse as 2 ^ (3 ^ 2).
        let expr = parse_expr("2 ^ 3 ^ 2");
        if let Expr::Binary(b) = expr {
            assert!(matches!(*b.right, Expr::Binary(_)));
        } else {
            panic!("expected Binary");
        }
    }

    #[test]
    fn addition_is_left_associative() {
        let expr = parse_expr("1 + 2 + 3");
        if let Expr::Binary(b) = expr {
            assert!(matches!(*b.left, Expr::Binary(_)));
        } else {
            panic!("expected Binary");
        }
    }

    #[test]
    fn blend_parses_three_operands() {
        let expr = parse_expr("x ~ y ~ 0.2");
        assert!(matches!(expr, Expr::Blend(_)));
    }
}
