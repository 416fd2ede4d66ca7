use crate::ast::*;
use crate::ir::{BinOp, UnaryOp};
use crate::lexeme::Lexeme;
use crate::span::Spanned;

use super::Parser;

/// Binding power of `not`: comparisons bind tighter.
const NOT_BP: u8 = 5;
/// Binding power of unary minus: `-x ** 2` is `-(x ** 2)`.
const NEG_BP: u8 = 13;

/// Returns (left binding power, right binding power) for a binary operator.
/// Higher binding power = higher precedence.
fn binding_power(op: BinOp) -> (u8, u8) {
    match op {
        BinOp::Or => (1, 2),
        BinOp::And => (3, 4),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (7, 8),
        BinOp::Add | BinOp::Sub => (9, 10),
        BinOp::Mul | BinOp::Div => (11, 12),
        BinOp::Pow => (16, 15), // right-associative
    }
}

impl Parser {
    /// Parse a full expression, including a trailing `if ... else ...`.
    pub(super) fn parse_expr(&mut self) -> Spanned<Expr> {
        if !self.enter_nesting() {
            let span = self.current_span();
            self.advance();
            return Spanned::new(Expr::Literal(Literal::Integer(0)), span);
        }

        let value = self.parse_expr_bp(0);
        let result = if self.eat(&Lexeme::If) {
            let cond = self.parse_expr_bp(0);
            self.expect(&Lexeme::Else);
            let otherwise = self.parse_expr();
            let span = value.span.merge(otherwise.span);
            Spanned::new(
                Expr::Conditional {
                    cond: Box::new(cond),
                    then: Box::new(value),
                    otherwise: Box::new(otherwise),
                },
                span,
            )
        } else {
            value
        };

        self.exit_nesting();
        result
    }

    fn parse_expr_bp(&mut self, min_bp: u8) -> Spanned<Expr> {
        let mut lhs = self.parse_prefix();

        loop {
            let op = match self.peek() {
                Lexeme::Or => BinOp::Or,
                Lexeme::And => BinOp::And,
                Lexeme::EqEq => BinOp::Eq,
                Lexeme::NotEq => BinOp::Ne,
                Lexeme::Lt => BinOp::Lt,
                Lexeme::LtEq => BinOp::Le,
                Lexeme::Gt => BinOp::Gt,
                Lexeme::GtEq => BinOp::Ge,
                Lexeme::Plus => BinOp::Add,
                Lexeme::Minus => BinOp::Sub,
                Lexeme::Star => BinOp::Mul,
                Lexeme::Slash => BinOp::Div,
                Lexeme::StarStar => BinOp::Pow,
                _ => break,
            };

            let (l_bp, r_bp) = binding_power(op);
            if l_bp < min_bp {
                break;
            }

            self.advance(); // consume operator
            let rhs = self.parse_expr_bp(r_bp);
            let span = lhs.span.merge(rhs.span);
            lhs = Spanned::new(
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }

        lhs
    }

    fn parse_prefix(&mut self) -> Spanned<Expr> {
        let start = self.current_span();
        let op = match self.peek() {
            Lexeme::Minus => Some((UnaryOp::Neg, NEG_BP)),
            Lexeme::Not => Some((UnaryOp::Not, NOT_BP)),
            Lexeme::Plus => {
                // Unary plus is a no-op.
                self.advance();
                return self.parse_prefix();
            }
            _ => None,
        };

        match op {
            Some((op, bp)) => {
                self.advance();
                let operand = self.parse_expr_bp(bp);
                let span = start.merge(operand.span);
                Spanned::new(
                    Expr::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                )
            }
            None => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Spanned<Expr> {
        let start = self.current_span();

        match self.peek().clone() {
            Lexeme::Integer(n) => {
                self.advance();
                Spanned::new(Expr::Literal(Literal::Integer(n)), start)
            }
            Lexeme::Float(v) => {
                self.advance();
                Spanned::new(Expr::Literal(Literal::Float(v)), start)
            }
            Lexeme::True => {
                self.advance();
                Spanned::new(Expr::Literal(Literal::Bool(true)), start)
            }
            Lexeme::False => {
                self.advance();
                Spanned::new(Expr::Literal(Literal::Bool(false)), start)
            }
            Lexeme::LParen => {
                self.advance();
                let inner = self.parse_expr();
                self.expect(&Lexeme::RParen);
                let span = start.merge(self.prev_span());
                Spanned::new(inner.node, span)
            }
            Lexeme::Ident(name) => {
                self.advance();
                let name = Spanned::new(name, start);
                if self.at(&Lexeme::LParen) {
                    self.advance();
                    let args = self.parse_call_args();
                    self.expect(&Lexeme::RParen);
                    let span = start.merge(self.prev_span());
                    Spanned::new(Expr::Call { func: name, args }, span)
                } else if self.at(&Lexeme::LBracket) {
                    self.advance();
                    let mut offsets = Vec::new();
                    while !self.at(&Lexeme::RBracket) && !self.at(&Lexeme::Eof) {
                        offsets.push(self.parse_expr());
                        if !self.eat(&Lexeme::Comma) {
                            break;
                        }
                    }
                    self.expect(&Lexeme::RBracket);
                    let span = start.merge(self.prev_span());
                    Spanned::new(Expr::Index { name, offsets }, span)
                } else {
                    Spanned::new(Expr::Name(name.node), start)
                }
            }
            _ => {
                self.error_with_help(
                    &format!("expected expression, found {}", self.peek().description()),
                    "expressions include literals (1.5), fields (u[1, 0, 0]), scalars, calls, and operators",
                );
                if !self.at(&Lexeme::RBrace) {
                    self.advance();
                }
                Spanned::new(Expr::Literal(Literal::Integer(0)), start)
            }
        }
    }

    fn parse_call_args(&mut self) -> Vec<Spanned<Expr>> {
        let mut args = Vec::new();
        while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
            args.push(self.parse_expr());
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        args
    }
}
