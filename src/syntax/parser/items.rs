use crate::ast::*;
use crate::ir::IterationPolicy;
use crate::lexeme::Lexeme;
use crate::span::Spanned;

use super::Parser;

impl Parser {
    /// `stencil name(params) { blocks }`
    pub(super) fn parse_stencil(&mut self) -> StencilDef {
        self.expect(&Lexeme::Stencil);
        let name = self.expect_ident();

        self.expect(&Lexeme::LParen);
        let params = self.parse_params();
        self.expect(&Lexeme::RParen);

        self.expect(&Lexeme::LBrace);
        let mut blocks = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) {
            if self.at(&Lexeme::With) {
                blocks.push(self.parse_block());
            } else {
                self.error_with_help(
                    &format!(
                        "expected 'with computation(...)', found {}",
                        self.peek().description()
                    ),
                    "stages must be grouped in `with computation(PARALLEL), interval(...) { ... }`",
                );
                // Skip the offending statement.
                let start = self.pos;
                self.recover_to(&Lexeme::With);
                if self.pos == start {
                    self.advance();
                }
                if self.at(&Lexeme::Eof) {
                    break;
                }
            }
        }
        self.expect(&Lexeme::RBrace);

        StencilDef {
            name,
            params,
            blocks,
        }
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        while !self.at(&Lexeme::RParen) && !self.at(&Lexeme::Eof) {
            let name = self.expect_ident();
            self.expect(&Lexeme::Colon);
            let ty = self.parse_type();
            params.push(Param { name, ty });
            if !self.eat(&Lexeme::Comma) {
                break;
            }
        }
        params
    }

    /// `Field<f64>` or a bare scalar dtype.
    fn parse_type(&mut self) -> Spanned<Type> {
        let start = self.current_span();
        if self.eat(&Lexeme::FieldTy) {
            self.expect(&Lexeme::Lt);
            let dtype = self.expect_ident();
            self.expect(&Lexeme::Gt);
            let span = start.merge(self.prev_span());
            Spanned::new(Type::Field(dtype), span)
        } else {
            let dtype = self.expect_ident();
            Spanned::new(Type::Scalar(dtype.node), dtype.span)
        }
    }

    /// `with computation(POLICY), interval(...) { stages }`
    fn parse_block(&mut self) -> Spanned<Block> {
        let start = self.current_span();
        self.expect(&Lexeme::With);

        self.expect(&Lexeme::Computation);
        self.expect(&Lexeme::LParen);
        let policy_name = self.expect_ident();
        let policy = match IterationPolicy::from_name(&policy_name.node) {
            Some(p) => p,
            None => {
                self.diagnostics.push(
                    crate::diagnostic::Diagnostic::error(
                        format!("unknown iteration policy '{}'", policy_name.node),
                        policy_name.span,
                    )
                    .with_help("use PARALLEL, FORWARD or BACKWARD".to_string()),
                );
                IterationPolicy::Parallel
            }
        };
        let policy = Spanned::new(policy, policy_name.span);
        self.expect(&Lexeme::RParen);

        self.expect(&Lexeme::Comma);
        let interval = self.parse_interval();

        self.expect(&Lexeme::LBrace);
        let mut stages = Vec::new();
        while !self.at(&Lexeme::RBrace) && !self.at(&Lexeme::Eof) {
            let before = self.pos;
            stages.push(self.parse_stage());
            if self.pos == before {
                // No progress: skip the token so we cannot spin.
                self.advance();
            }
        }
        self.expect(&Lexeme::RBrace);

        let span = start.merge(self.prev_span());
        Spanned::new(
            Block {
                policy,
                interval,
                stages,
            },
            span,
        )
    }

    /// `interval(...)`, `interval(lo, hi)`, `interval(lo, None)`
    fn parse_interval(&mut self) -> Spanned<IntervalSpec> {
        let start = self.current_span();
        self.expect(&Lexeme::Interval);
        self.expect(&Lexeme::LParen);

        let spec = if self.eat(&Lexeme::Ellipsis) {
            IntervalSpec::Full
        } else {
            let lo = self.parse_level();
            self.expect(&Lexeme::Comma);
            let hi = if self.eat(&Lexeme::None) {
                None
            } else {
                Some(self.parse_level())
            };
            IntervalSpec::Levels { start: lo, end: hi }
        };

        self.expect(&Lexeme::RParen);
        let span = start.merge(self.prev_span());
        Spanned::new(spec, span)
    }

    /// A signed integer level.
    fn parse_level(&mut self) -> i64 {
        let negative = self.eat(&Lexeme::Minus);
        match self.peek().clone() {
            Lexeme::Integer(n) => {
                self.advance();
                let n = n.min(i32::MAX as u64) as i64;
                if negative {
                    -n
                } else {
                    n
                }
            }
            other => {
                self.error_with_help(
                    &format!("expected interval level, found {}", other.description()),
                    "interval bounds are integers, e.g. `interval(1, -1)` or `interval(0, None)`",
                );
                0
            }
        }
    }

    /// `target = value` with an optional trailing `;`.
    fn parse_stage(&mut self) -> Spanned<Assign> {
        let start = self.current_span();
        let target = self.parse_expr();
        if !self.at(&Lexeme::Eq) {
            self.error_with_help(
                &format!("expected '=', found {}", self.peek().description()),
                "each stage is an assignment `field = expression`",
            );
            self.recover_to(&Lexeme::Semicolon);
            self.eat(&Lexeme::Semicolon);
            let span = start.merge(self.prev_span());
            return Spanned::new(
                Assign {
                    value: target.clone(),
                    target,
                },
                span,
            );
        }
        self.advance();
        let value = self.parse_expr();
        self.eat(&Lexeme::Semicolon);
        let span = start.merge(value.span);
        Spanned::new(Assign { target, value }, span)
    }
}
