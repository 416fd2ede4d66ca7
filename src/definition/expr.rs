use crate::ast::{self, Literal};
use crate::diagnostic::Diagnostic;
use crate::ir::{Expr, MathFn, Offset, ParamKind, UnaryOp};
use crate::span::{Span, Spanned};

use super::Lowerer;

/// Static type of a lowered expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Ty {
    Num,
    Bool,
}

impl Ty {
    fn name(self) -> &'static str {
        match self {
            Ty::Num => "a number",
            Ty::Bool => "a boolean",
        }
    }
}

/// Largest accepted offset magnitude. Halos wider than this are almost
/// certainly typos and would make allocations explode.
const MAX_OFFSET: u64 = 1 << 16;

impl Lowerer {
    /// Lower a stage's right-hand side, which must be numeric.
    pub(super) fn lower_value(&mut self, expr: &Spanned<ast::Expr>) -> Option<Expr> {
        let (value, ty) = self.lower_expr(expr)?;
        self.expect_ty(ty, Ty::Num, expr.span, "a stage value")?;
        Some(value)
    }

    fn lower_expr(&mut self, expr: &Spanned<ast::Expr>) -> Option<(Expr, Ty)> {
        match &expr.node {
            ast::Expr::Literal(Literal::Integer(n)) => Some((Expr::Literal(*n as f64), Ty::Num)),
            ast::Expr::Literal(Literal::Float(v)) => Some((Expr::Literal(*v), Ty::Num)),
            ast::Expr::Literal(Literal::Bool(b)) => Some((Expr::Bool(*b), Ty::Bool)),

            ast::Expr::Name(name) => self.lower_name(name, expr.span),

            ast::Expr::Index { name, offsets } => {
                match self.params.get(&name.node).map(|p| p.kind) {
                    Some(ParamKind::Field) => {}
                    Some(ParamKind::Scalar) => {
                        self.diagnostics.push(
                            Diagnostic::error(
                                format!("scalar parameter '{}' cannot be indexed", name.node),
                                expr.span,
                            )
                            .with_help("only fields carry neighbor offsets".to_string()),
                        );
                        return None;
                    }
                    None => {
                        self.error_unknown_name(&name.node, name.span);
                        return None;
                    }
                }
                let offset = self.lower_offset(offsets, expr.span)?;
                Some((
                    Expr::Field {
                        name: name.node.clone(),
                        offset,
                    },
                    Ty::Num,
                ))
            }

            ast::Expr::Unary { op, operand } => {
                let (inner, ty) = self.lower_expr(operand)?;
                match op {
                    UnaryOp::Neg => {
                        self.expect_ty(ty, Ty::Num, operand.span, "the operand of `-`")?;
                        // Fold `-literal` so constants stay constants.
                        let folded = match inner {
                            Expr::Literal(v) => Expr::Literal(-v),
                            other => Expr::Unary {
                                op: UnaryOp::Neg,
                                operand: Box::new(other),
                            },
                        };
                        Some((folded, Ty::Num))
                    }
                    UnaryOp::Not => {
                        self.expect_ty(ty, Ty::Bool, operand.span, "the operand of `not`")?;
                        Some((
                            Expr::Unary {
                                op: UnaryOp::Not,
                                operand: Box::new(inner),
                            },
                            Ty::Bool,
                        ))
                    }
                }
            }

            ast::Expr::Binary { op, lhs, rhs } => {
                let l = self.lower_expr(lhs);
                let r = self.lower_expr(rhs);
                let ((l, lt), (r, rt)) = (l?, r?);
                let operand_ty = if op.is_logical() { Ty::Bool } else { Ty::Num };
                let what = format!("an operand of `{}`", op.symbol());
                let lok = self.expect_ty(lt, operand_ty, lhs.span, &what);
                let rok = self.expect_ty(rt, operand_ty, rhs.span, &what);
                lok?;
                rok?;
                let ty = if op.yields_bool() { Ty::Bool } else { Ty::Num };
                Some((
                    Expr::Binary {
                        op: *op,
                        lhs: Box::new(l),
                        rhs: Box::new(r),
                    },
                    ty,
                ))
            }

            ast::Expr::Call { func, args } => {
                let Some(math) = MathFn::from_name(&func.node) else {
                    self.diagnostics.push(
                        Diagnostic::error(format!("unknown function '{}'", func.node), func.span)
                            .with_help(
                                "available: abs, sqrt, exp, log, sin, cos, tan, tanh, floor, ceil, min, max, pow"
                                    .to_string(),
                            ),
                    );
                    return None;
                };
                if args.len() != math.arity() {
                    self.diagnostics.push(Diagnostic::error(
                        format!(
                            "'{}' takes {} argument{}, found {}",
                            math.name(),
                            math.arity(),
                            if math.arity() == 1 { "" } else { "s" },
                            args.len()
                        ),
                        expr.span,
                    ));
                    return None;
                }
                let mut lowered = Vec::with_capacity(args.len());
                let mut ok = true;
                for arg in args {
                    match self.lower_expr(arg) {
                        Some((a, ty)) => {
                            let what = format!("an argument of '{}'", math.name());
                            ok &= self.expect_ty(ty, Ty::Num, arg.span, &what).is_some();
                            lowered.push(a);
                        }
                        None => ok = false,
                    }
                }
                if !ok {
                    return None;
                }
                Some((
                    Expr::Call {
                        func: math,
                        args: lowered,
                    },
                    Ty::Num,
                ))
            }

            ast::Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let c = self.lower_expr(cond);
                let t = self.lower_expr(then);
                let o = self.lower_expr(otherwise);
                let ((c, ct), (t, tt), (o, ot)) = (c?, t?, o?);
                let cok = self.expect_ty(ct, Ty::Bool, cond.span, "a condition");
                let tok = self.expect_ty(tt, Ty::Num, then.span, "a conditional branch");
                let ook = self.expect_ty(ot, Ty::Num, otherwise.span, "a conditional branch");
                cok?;
                tok?;
                ook?;
                Some((
                    Expr::Ternary {
                        cond: Box::new(c),
                        then: Box::new(t),
                        otherwise: Box::new(o),
                    },
                    Ty::Num,
                ))
            }
        }
    }

    fn lower_name(&mut self, name: &str, span: Span) -> Option<(Expr, Ty)> {
        match self.params.get(name).map(|p| p.kind) {
            Some(ParamKind::Field) => Some((
                Expr::Field {
                    name: name.to_string(),
                    offset: Offset::ZERO,
                },
                Ty::Num,
            )),
            Some(ParamKind::Scalar) => Some((Expr::Scalar(name.to_string()), Ty::Num)),
            None => {
                if MathFn::from_name(name).is_some() {
                    self.diagnostics.push(
                        Diagnostic::error(format!("'{}' is a function, not a value", name), span)
                            .with_help(format!("call it: `{}(...)`", name)),
                    );
                } else {
                    self.error_unknown_name(name, span);
                }
                None
            }
        }
    }

    /// Offsets are exactly three integer literals, optionally negated.
    pub(super) fn lower_offset(
        &mut self,
        offsets: &[Spanned<ast::Expr>],
        span: Span,
    ) -> Option<Offset> {
        if offsets.len() != 3 {
            self.diagnostics.push(
                Diagnostic::error(
                    format!(
                        "field access needs exactly 3 offsets (i, j, k), found {}",
                        offsets.len()
                    ),
                    span,
                )
                .with_help("fields are 3-D; write e.g. `u[-1, 0, 0]`".to_string()),
            );
            return None;
        }
        let mut out = [0i32; 3];
        let mut ok = true;
        for (slot, off) in out.iter_mut().zip(offsets) {
            match literal_offset(&off.node) {
                Some(v) => *slot = v,
                None => {
                    self.diagnostics.push(
                        Diagnostic::error(
                            "field offsets must be integer literals".to_string(),
                            off.span,
                        )
                        .with_help(
                            "halo sizes are computed statically, so offsets cannot depend on runtime values"
                                .to_string(),
                        ),
                    );
                    ok = false;
                }
            }
        }
        ok.then(|| Offset::new(out[0], out[1], out[2]))
    }

    fn expect_ty(&mut self, found: Ty, expected: Ty, span: Span, what: &str) -> Option<()> {
        if found == expected {
            return Some(());
        }
        let help = match expected {
            Ty::Num => "comparisons produce booleans; use `a if cond else b` to select a value",
            Ty::Bool => "compare the value, e.g. `x > 0.0`",
        };
        self.diagnostics.push(
            Diagnostic::error(
                format!("{} must be {}, found {}", what, expected.name(), found.name()),
                span,
            )
            .with_help(help.to_string()),
        );
        None
    }
}

/// An integer literal, possibly negated (`-1`, `+2`, `(3)`).
fn literal_offset(expr: &ast::Expr) -> Option<i32> {
    match expr {
        ast::Expr::Literal(Literal::Integer(n)) if *n <= MAX_OFFSET => Some(*n as i32),
        ast::Expr::Unary {
            op: UnaryOp::Neg,
            operand,
        } => literal_offset(&operand.node).map(|v| -v),
        _ => None,
    }
}
