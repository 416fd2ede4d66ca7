//! Programmatic construction of stencil definitions.
//!
//! ```
//! use tessera::{Expr, IntervalSpec, StencilBuilder};
//! use tessera::ir::{DType, IterationPolicy};
//!
//! let u = || Expr::field("u");
//! let def = StencilBuilder::new("lap")
//!     .field("u", DType::F64)
//!     .field("out", DType::F64)
//!     .computation(IterationPolicy::Parallel, IntervalSpec::Full, |b| {
//!         b.stage(
//!             "out",
//!             -4.0 * u() + u().at(-1, 0, 0) + u().at(1, 0, 0) + u().at(0, -1, 0) + u().at(0, 1, 0),
//!         );
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(def.blocks[0].stages.len(), 1);
//! ```
//!
//! The builder produces the same AST the parser does, so both entry points
//! share one set of checks and diagnostics.

use std::ops;

use crate::ast::{self, Literal};
pub use crate::ast::IntervalSpec;
use crate::error::DefinitionError;
use crate::ir::{BinOp, DType, IterationPolicy, MathFn, StencilDefinition, UnaryOp};
use crate::span::Spanned;

/// A stencil expression under construction.
#[derive(Clone, Debug)]
pub struct Expr(Spanned<ast::Expr>);

impl Expr {
    fn wrap(node: ast::Expr) -> Self {
        Expr(Spanned::dummy(node))
    }

    /// A field read at `[0, 0, 0]`.
    pub fn field(name: &str) -> Self {
        Self::wrap(ast::Expr::Name(name.to_string()))
    }

    /// A scalar parameter.
    pub fn scalar(name: &str) -> Self {
        Self::wrap(ast::Expr::Name(name.to_string()))
    }

    pub fn lit(value: f64) -> Self {
        if value.is_sign_negative() && value != 0.0 {
            -Self::wrap(ast::Expr::Literal(Literal::Float(-value)))
        } else {
            Self::wrap(ast::Expr::Literal(Literal::Float(value)))
        }
    }

    /// Re-read a field at a neighbor offset. Only meaningful on
    /// [`Expr::field`]; anything else is reported when the definition is built.
    pub fn at(self, di: i32, dj: i32, dk: i32) -> Self {
        let name = match self.0.node {
            ast::Expr::Name(name) | ast::Expr::Index { name: Spanned { node: name, .. }, .. } => name,
            other => {
                // Keep the bad node so lowering reports it.
                return Self::wrap(other);
            }
        };
        let offsets = [di, dj, dk].iter().map(|&d| offset_literal(d)).collect();
        Self::wrap(ast::Expr::Index {
            name: Spanned::dummy(name),
            offsets,
        })
    }

    pub fn call(func: MathFn, args: Vec<Expr>) -> Self {
        Self::wrap(ast::Expr::Call {
            func: Spanned::dummy(func.name().to_string()),
            args: args.into_iter().map(|a| a.0).collect(),
        })
    }

    pub fn abs(self) -> Self {
        Self::call(MathFn::Abs, vec![self])
    }

    pub fn sqrt(self) -> Self {
        Self::call(MathFn::Sqrt, vec![self])
    }

    pub fn exp(self) -> Self {
        Self::call(MathFn::Exp, vec![self])
    }

    pub fn min(self, other: Expr) -> Self {
        Self::call(MathFn::Min, vec![self, other])
    }

    pub fn max(self, other: Expr) -> Self {
        Self::call(MathFn::Max, vec![self, other])
    }

    pub fn pow(self, exponent: impl Into<Expr>) -> Self {
        self.binary(BinOp::Pow, exponent.into())
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Lt, other.into())
    }

    pub fn le(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Le, other.into())
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Gt, other.into())
    }

    pub fn ge(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Ge, other.into())
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Eq, other.into())
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        self.binary(BinOp::Ne, other.into())
    }

    pub fn and(self, other: Expr) -> Self {
        self.binary(BinOp::And, other)
    }

    pub fn or(self, other: Expr) -> Self {
        self.binary(BinOp::Or, other)
    }

    /// `then if cond else otherwise`
    pub fn select(cond: Expr, then: impl Into<Expr>, otherwise: impl Into<Expr>) -> Self {
        Self::wrap(ast::Expr::Conditional {
            cond: Box::new(cond.0),
            then: Box::new(then.into().0),
            otherwise: Box::new(otherwise.into().0),
        })
    }

    fn binary(self, op: BinOp, rhs: Expr) -> Self {
        Self::wrap(ast::Expr::Binary {
            op,
            lhs: Box::new(self.0),
            rhs: Box::new(rhs.0),
        })
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::wrap(ast::Expr::Unary {
            op,
            operand: Box::new(self.0),
        })
    }
}

fn offset_literal(d: i32) -> Spanned<ast::Expr> {
    let lit = Spanned::dummy(ast::Expr::Literal(Literal::Integer(d.unsigned_abs() as u64)));
    if d < 0 {
        Spanned::dummy(ast::Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(lit),
        })
    } else {
        lit
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::lit(v)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl ops::$trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                self.binary($op, rhs)
            }
        }

        impl ops::$trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                self.binary($op, Expr::lit(rhs))
            }
        }

        impl ops::$trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::lit(self).binary($op, rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, BinOp::Add);
impl_binary_op!(Sub, sub, BinOp::Sub);
impl_binary_op!(Mul, mul, BinOp::Mul);
impl_binary_op!(Div, div, BinOp::Div);

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.unary(UnaryOp::Neg)
    }
}

impl ops::Not for Expr {
    type Output = Expr;
    fn not(self) -> Expr {
        self.unary(UnaryOp::Not)
    }
}

/// Collects the stages of one computation block.
#[derive(Default)]
pub struct BlockBuilder {
    stages: Vec<Spanned<ast::Assign>>,
}

impl BlockBuilder {
    pub fn stage(&mut self, target: &str, value: impl Into<Expr>) -> &mut Self {
        self.stages.push(Spanned::dummy(ast::Assign {
            target: Spanned::dummy(ast::Expr::Name(target.to_string())),
            value: value.into().0,
        }));
        self
    }
}

/// Builds a [`StencilDefinition`] from Rust code.
pub struct StencilBuilder {
    def: ast::StencilDef,
}

impl StencilBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            def: ast::StencilDef {
                name: Spanned::dummy(name.to_string()),
                params: Vec::new(),
                blocks: Vec::new(),
            },
        }
    }

    pub fn field(mut self, name: &str, dtype: DType) -> Self {
        self.def.params.push(ast::Param {
            name: Spanned::dummy(name.to_string()),
            ty: Spanned::dummy(ast::Type::Field(Spanned::dummy(dtype.name().to_string()))),
        });
        self
    }

    pub fn scalar(mut self, name: &str, dtype: DType) -> Self {
        self.def.params.push(ast::Param {
            name: Spanned::dummy(name.to_string()),
            ty: Spanned::dummy(ast::Type::Scalar(dtype.name().to_string())),
        });
        self
    }

    pub fn computation(
        mut self,
        policy: IterationPolicy,
        interval: IntervalSpec,
        body: impl FnOnce(&mut BlockBuilder),
    ) -> Self {
        let mut block = BlockBuilder::default();
        body(&mut block);
        self.def.blocks.push(Spanned::dummy(ast::Block {
            policy: Spanned::dummy(policy),
            interval: Spanned::dummy(interval),
            stages: block.stages,
        }));
        self
    }

    /// Lower the collected definition, applying the same checks as parsing.
    pub fn build(self) -> Result<StencilDefinition, DefinitionError> {
        super::lower_stencil(&self.def).map_err(DefinitionError::new)
    }
}
