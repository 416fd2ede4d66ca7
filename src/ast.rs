use crate::ir::{BinOp, IterationPolicy, UnaryOp};
use crate::span::Spanned;

/// A parsed `.stn` file: one or more stencil definitions.
#[derive(Clone, Debug, PartialEq)]
pub struct File {
    pub stencils: Vec<StencilDef>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StencilDef {
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub blocks: Vec<Spanned<Block>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Spanned<String>,
    pub ty: Spanned<Type>,
}

/// A parameter type as written. Element types stay textual so that
/// lowering can report unknown dtypes with a span.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    /// `Field<f64>`
    Field(Spanned<String>),
    /// `f64`
    Scalar(String),
}

/// `with computation(POLICY), interval(..) { stages }`
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub policy: Spanned<IterationPolicy>,
    pub interval: Spanned<IntervalSpec>,
    pub stages: Vec<Spanned<Assign>>,
}

/// Interval bounds as written.
#[derive(Clone, Debug, PartialEq)]
pub enum IntervalSpec {
    /// `interval(...)`
    Full,
    /// `interval(lo, hi)`; `None` for `hi` means the top of the domain.
    Levels { start: i64, end: Option<i64> },
}

/// A stage. The target is an expression so that lowering can reject
/// anything other than a bare field name with a precise span.
#[derive(Clone, Debug, PartialEq)]
pub struct Assign {
    pub target: Spanned<Expr>,
    pub value: Spanned<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Integer(u64),
    Float(f64),
    Bool(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// A bare name: a field at `[0, 0, 0]` or a scalar.
    Name(String),
    /// `name[di, dj, dk]`; offsets are checked for literal integers later.
    Index {
        name: Spanned<String>,
        offsets: Vec<Spanned<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Spanned<Expr>>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    Call {
        func: Spanned<String>,
        args: Vec<Spanned<Expr>>,
    },
    /// `then if cond else otherwise`
    Conditional {
        cond: Box<Spanned<Expr>>,
        then: Box<Spanned<Expr>>,
        otherwise: Box<Spanned<Expr>>,
    },
}
