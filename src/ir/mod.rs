//! Backend-agnostic intermediate representation of a stencil definition.
//!
//! A [`StencilDefinition`] is what the front-end produces from either the
//! textual language or [`crate::StencilBuilder`]. Names are resolved, every
//! field access carries a literal [`Offset`], and expressions are typed
//! (boolean sub-expressions only appear as conditions). Nothing here knows
//! about spans; diagnostics are produced before lowering finishes.

mod display;
#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

// ─── Element Types ─────────────────────────────────────────────────

/// Element data type of a field or scalar parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F64,
}

impl DType {
    pub fn from_name(name: &str) -> Option<DType> {
        match name {
            "f32" | "float32" => Some(DType::F32),
            "f64" | "float64" | "float" => Some(DType::F64),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }

    pub fn size_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    /// The C type used by the native backend.
    pub fn c_type(&self) -> &'static str {
        match self {
            DType::F32 => "float",
            DType::F64 => "double",
        }
    }
}

// ─── Vertical Iteration ────────────────────────────────────────────

/// How a computation block walks the vertical (k) axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterationPolicy {
    /// No ordering between k-levels.
    Parallel,
    /// Levels are visited bottom to top.
    Forward,
    /// Levels are visited top to bottom.
    Backward,
}

impl IterationPolicy {
    pub fn from_name(name: &str) -> Option<IterationPolicy> {
        match name {
            "PARALLEL" => Some(IterationPolicy::Parallel),
            "FORWARD" => Some(IterationPolicy::Forward),
            "BACKWARD" => Some(IterationPolicy::Backward),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IterationPolicy::Parallel => "PARALLEL",
            IterationPolicy::Forward => "FORWARD",
            IterationPolicy::Backward => "BACKWARD",
        }
    }

    /// True when k-levels must be visited in order.
    pub fn is_sequential(&self) -> bool {
        !matches!(self, IterationPolicy::Parallel)
    }
}

/// Which end of the vertical domain a bound is counted from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelMarker {
    Start,
    End,
}

/// One end of a vertical interval: a marker plus a signed level offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisBound {
    pub level: LevelMarker,
    pub offset: i32,
}

impl AxisBound {
    pub fn start(offset: i32) -> Self {
        Self {
            level: LevelMarker::Start,
            offset,
        }
    }

    pub fn end(offset: i32) -> Self {
        Self {
            level: LevelMarker::End,
            offset,
        }
    }

    /// Level index inside a domain of `nk` levels, clamped to `0..=nk`.
    pub fn resolve(&self, nk: usize) -> usize {
        let base = match self.level {
            LevelMarker::Start => 0i64,
            LevelMarker::End => nk as i64,
        };
        (base + self.offset as i64).clamp(0, nk as i64) as usize
    }
}

/// Half-open vertical interval `[start, end)` relative to the computed domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: AxisBound,
    pub end: AxisBound,
}

impl Interval {
    /// The whole vertical domain.
    pub fn full() -> Self {
        Self {
            start: AxisBound::start(0),
            end: AxisBound::end(0),
        }
    }

    pub fn new(start: AxisBound, end: AxisBound) -> Self {
        Self { start, end }
    }

    /// Build from integer levels the way the source language writes them:
    /// non-negative values count from the bottom, negative values from the
    /// top, `None` as the end means "up to the top".
    pub fn from_levels(start: i32, end: Option<i32>) -> Self {
        let start = if start < 0 {
            AxisBound::end(start)
        } else {
            AxisBound::start(start)
        };
        let end = match end {
            None => AxisBound::end(0),
            Some(e) if e < 0 => AxisBound::end(e),
            Some(e) => AxisBound::start(e),
        };
        Self { start, end }
    }

    /// Concrete `(lo, hi)` levels for a domain of `nk` levels. Empty when
    /// `hi <= lo`.
    pub fn resolve(&self, nk: usize) -> (usize, usize) {
        let lo = self.start.resolve(nk);
        let hi = self.end.resolve(nk).max(lo);
        (lo, hi)
    }

    /// Statically known lower level, if the interval starts at a fixed
    /// distance from the bottom.
    pub(crate) fn fixed_start(&self) -> Option<i32> {
        match self.start.level {
            LevelMarker::Start => Some(self.start.offset),
            LevelMarker::End => None,
        }
    }

    /// Statically known distance of the upper bound below the top.
    pub(crate) fn fixed_end_from_top(&self) -> Option<i32> {
        match self.end.level {
            LevelMarker::End => Some(self.end.offset),
            LevelMarker::Start => None,
        }
    }
}

// ─── Expressions ───────────────────────────────────────────────────

/// Relative grid displacement of a field access.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub i: i32,
    pub j: i32,
    pub k: i32,
}

impl Offset {
    pub const ZERO: Offset = Offset { i: 0, j: 0, k: 0 };

    pub fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    pub fn is_zero(&self) -> bool {
        *self == Offset::ZERO
    }

    pub fn is_horizontal_zero(&self) -> bool {
        self.i == 0 && self.j == 0
    }

    pub fn as_array(&self) -> [i32; 3] {
        [self.i, self.j, self.k]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Comparisons and logical connectives produce booleans.
    pub fn yields_bool(&self) -> bool {
        !self.is_arithmetic()
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Pow
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "**",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    /// Evaluate an arithmetic operator on two values.
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Pow => a.powf(b),
            BinOp::Eq => bool_value(a == b),
            BinOp::Ne => bool_value(a != b),
            BinOp::Lt => bool_value(a < b),
            BinOp::Le => bool_value(a <= b),
            BinOp::Gt => bool_value(a > b),
            BinOp::Ge => bool_value(a >= b),
            BinOp::And => bool_value(a != 0.0 && b != 0.0),
            BinOp::Or => bool_value(a != 0.0 || b != 0.0),
        }
    }
}

/// Booleans travel as 1.0 / 0.0 through the f64 evaluators.
pub(crate) fn bool_value(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Elementwise math functions allowed in stencil bodies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathFn {
    Abs,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Tanh,
    Floor,
    Ceil,
    Min,
    Max,
    Pow,
}

impl MathFn {
    pub fn from_name(name: &str) -> Option<MathFn> {
        match name {
            "abs" => Some(MathFn::Abs),
            "sqrt" => Some(MathFn::Sqrt),
            "exp" => Some(MathFn::Exp),
            "log" => Some(MathFn::Log),
            "sin" => Some(MathFn::Sin),
            "cos" => Some(MathFn::Cos),
            "tan" => Some(MathFn::Tan),
            "tanh" => Some(MathFn::Tanh),
            "floor" => Some(MathFn::Floor),
            "ceil" => Some(MathFn::Ceil),
            "min" => Some(MathFn::Min),
            "max" => Some(MathFn::Max),
            "pow" => Some(MathFn::Pow),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MathFn::Abs => "abs",
            MathFn::Sqrt => "sqrt",
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Tanh => "tanh",
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
            MathFn::Min => "min",
            MathFn::Max => "max",
            MathFn::Pow => "pow",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            MathFn::Min | MathFn::Max | MathFn::Pow => 2,
            _ => 1,
        }
    }

    pub fn apply(&self, args: &[f64]) -> f64 {
        let x = args[0];
        match self {
            MathFn::Abs => x.abs(),
            MathFn::Sqrt => x.sqrt(),
            MathFn::Exp => x.exp(),
            MathFn::Log => x.ln(),
            MathFn::Sin => x.sin(),
            MathFn::Cos => x.cos(),
            MathFn::Tan => x.tan(),
            MathFn::Tanh => x.tanh(),
            MathFn::Floor => x.floor(),
            MathFn::Ceil => x.ceil(),
            MathFn::Min => x.min(args[1]),
            MathFn::Max => x.max(args[1]),
            MathFn::Pow => x.powf(args[1]),
        }
    }
}

/// A typed, name-resolved expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(f64),
    Bool(bool),
    Field { name: String, offset: Offset },
    Scalar(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: MathFn,
        args: Vec<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Visit every field access in evaluation order.
    pub fn visit_fields(&self, f: &mut impl FnMut(&str, Offset)) {
        match self {
            Expr::Literal(_) | Expr::Bool(_) | Expr::Scalar(_) => {}
            Expr::Field { name, offset } => f(name, *offset),
            Expr::Unary { operand, .. } => operand.visit_fields(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_fields(f);
                rhs.visit_fields(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit_fields(f);
                }
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.visit_fields(f);
                then.visit_fields(f);
                otherwise.visit_fields(f);
            }
        }
    }

    /// Visit every scalar parameter reference.
    pub fn visit_scalars(&self, f: &mut impl FnMut(&str)) {
        match self {
            Expr::Scalar(name) => f(name),
            Expr::Literal(_) | Expr::Bool(_) | Expr::Field { .. } => {}
            Expr::Unary { operand, .. } => operand.visit_scalars(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_scalars(f);
                rhs.visit_scalars(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit_scalars(f);
                }
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                cond.visit_scalars(f);
                then.visit_scalars(f);
                otherwise.visit_scalars(f);
            }
        }
    }

    /// True if the expression reads `field` at any offset accepted by `pred`.
    pub fn reads_field_where(&self, field: &str, pred: impl Fn(Offset) -> bool) -> bool {
        let mut found = false;
        self.visit_fields(&mut |name, offset| {
            if name == field && pred(offset) {
                found = true;
            }
        });
        found
    }

    /// Integer value of a literal exponent, for strength-reducing `x ** n`.
    pub(crate) fn small_integer_exponent(&self) -> Option<u32> {
        match self {
            Expr::Literal(v) if v.fract() == 0.0 && (0.0..=4.0).contains(v) => Some(*v as u32),
            _ => None,
        }
    }
}

// ─── Definition ────────────────────────────────────────────────────

/// One assignment `target[0, 0, 0] = value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub target: String,
    pub value: Expr,
}

/// Stages sharing an iteration policy and vertical interval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputationBlock {
    pub policy: IterationPolicy,
    pub interval: Interval,
    pub stages: Vec<Stage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Field,
    Scalar,
}

/// A declared parameter: a rank-3 field or a scalar.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub dtype: DType,
}

impl Param {
    pub fn field(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Field,
            dtype,
        }
    }

    pub fn scalar(name: impl Into<String>, dtype: DType) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Scalar,
            dtype,
        }
    }

    pub fn is_field(&self) -> bool {
        self.kind == ParamKind::Field
    }
}

/// A complete, name-resolved stencil definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StencilDefinition {
    pub name: String,
    pub params: Vec<Param>,
    pub blocks: Vec<ComputationBlock>,
}

impl StencilDefinition {
    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.kind == ParamKind::Field)
    }

    pub fn scalars(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| p.kind == ParamKind::Scalar)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.blocks.iter().flat_map(|b| b.stages.iter())
    }

    /// Deterministic serialization used for content hashing.
    pub fn normalized(&self) -> String {
        // Vec/struct ordering is stable, so the JSON text is canonical.
        serde_json::to_string(self).unwrap_or_default()
    }
}
