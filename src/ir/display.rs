//! Source-language rendering of IR nodes.
//!
//! The output re-parses to the same definition, which `tessera check
//! --print` relies on.

use std::fmt;

use super::*;

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Field => f.write_str("field"),
            ParamKind::Scalar => f.write_str("scalar"),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.i, self.j, self.k)
    }
}

impl fmt::Display for AxisBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.level, self.offset) {
            (LevelMarker::End, 0) => write!(f, "None"),
            (LevelMarker::Start, n) => write!(f, "{}", n),
            (LevelMarker::End, n) => write!(f, "{}", n),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Interval::full() {
            write!(f, "interval(...)")
        } else {
            write!(f, "interval({}, {})", self.start, self.end)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{:?}", v),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Field { name, offset } => {
                if offset.is_zero() {
                    write!(f, "{}", name)
                } else {
                    write!(f, "{}{}", name, offset)
                }
            }
            Expr::Scalar(name) => write!(f, "{}", name),
            Expr::Unary { op, operand } => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "not ",
                };
                write!(f, "{}", sym)?;
                write_operand(f, operand)
            }
            Expr::Binary { op, lhs, rhs } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs)
            }
            Expr::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => {
                write_operand(f, then)?;
                write!(f, " if ")?;
                write_operand(f, cond)?;
                write!(f, " else ")?;
                write_operand(f, otherwise)
            }
        }
    }
}

/// Compound operands are parenthesized so precedence never matters.
fn write_operand(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    match e {
        Expr::Binary { .. } | Expr::Ternary { .. } | Expr::Unary { .. } => write!(f, "({})", e),
        Expr::Literal(v) if *v < 0.0 => write!(f, "({:?})", v),
        _ => write!(f, "{}", e),
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.target, self.value)
    }
}

impl fmt::Display for StencilDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stencil {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match p.kind {
                ParamKind::Field => write!(f, "{}: Field<{}>", p.name, p.dtype.name())?,
                ParamKind::Scalar => write!(f, "{}: {}", p.name, p.dtype.name())?,
            }
        }
        writeln!(f, ") {{")?;
        for block in &self.blocks {
            writeln!(
                f,
                "    with computation({}), {} {{",
                block.policy.name(),
                block.interval
            )?;
            for stage in &block.stages {
                writeln!(f, "        {};", stage)?;
            }
            writeln!(f, "    }}")?;
        }
        writeln!(f, "}}")
    }
}
