//! C source generation.
//!
//! The entry point has a fixed ABI so one binary serves every grid size:
//!
//! ```c
//! void tessera_<name>(void **fields, const int64_t *geom, const double *scalars);
//! ```
//!
//! `fields[f]` points at element `[0, 0, 0]` of field `f`. `geom` holds the
//! domain `(ni, nj, nk)` followed by `(oi, oj, ok, si, sj)` per field:
//! origin and the i/j element strides (k is contiguous).
//!
//! Locals are named by parameter position (`f0`, `f0_si`, `s0`), so any
//! pair of DSL identifiers maps to distinct C names.

use std::collections::HashMap;
use std::fmt::Write;

use crate::analysis::{AnalyzedStencil, BlockPlan};
use crate::ir::{BinOp, Expr, IterationPolicy, LevelMarker, MathFn, UnaryOp};

/// Values per field in the `geom` array.
pub const GEOM_PER_FIELD: usize = 5;

pub fn emit(stencil: &AnalyzedStencil) -> String {
    let names = Names::new(stencil);
    let mut out = String::new();
    let name = super::super::entry_point(stencil);

    let _ = writeln!(out, "/* generated by tessera {} */", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(out, "/* stencil: {} */", stencil.name());
    out.push_str("#include <math.h>\n#include <stdint.h>\n\n");
    out.push_str(
        "static int64_t tessera_level(int from_end, int64_t offset, int64_t nk)\n{\n    \
         int64_t level = (from_end ? nk : 0) + offset;\n    \
         return level < 0 ? 0 : (level > nk ? nk : level);\n}\n\n",
    );

    let _ = writeln!(
        out,
        "void {}(void **fields, const int64_t *geom, const double *scalars)\n{{",
        name
    );
    out.push_str("    const int64_t ni = geom[0], nj = geom[1], nk = geom[2];\n");
    out.push_str("    (void)nk;\n");

    for (f, field) in stencil.fields.iter().enumerate() {
        let g = 3 + f * GEOM_PER_FIELD;
        let ty = field.dtype.c_type();
        let _ = writeln!(
            out,
            "    /* {} ({}) */\n    {ty} *f{f} = ({ty} *)fields[{f}] + geom[{o0}] * geom[{s0}] + geom[{o1}] * geom[{s1}] + geom[{o2}];\n    const int64_t f{f}_si = geom[{s0}], f{f}_sj = geom[{s1}];\n    (void)f{f}; (void)f{f}_si; (void)f{f}_sj;",
            field.name,
            field.intent.name(),
            ty = ty,
            f = f,
            o0 = g,
            o1 = g + 1,
            o2 = g + 2,
            s0 = g + 3,
            s1 = g + 4,
        );
    }
    for (s, scalar) in stencil.definition.scalars().enumerate() {
        let _ = writeln!(
            out,
            "    /* {} */\n    const double s{s} = scalars[{s}];\n    (void)s{s};",
            scalar.name,
            s = s
        );
    }
    if stencil.definition.scalars().next().is_none() {
        out.push_str("    (void)scalars;\n");
    }

    for (b, block) in stencil.blocks.iter().enumerate() {
        out.push('\n');
        emit_block(&mut out, &names, b, block);
    }
    out.push_str("}\n");
    out
}

/// Positions of fields and scalars in the parameter list.
struct Names<'a> {
    fields: HashMap<&'a str, usize>,
    scalars: HashMap<&'a str, usize>,
}

impl<'a> Names<'a> {
    fn new(stencil: &'a AnalyzedStencil) -> Self {
        Self {
            fields: stencil
                .fields
                .iter()
                .enumerate()
                .map(|(f, field)| (field.name.as_str(), f))
                .collect(),
            scalars: stencil
                .definition
                .scalars()
                .enumerate()
                .map(|(s, scalar)| (scalar.name.as_str(), s))
                .collect(),
        }
    }

    /// Unresolved names never reach codegen after analysis; if one did,
    /// it fails the C compile instead of aliasing a parameter.
    fn field(&self, name: &str) -> String {
        match self.fields.get(name) {
            Some(f) => format!("f{}", f),
            None => format!("f_unknown_{}", name),
        }
    }

    fn scalar(&self, name: &str) -> String {
        match self.scalars.get(name) {
            Some(s) => format!("s{}", s),
            None => format!("s_unknown_{}", name),
        }
    }
}

fn emit_block(out: &mut String, names: &Names<'_>, index: usize, block: &BlockPlan) {
    let _ = writeln!(
        out,
        "    /* block {}: {} {} */\n    {{",
        index + 1,
        block.policy.name(),
        block.interval
    );
    let bound = |level: LevelMarker, offset: i32| {
        format!(
            "tessera_level({}, {}, nk)",
            i32::from(level == LevelMarker::End),
            offset
        )
    };
    let _ = writeln!(
        out,
        "        const int64_t k_lo = {};\n        const int64_t k_hi = {};",
        bound(block.interval.start.level, block.interval.start.offset),
        bound(block.interval.end.level, block.interval.end.offset),
    );

    match block.policy {
        IterationPolicy::Parallel => {
            for (p, pass) in block.passes.iter().enumerate() {
                let _ = writeln!(out, "        /* pass {} */", p + 1);
                out.push_str("        for (int64_t i = 0; i < ni; ++i) {\n");
                out.push_str("            for (int64_t j = 0; j < nj; ++j) {\n");
                out.push_str("#pragma GCC ivdep\n");
                out.push_str("                for (int64_t k = k_lo; k < k_hi; ++k) {\n");
                for stage in block.pass_stages(pass) {
                    emit_stage(out, names, "                    ", &stage.target, &stage.value);
                }
                out.push_str("                }\n            }\n        }\n");
            }
        }
        IterationPolicy::Forward | IterationPolicy::Backward => {
            if block.policy == IterationPolicy::Forward {
                out.push_str("        for (int64_t k = k_lo; k < k_hi; ++k) {\n");
            } else {
                out.push_str("        for (int64_t k = k_hi - 1; k >= k_lo; --k) {\n");
            }
            for (p, pass) in block.passes.iter().enumerate() {
                let _ = writeln!(out, "            /* pass {} */", p + 1);
                out.push_str("            for (int64_t i = 0; i < ni; ++i) {\n");
                out.push_str("#pragma GCC ivdep\n");
                out.push_str("                for (int64_t j = 0; j < nj; ++j) {\n");
                for stage in block.pass_stages(pass) {
                    emit_stage(out, names, "                    ", &stage.target, &stage.value);
                }
                out.push_str("                }\n            }\n");
            }
            out.push_str("        }\n");
        }
    }
    out.push_str("    }\n");
}

fn emit_stage(out: &mut String, names: &Names<'_>, indent: &str, target: &str, value: &Expr) {
    let _ = writeln!(
        out,
        "{}{t}[i * {t}_si + j * {t}_sj + k] = {};",
        indent,
        expr(names, value),
        t = names.field(target)
    );
}

/// C expression for `e`, evaluated in double precision.
fn expr(names: &Names<'_>, e: &Expr) -> String {
    match e {
        Expr::Literal(v) => literal(*v),
        Expr::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Expr::Field { name, offset } => format!(
            "(double){n}[{} * {n}_si + {} * {n}_sj + {}]",
            axis("i", offset.i),
            axis("j", offset.j),
            axis("k", offset.k),
            n = names.field(name)
        ),
        Expr::Scalar(name) => names.scalar(name),
        Expr::Unary { op, operand } => match op {
            UnaryOp::Neg => format!("(-{})", expr(names, operand)),
            UnaryOp::Not => format!("(!{})", expr(names, operand)),
        },
        Expr::Binary { op, lhs, rhs } => match op {
            BinOp::Pow => match rhs.small_integer_exponent() {
                Some(0) => "1.0".to_string(),
                Some(n) => {
                    let base = expr(names, lhs);
                    format!("({})", vec![base; n as usize].join(" * "))
                }
                None => format!("pow({}, {})", expr(names, lhs), expr(names, rhs)),
            },
            BinOp::And => format!("({} && {})", expr(names, lhs), expr(names, rhs)),
            BinOp::Or => format!("({} || {})", expr(names, lhs), expr(names, rhs)),
            _ => format!("({} {} {})", expr(names, lhs), op.symbol(), expr(names, rhs)),
        },
        Expr::Call { func, args } => {
            let args: Vec<String> = args.iter().map(|a| expr(names, a)).collect();
            format!("{}({})", c_function(*func), args.join(", "))
        }
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => format!("({} ? {} : {})", expr(names, cond), expr(names, then), expr(names, otherwise)),
    }
}

fn axis(var: &str, offset: i32) -> String {
    match offset {
        0 => var.to_string(),
        d if d > 0 => format!("({} + {})", var, d),
        d => format!("({} - {})", var, -(d as i64)),
    }
}

fn literal(v: f64) -> String {
    if v.is_nan() {
        "NAN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INFINITY" } else { "(-INFINITY)" }.to_string()
    } else {
        // Debug formatting always keeps a '.' or an exponent.
        format!("{:?}", v)
    }
}

fn c_function(func: MathFn) -> &'static str {
    match func {
        MathFn::Abs => "fabs",
        MathFn::Min => "fmin",
        MathFn::Max => "fmax",
        MathFn::Sqrt => "sqrt",
        MathFn::Exp => "exp",
        MathFn::Log => "log",
        MathFn::Sin => "sin",
        MathFn::Cos => "cos",
        MathFn::Tan => "tan",
        MathFn::Tanh => "tanh",
        MathFn::Floor => "floor",
        MathFn::Ceil => "ceil",
        MathFn::Pow => "pow",
    }
}
