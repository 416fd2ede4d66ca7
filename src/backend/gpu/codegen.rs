//! WGSL generation. One module per stencil with one compute entry point
//! per pass, named `pass_<block>_<pass>`.
//!
//! Bindings (group 0):
//! - 0: `geom` uniform, the domain plus the first level of the dispatch,
//!   then per field `(oi, oj, ok, si)` and `(sj, _, _, _)`;
//! - 1: `scalars` uniform, packed four to a `vec4<f32>`;
//! - 2..: one `array<f32>` storage buffer per field, declaration order.
//!
//! The horizontal domain maps onto the `x`/`y` launch grid. A `PARALLEL`
//! pass also spreads its levels over `z`; sequential blocks dispatch one
//! level at a time.

use std::fmt::Write;

use crate::analysis::AnalyzedStencil;
use crate::backend::BuildOptions;
use crate::ir::{BinOp, DType, Expr, MathFn, UnaryOp};

/// First binding slot used by fields.
pub const FIELD_BINDING_BASE: u32 = 2;

pub fn entry_point_name(block: usize, pass: usize) -> String {
    format!("pass_{}_{}", block + 1, pass + 1)
}

/// Number of `vec4<f32>` slots holding the scalars.
pub fn scalar_slots(count: usize) -> usize {
    count.div_ceil(4).max(1)
}

pub fn emit(stencil: &AnalyzedStencil, options: &BuildOptions) -> Result<String, String> {
    for field in &stencil.fields {
        if field.dtype != DType::F32 {
            return Err(format!(
                "field '{}' is {}; the gpu backend supports only f32 fields",
                field.name, field.dtype
            ));
        }
    }
    let [wx, wy] = options.workgroup;
    if wx == 0 || wy == 0 {
        return Err(format!("invalid workgroup size {}x{}", wx, wy));
    }

    let scalars: Vec<&str> = stencil
        .definition
        .scalars()
        .map(|p| p.name.as_str())
        .collect();
    let emitter = Emitter {
        scalars: &scalars,
    };

    let mut out = String::new();
    let _ = writeln!(out, "// generated by tessera {}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(out, "// stencil: {}\n", stencil.name());
    let _ = writeln!(
        out,
        "struct Geometry {{\n    domain: vec4<i32>,\n    fields: array<vec4<i32>, {}>,\n}}\n",
        stencil.fields.len() * 2
    );
    out.push_str("@group(0) @binding(0) var<uniform> geom: Geometry;\n");
    let _ = writeln!(
        out,
        "@group(0) @binding(1) var<uniform> scalars: array<vec4<f32>, {}>;",
        scalar_slots(scalars.len())
    );
    for (f, field) in stencil.fields.iter().enumerate() {
        let access = if field.intent.is_written() {
            "read_write"
        } else {
            "read"
        };
        let _ = writeln!(
            out,
            "@group(0) @binding({}) var<storage, {}> f_{}: array<f32>;",
            FIELD_BINDING_BASE as usize + f,
            access,
            field.name
        );
    }

    for (f, field) in stencil.fields.iter().enumerate() {
        let _ = writeln!(
            out,
            "\nfn idx_{n}(i: i32, j: i32, k: i32) -> u32 {{\n    let g = geom.fields[{a}];\n    let h = geom.fields[{b}];\n    return u32((g.x + i) * g.w + (g.y + j) * h.x + g.z + k);\n}}",
            n = field.name,
            a = 2 * f,
            b = 2 * f + 1
        );
    }

    for (b, block) in stencil.blocks.iter().enumerate() {
        for (p, pass) in block.passes.iter().enumerate() {
            let _ = writeln!(
                out,
                "\n// block {}: {} {}\n@compute @workgroup_size({}, {}, 1)\nfn {}(@builtin(global_invocation_id) gid: vec3<u32>) {{",
                b + 1,
                block.policy.name(),
                block.interval,
                wx,
                wy,
                entry_point_name(b, p)
            );
            out.push_str("    let i = i32(gid.x);\n    let j = i32(gid.y);\n");
            out.push_str("    if (i >= geom.domain.x || j >= geom.domain.y) {\n        return;\n    }\n");
            out.push_str("    let k = geom.domain.w + i32(gid.z);\n");
            for stage in block.pass_stages(pass) {
                let value = emitter.expr(&stage.value)?;
                let _ = writeln!(
                    out,
                    "    f_{t}[idx_{t}(i, j, k)] = {};",
                    value,
                    t = stage.target
                );
            }
            out.push_str("}\n");
        }
    }
    Ok(out)
}

struct Emitter<'a> {
    scalars: &'a [&'a str],
}

impl Emitter<'_> {
    fn expr(&self, e: &Expr) -> Result<String, String> {
        Ok(match e {
            Expr::Literal(v) => literal(*v)?,
            Expr::Bool(b) => b.to_string(),
            Expr::Field { name, offset } => format!(
                "f_{n}[idx_{n}({}, {}, {})]",
                axis("i", offset.i),
                axis("j", offset.j),
                axis("k", offset.k),
                n = name
            ),
            Expr::Scalar(name) => {
                let s = self
                    .scalars
                    .iter()
                    .position(|x| x == name)
                    .ok_or_else(|| format!("unknown scalar '{}'", name))?;
                format!("scalars[{}].{}", s / 4, ["x", "y", "z", "w"][s % 4])
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => format!("(-{})", self.expr(operand)?),
                UnaryOp::Not => format!("(!{})", self.expr(operand)?),
            },
            Expr::Binary { op, lhs, rhs } => match op {
                BinOp::Pow => match rhs.small_integer_exponent() {
                    Some(0) => "1.0f".to_string(),
                    Some(n) => {
                        let base = self.expr(lhs)?;
                        format!("({})", vec![base; n as usize].join(" * "))
                    }
                    None => format!("pow({}, {})", self.expr(lhs)?, self.expr(rhs)?),
                },
                BinOp::And => format!("({} && {})", self.expr(lhs)?, self.expr(rhs)?),
                BinOp::Or => format!("({} || {})", self.expr(lhs)?, self.expr(rhs)?),
                _ => format!("({} {} {})", self.expr(lhs)?, op.symbol(), self.expr(rhs)?),
            },
            Expr::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("{}({})", wgsl_function(*func), args.join(", "))
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => format!(
                "select({}, {}, {})",
                self.expr(otherwise)?,
                self.expr(then)?,
                self.expr(cond)?
            ),
        })
    }
}

fn axis(var: &str, offset: i32) -> String {
    match offset {
        0 => var.to_string(),
        d if d > 0 => format!("{} + {}", var, d),
        d => format!("{} - {}", var, -(d as i64)),
    }
}

fn literal(v: f64) -> Result<String, String> {
    let single = v as f32;
    if !single.is_finite() {
        return Err(format!("literal {} has no finite f32 representation", v));
    }
    if single < 0.0 {
        Ok(format!("({:?}f)", single))
    } else {
        Ok(format!("{:?}f", single))
    }
}

fn wgsl_function(func: MathFn) -> &'static str {
    // WGSL spells every supported function the same way.
    func.name()
}
