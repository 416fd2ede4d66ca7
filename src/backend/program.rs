//! Index-resolved form of an analyzed stencil, shared by the interpreting
//! backends. Field and scalar names become positions in the launch
//! argument lists.

use std::fmt::Write;

use serde::Serialize;

use crate::analysis::AnalyzedStencil;
use crate::ir::{BinOp, Expr, Interval, IterationPolicy, MathFn, UnaryOp};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Lit(f64),
    Load { field: usize, offset: [i64; 3] },
    Scalar(usize),
    Unary(UnaryOp, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(MathFn, Vec<Node>),
    Select {
        cond: Box<Node>,
        then: Box<Node>,
        otherwise: Box<Node>,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct ProgramStage {
    pub target: usize,
    pub value: Node,
}

#[derive(Clone, Debug)]
pub(crate) struct ProgramBlock {
    pub policy: IterationPolicy,
    pub interval: Interval,
    /// Stages of each pass, in order.
    pub passes: Vec<Vec<ProgramStage>>,
}

impl ProgramBlock {
    /// Stages in declaration order, ignoring pass boundaries.
    pub fn stages(&self) -> impl Iterator<Item = &ProgramStage> {
        self.passes.iter().flatten()
    }

    /// Levels in visiting order for a domain of `nk` levels.
    pub fn levels(&self, nk: usize) -> Box<dyn Iterator<Item = usize>> {
        let (lo, hi) = self.interval.resolve(nk);
        match self.policy {
            IterationPolicy::Backward => Box::new((lo..hi).rev()),
            IterationPolicy::Parallel | IterationPolicy::Forward => Box::new(lo..hi),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Program {
    pub blocks: Vec<ProgramBlock>,
}

impl Program {
    pub fn new(stencil: &AnalyzedStencil) -> Self {
        let resolver = Resolver::new(stencil);
        let blocks = stencil
            .blocks
            .iter()
            .map(|block| ProgramBlock {
                policy: block.policy,
                interval: block.interval,
                passes: block
                    .passes
                    .iter()
                    .map(|pass| {
                        block
                            .pass_stages(pass)
                            .map(|stage| ProgramStage {
                                target: resolver.field(&stage.target),
                                value: resolver.node(&stage.value),
                            })
                            .collect()
                    })
                    .collect(),
            })
            .collect();
        Self { blocks }
    }

    /// Human-readable artifact for the interpreting backends: the
    /// normalized definition plus the loop structure that will run.
    pub fn listing(&self, stencil: &AnalyzedStencil, style: &str) -> String {
        #[derive(Serialize)]
        struct Listing<'a> {
            stencil: &'a str,
            style: &'a str,
            definition: &'a crate::ir::StencilDefinition,
            loops: Vec<String>,
        }

        let mut loops = Vec::new();
        for (b, block) in self.blocks.iter().enumerate() {
            let (order, axes) = match block.policy {
                IterationPolicy::Parallel => ("any", "for pass { for k, i, j"),
                IterationPolicy::Forward => ("ascending", "for k { for pass { for i, j"),
                IterationPolicy::Backward => ("descending", "for k { for pass { for i, j"),
            };
            loops.push(format!(
                "block {}: {} {} (k {}), {} pass(es)",
                b + 1,
                block.policy.name(),
                block.interval,
                order,
                block.passes.len()
            ));
            loops.push(format!("  {} ... }}", axes));
            for (p, pass) in block.passes.iter().enumerate() {
                for stage in pass {
                    let mut line = String::new();
                    let _ = write!(line, "  pass {}: #{} = ", p + 1, stage.target);
                    write_node(&mut line, &stage.value);
                    loops.push(line);
                }
            }
        }

        let listing = Listing {
            stencil: stencil.name(),
            style,
            definition: &stencil.definition,
            loops,
        };
        serde_json::to_string_pretty(&listing).unwrap_or_default()
    }
}

struct Resolver<'a> {
    stencil: &'a AnalyzedStencil,
    scalars: Vec<&'a str>,
}

impl<'a> Resolver<'a> {
    fn new(stencil: &'a AnalyzedStencil) -> Self {
        let scalars = stencil
            .definition
            .scalars()
            .map(|p| p.name.as_str())
            .collect();
        Self { stencil, scalars }
    }

    // Analysis only accepts definitions whose names resolve, so lookups
    // cannot miss.
    fn field(&self, name: &str) -> usize {
        self.stencil
            .fields
            .iter()
            .position(|f| f.name == name)
            .unwrap_or_else(|| unreachable!("unresolved field '{}'", name))
    }

    fn scalar(&self, name: &str) -> usize {
        self.scalars
            .iter()
            .position(|s| *s == name)
            .unwrap_or_else(|| unreachable!("unresolved scalar '{}'", name))
    }

    fn node(&self, expr: &Expr) -> Node {
        match expr {
            Expr::Literal(v) => Node::Lit(*v),
            Expr::Bool(b) => Node::Lit(crate::ir::bool_value(*b)),
            Expr::Field { name, offset } => Node::Load {
                field: self.field(name),
                offset: offset.as_array().map(i64::from),
            },
            Expr::Scalar(name) => Node::Scalar(self.scalar(name)),
            Expr::Unary { op, operand } => Node::Unary(*op, Box::new(self.node(operand))),
            Expr::Binary { op, lhs, rhs } => Node::Binary(
                *op,
                Box::new(self.node(lhs)),
                Box::new(self.node(rhs)),
            ),
            Expr::Call { func, args } => {
                Node::Call(*func, args.iter().map(|a| self.node(a)).collect())
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
            } => Node::Select {
                cond: Box::new(self.node(cond)),
                then: Box::new(self.node(then)),
                otherwise: Box::new(self.node(otherwise)),
            },
        }
    }
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Lit(v) => {
            let _ = write!(out, "{:?}", v);
        }
        Node::Load { field, offset } => {
            let _ = write!(out, "#{}[{}, {}, {}]", field, offset[0], offset[1], offset[2]);
        }
        Node::Scalar(s) => {
            let _ = write!(out, "$s{}", s);
        }
        Node::Unary(op, operand) => {
            out.push_str(match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "not ",
            });
            write_node(out, operand);
        }
        Node::Binary(op, lhs, rhs) => {
            out.push('(');
            write_node(out, lhs);
            let _ = write!(out, " {} ", op.symbol());
            write_node(out, rhs);
            out.push(')');
        }
        Node::Call(func, args) => {
            out.push_str(func.name());
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_node(out, arg);
            }
            out.push(')');
        }
        Node::Select {
            cond,
            then,
            otherwise,
        } => {
            out.push('(');
            write_node(out, then);
            out.push_str(" if ");
            write_node(out, cond);
            out.push_str(" else ");
            write_node(out, otherwise);
            out.push(')');
        }
    }
}
