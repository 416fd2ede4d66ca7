//! Interpreting backend: explicit index loops evaluated point by point.
//! Slow, but it is the semantics every other backend is checked against.

use std::sync::Arc;

use crate::analysis::AnalyzedStencil;
use crate::error::Error;
use crate::ir::{bool_value, IterationPolicy, UnaryOp};

use super::program::{Node, Program, ProgramBlock, ProgramStage};
use super::{Kernel, Launch};

pub(crate) struct ReferenceKernel {
    program: Program,
}

impl ReferenceKernel {
    pub fn new(stencil: &Arc<AnalyzedStencil>) -> Self {
        Self {
            program: Program::new(stencil),
        }
    }
}

impl Kernel for ReferenceKernel {
    fn launch(&self, launch: &mut Launch<'_>) -> Result<(), Error> {
        for block in &self.program.blocks {
            run_block(block, launch);
        }
        Ok(())
    }
}

fn run_block(block: &ProgramBlock, launch: &mut Launch<'_>) {
    let [ni, nj, nk] = launch.domain;
    match block.policy {
        IterationPolicy::Parallel => {
            for pass in &block.passes {
                for k in block.levels(nk) {
                    run_plane(pass, k, ni, nj, launch);
                }
            }
        }
        IterationPolicy::Forward | IterationPolicy::Backward => {
            for k in block.levels(nk) {
                for pass in &block.passes {
                    run_plane(pass, k, ni, nj, launch);
                }
            }
        }
    }
}

fn run_plane(pass: &[ProgramStage], k: usize, ni: usize, nj: usize, launch: &mut Launch<'_>) {
    for i in 0..ni {
        for j in 0..nj {
            let p = [i, j, k];
            for stage in pass {
                let value = eval(&stage.value, p, launch);
                let idx = launch.index(stage.target, p, [0; 3]);
                launch.fields[stage.target].storage.store(idx, value);
            }
        }
    }
}

/// Evaluate `node` at domain point `p`.
pub(crate) fn eval(node: &Node, p: [usize; 3], launch: &Launch<'_>) -> f64 {
    match node {
        Node::Lit(v) => *v,
        Node::Load { field, offset } => {
            let idx = launch.index(*field, p, *offset);
            launch.fields[*field].storage.load(idx)
        }
        Node::Scalar(s) => launch.scalars[*s],
        Node::Unary(UnaryOp::Neg, operand) => -eval(operand, p, launch),
        Node::Unary(UnaryOp::Not, operand) => bool_value(eval(operand, p, launch) == 0.0),
        Node::Binary(op, lhs, rhs) => {
            let a = eval(lhs, p, launch);
            let b = eval(rhs, p, launch);
            op.apply(a, b)
        }
        Node::Call(func, args) => {
            let mut values = [0.0; 2];
            for (slot, arg) in values.iter_mut().zip(args) {
                *slot = eval(arg, p, launch);
            }
            func.apply(&values[..args.len()])
        }
        Node::Select {
            cond,
            then,
            otherwise,
        } => {
            if eval(cond, p, launch) != 0.0 {
                eval(then, p, launch)
            } else {
                eval(otherwise, p, launch)
            }
        }
    }
}
