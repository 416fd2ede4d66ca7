//! Array-expression backend. Each stage is evaluated as one `ndarray`
//! expression over its whole region (the 3-D region for `PARALLEL`, one
//! plane per level otherwise) before it is written back, which is exactly
//! plane-at-a-time semantics. Elementwise work is spread over rayon.

use std::sync::Arc;

use ndarray::{Array3, Zip};

use crate::analysis::AnalyzedStencil;
use crate::error::Error;
use crate::ir::{bool_value, BinOp, IterationPolicy, MathFn, UnaryOp};

use super::program::{Node, Program, ProgramBlock};
use super::{Kernel, Launch};

pub(crate) struct VectorizedKernel {
    program: Program,
}

impl VectorizedKernel {
    pub fn new(stencil: &Arc<AnalyzedStencil>) -> Self {
        Self {
            program: Program::new(stencil),
        }
    }
}

impl Kernel for VectorizedKernel {
    fn launch(&self, launch: &mut Launch<'_>) -> Result<(), Error> {
        for block in &self.program.blocks {
            run_block(block, launch);
        }
        Ok(())
    }
}

/// A region in domain coordinates: `[start, start + extent)`.
#[derive(Clone, Copy, Debug)]
struct Region {
    start: [usize; 3],
    extent: [usize; 3],
}

fn run_block(block: &ProgramBlock, launch: &mut Launch<'_>) {
    let [ni, nj, nk] = launch.domain;
    if ni == 0 || nj == 0 {
        return;
    }
    match block.policy {
        IterationPolicy::Parallel => {
            let (lo, hi) = block.interval.resolve(nk);
            if hi > lo {
                let region = Region {
                    start: [0, 0, lo],
                    extent: [ni, nj, hi - lo],
                };
                for stage in block.stages() {
                    run_stage(stage.target, &stage.value, region, launch);
                }
            }
        }
        IterationPolicy::Forward | IterationPolicy::Backward => {
            for k in block.levels(nk) {
                let region = Region {
                    start: [0, 0, k],
                    extent: [ni, nj, 1],
                };
                for stage in block.stages() {
                    run_stage(stage.target, &stage.value, region, launch);
                }
            }
        }
    }
}

fn run_stage(target: usize, value: &Node, region: Region, launch: &mut Launch<'_>) {
    let result = match eval(value, region, launch) {
        Value::Array(array) => array,
        Value::Uniform(v) => Array3::from_elem(region.extent, v),
    };
    let start = launch.index(target, region.start, [0; 3]);
    launch.fields[target].storage.write_region(start, result.view());
}

/// An evaluated sub-expression. Literals and scalars stay uniform so they
/// broadcast without allocating.
enum Value {
    Uniform(f64),
    Array(Array3<f64>),
}

impl Value {
    fn map(self, f: impl Fn(f64) -> f64 + Sync + Send) -> Value {
        match self {
            Value::Uniform(v) => Value::Uniform(f(v)),
            Value::Array(mut a) => {
                a.par_mapv_inplace(f);
                Value::Array(a)
            }
        }
    }

    fn zip(self, other: Value, f: impl Fn(f64, f64) -> f64 + Sync + Send) -> Value {
        match (self, other) {
            (Value::Uniform(a), Value::Uniform(b)) => Value::Uniform(f(a, b)),
            (Value::Array(mut a), Value::Uniform(b)) => {
                a.par_mapv_inplace(|x| f(x, b));
                Value::Array(a)
            }
            (Value::Uniform(a), Value::Array(mut b)) => {
                b.par_mapv_inplace(|y| f(a, y));
                Value::Array(b)
            }
            (Value::Array(mut a), Value::Array(b)) => {
                Zip::from(&mut a).and(&b).par_for_each(|x, &y| *x = f(*x, y));
                Value::Array(a)
            }
        }
    }

    fn into_array(self, extent: [usize; 3]) -> Array3<f64> {
        match self {
            Value::Uniform(v) => Array3::from_elem(extent, v),
            Value::Array(a) => a,
        }
    }
}

fn eval(node: &Node, region: Region, launch: &Launch<'_>) -> Value {
    match node {
        Node::Lit(v) => Value::Uniform(*v),
        Node::Scalar(s) => Value::Uniform(launch.scalars[*s]),
        Node::Load { field, offset } => {
            let start = launch.index(*field, region.start, *offset);
            Value::Array(launch.fields[*field].storage.read_region(start, region.extent))
        }
        Node::Unary(UnaryOp::Neg, operand) => eval(operand, region, launch).map(|x| -x),
        Node::Unary(UnaryOp::Not, operand) => {
            eval(operand, region, launch).map(|x| bool_value(x == 0.0))
        }
        Node::Binary(op, lhs, rhs) => {
            let op: BinOp = *op;
            let a = eval(lhs, region, launch);
            let b = eval(rhs, region, launch);
            a.zip(b, move |x, y| op.apply(x, y))
        }
        Node::Call(func, args) => {
            let func: MathFn = *func;
            let mut values = args.iter().map(|arg| eval(arg, region, launch));
            let first = values.next().unwrap_or(Value::Uniform(0.0));
            match values.next() {
                Some(second) => first.zip(second, move |x, y| func.apply(&[x, y])),
                None => first.map(move |x| func.apply(&[x])),
            }
        }
        Node::Select {
            cond,
            then,
            otherwise,
        } => {
            let cond = eval(cond, region, launch);
            let then = eval(then, region, launch);
            let otherwise = eval(otherwise, region, launch);
            if let Value::Uniform(c) = cond {
                return if c != 0.0 { then } else { otherwise };
            }
            let cond = cond.into_array(region.extent);
            let then = then.into_array(region.extent);
            let otherwise = otherwise.into_array(region.extent);
            Value::Array(Zip::from(&cond).and(&then).and(&otherwise).par_map_collect(
                |&c, &t, &o| if c != 0.0 { t } else { o },
            ))
        }
    }
}
