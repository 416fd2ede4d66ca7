use serde::{Deserialize, Serialize};

use crate::ir::{ComputationBlock, Offset};

/// Cells a field needs on each side of the computed region, per axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Halo {
    /// Cells below the region start, `[i, j, k]`.
    pub lower: [usize; 3],
    /// Cells past the region end, `[i, j, k]`.
    pub upper: [usize; 3],
}

impl Halo {
    pub fn is_zero(&self) -> bool {
        self.lower == [0; 3] && self.upper == [0; 3]
    }

    /// Widest horizontal reach, the usual meaning of "halo width".
    pub fn horizontal_width(&self) -> usize {
        self.lower[..2]
            .iter()
            .chain(&self.upper[..2])
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Grow to cover `offset` read inside `block`.
    pub(crate) fn include(&mut self, offset: Offset, block: &ComputationBlock) {
        for (axis, d) in [offset.i, offset.j].into_iter().enumerate() {
            grow(&mut self.lower[axis], -(d as i64));
            grow(&mut self.upper[axis], d as i64);
        }

        // The first level of the block reads `start + dk`; only reaches
        // below the region when that is negative.
        let dk = offset.k as i64;
        let below = match block.interval.fixed_start() {
            Some(start) => -(start as i64 + dk),
            None => -dk,
        };
        let above = match block.interval.fixed_end_from_top() {
            Some(end) => end as i64 + dk,
            None => dk,
        };
        grow(&mut self.lower[2], below);
        grow(&mut self.upper[2], above);
    }

    pub fn merge(&mut self, other: &Halo) {
        for axis in 0..3 {
            self.lower[axis] = self.lower[axis].max(other.lower[axis]);
            self.upper[axis] = self.upper[axis].max(other.upper[axis]);
        }
    }
}

fn grow(slot: &mut usize, need: i64) {
    if need > 0 {
        *slot = (*slot).max(need as usize);
    }
}
