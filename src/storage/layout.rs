use crate::error::StorageError;

/// Byte alignment of the element at a storage's origin.
pub const ALIGNMENT: usize = 64;

/// Memory layout of a 3-D storage: k is the contiguous axis, its extent is
/// padded so every column starts on an aligned boundary relative to the
/// origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub shape: [usize; 3],
    pub origin: [usize; 3],
    /// Element strides for `[i, j, k]`.
    pub strides: [usize; 3],
    pub elem_size: usize,
}

impl Layout {
    pub fn new(shape: [usize; 3], origin: [usize; 3], elem_size: usize) -> Result<Self, StorageError> {
        if shape.iter().any(|&n| n == 0) {
            return Err(StorageError::InvalidShape(shape));
        }
        if origin.iter().zip(&shape).any(|(&o, &n)| o >= n) {
            return Err(StorageError::InvalidOrigin { origin, shape });
        }
        let per_line = (ALIGNMENT / elem_size).max(1);
        let padded_k = shape[2].div_ceil(per_line) * per_line;
        let strides = [shape[1] * padded_k, padded_k, 1];
        Ok(Self {
            shape,
            origin,
            strides,
            elem_size,
        })
    }

    /// Elements spanned from `[0, 0, 0]` to the last element, inclusive.
    pub fn span_len(&self) -> usize {
        self.shape[0] * self.strides[0]
    }

    /// Extra elements allocated so the origin can be aligned.
    pub fn slack(&self) -> usize {
        (ALIGNMENT / self.elem_size).max(1)
    }

    /// Linear element index of `idx` relative to `[0, 0, 0]`.
    #[inline]
    pub fn linear(&self, idx: [usize; 3]) -> usize {
        idx[0] * self.strides[0] + idx[1] * self.strides[1] + idx[2] * self.strides[2]
    }

    /// Offset (in elements) from an allocation starting at `base_addr` to
    /// `[0, 0, 0]`, chosen so that the origin lands on an aligned address.
    pub fn start_offset(&self, base_addr: usize) -> usize {
        let origin_addr = base_addr + self.linear(self.origin) * self.elem_size;
        let misalign = origin_addr % ALIGNMENT;
        if misalign == 0 {
            0
        } else {
            (ALIGNMENT - misalign) / self.elem_size
        }
    }

    pub fn contains(&self, idx: [usize; 3]) -> bool {
        idx.iter().zip(&self.shape).all(|(&i, &n)| i < n)
    }
}
