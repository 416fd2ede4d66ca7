//! Field storages: aligned host memory, an optional device mirror, and the
//! coherence bookkeeping between them.
//!
//! [`Storage`] is generic over its element type. Stencil invocation binds
//! storages through the type-erased [`FieldStorage`] trait, so a single
//! call can mix `f32` and `f64` fields.

mod coherence;
mod device;
mod layout;
#[cfg(test)]
mod tests;

use std::fmt;

use ndarray::{s, Array3, ArrayView3, ArrayViewMut3, ShapeBuilder, Zip};

pub use coherence::{Coherence, DualLocation, TransferStats};
pub use device::{DeviceBuffer, HostMirror};
pub use layout::{Layout, ALIGNMENT};

use crate::backend::Backend;
use crate::error::StorageError;
use crate::ir::DType;

/// Element types a field can hold.
pub trait Element:
    Copy + Default + PartialEq + fmt::Debug + Send + Sync + bytemuck::Pod + 'static
{
    const DTYPE: DType;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Capability: 3-D indexing over the host copy. Every accessor makes the
/// host copy current first; mutating accessors mark it dirty.
pub trait GridIndex {
    type Elem: Element;

    fn shape(&self) -> [usize; 3];

    /// Panics if `idx` is outside the shape.
    fn get(&mut self, idx: [usize; 3]) -> Result<Self::Elem, StorageError>;

    /// Panics if `idx` is outside the shape.
    fn set(&mut self, idx: [usize; 3], value: Self::Elem) -> Result<(), StorageError>;

    fn fill(&mut self, value: Self::Elem) -> Result<(), StorageError>;

    fn view(&mut self) -> Result<ArrayView3<'_, Self::Elem>, StorageError>;

    fn view_mut(&mut self) -> Result<ArrayViewMut3<'_, Self::Elem>, StorageError>;
}

/// A storage as seen by a stencil invocation, independent of element type.
///
/// Host accessors here never synchronize; the invocation path calls
/// [`DualLocation::sync_host`] once up front.
pub trait FieldStorage: DualLocation + Send {
    fn dtype(&self) -> DType;

    fn shape(&self) -> [usize; 3];

    /// The alignment anchor given at allocation.
    fn origin(&self) -> [usize; 3];

    /// Element strides of the host (and device) layout.
    fn strides(&self) -> [usize; 3];

    fn load(&self, idx: [usize; 3]) -> f64;

    fn store(&mut self, idx: [usize; 3], value: f64);

    /// Copy `[start, start + extent)` out as `f64`.
    fn read_region(&self, start: [usize; 3], extent: [usize; 3]) -> Array3<f64>;

    /// Overwrite `[start, start + values.dim())` from `f64` values.
    fn write_region(&mut self, start: [usize; 3], values: ArrayView3<'_, f64>);

    /// Pointer to host element `[0, 0, 0]`.
    fn host_ptr(&self) -> *const u8;

    fn host_ptr_mut(&mut self) -> *mut u8;
}

/// A 3-D field with an aligned host buffer and an optional device copy.
pub struct Storage<T: Element> {
    layout: Layout,
    data: Vec<T>,
    /// Index of element `[0, 0, 0]` in `data`.
    offset: usize,
    device: Option<Box<dyn DeviceBuffer>>,
    state: Coherence,
    transfers: TransferStats,
}

impl<T: Element> Storage<T> {
    /// Allocate zero-initialized storage for `backend`. Device-capable
    /// backends also get a device copy.
    pub fn zeros(backend: Backend, shape: [usize; 3], origin: [usize; 3]) -> Result<Self, StorageError> {
        let mut storage = Self::host_only(shape, origin)?;
        if backend.is_device() {
            let buffer = crate::backend::gpu::allocate_buffer(backend, T::DTYPE, storage.span_bytes())?;
            storage.attach_device(buffer)?;
        }
        Ok(storage)
    }

    pub fn full(
        backend: Backend,
        shape: [usize; 3],
        origin: [usize; 3],
        value: T,
    ) -> Result<Self, StorageError> {
        let mut storage = Self::zeros(backend, shape, origin)?;
        storage.fill(value)?;
        Ok(storage)
    }

    /// Copy an existing array into a new storage.
    pub fn from_array(
        backend: Backend,
        array: ArrayView3<'_, T>,
        origin: [usize; 3],
    ) -> Result<Self, StorageError> {
        let (a, b, c) = array.dim();
        let mut storage = Self::zeros(backend, [a, b, c], origin)?;
        storage.view_mut()?.assign(&array);
        Ok(storage)
    }

    /// Storage with no device copy.
    pub fn host_only(shape: [usize; 3], origin: [usize; 3]) -> Result<Self, StorageError> {
        let layout = Layout::new(shape, origin, std::mem::size_of::<T>())?;
        let data = vec![T::default(); layout.span_len() + layout.slack()];
        let offset = layout.start_offset(data.as_ptr() as usize);
        tracing::trace!(?shape, ?origin, dtype = %T::DTYPE, offset, "allocated storage");
        Ok(Self {
            layout,
            data,
            offset,
            device: None,
            state: Coherence::Clean,
            transfers: TransferStats::default(),
        })
    }

    /// Attach a device copy and initialize it from the host.
    pub fn attach_device(&mut self, mut buffer: Box<dyn DeviceBuffer>) -> Result<(), StorageError> {
        if buffer.len_bytes() != self.span_bytes() {
            return Err(StorageError::Transfer(format!(
                "device buffer holds {} bytes, storage needs {}",
                buffer.len_bytes(),
                self.span_bytes()
            )));
        }
        self.sync_host()?;
        buffer.upload(bytemuck::cast_slice(self.span()))?;
        self.device = Some(buffer);
        self.state = Coherence::Clean;
        Ok(())
    }

    /// Copy the host data out as an owned array.
    pub fn to_array(&mut self) -> Result<Array3<T>, StorageError> {
        Ok(self.view()?.to_owned())
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn shape(&self) -> [usize; 3] {
        self.layout.shape
    }

    /// Host access handle for reading.
    pub fn read_host(&mut self) -> Result<ArrayView3<'_, T>, StorageError> {
        self.view()
    }

    /// Host access handle for writing.
    pub fn write_host(&mut self) -> Result<ArrayViewMut3<'_, T>, StorageError> {
        self.view_mut()
    }

    /// Device access handle for reading.
    pub fn read_device(&mut self) -> Result<&dyn DeviceBuffer, StorageError> {
        self.sync_device()?;
        self.device
            .as_deref()
            .ok_or_else(|| StorageError::DeviceUnavailable("storage has no device copy".into()))
    }

    /// Device access handle for writing.
    pub fn write_device(&mut self) -> Result<&mut dyn DeviceBuffer, StorageError> {
        self.sync_device()?;
        self.mark_device_written();
        match self.device.as_deref_mut() {
            Some(buffer) => Ok(buffer),
            None => Err(StorageError::DeviceUnavailable(
                "storage has no device copy".into(),
            )),
        }
    }

    fn span_bytes(&self) -> usize {
        self.layout.span_len() * std::mem::size_of::<T>()
    }

    fn span(&self) -> &[T] {
        &self.data[self.offset..self.offset + self.layout.span_len()]
    }

    fn span_mut(&mut self) -> &mut [T] {
        let len = self.layout.span_len();
        &mut self.data[self.offset..self.offset + len]
    }

    fn host_view(&self) -> ArrayView3<'_, T> {
        // The layout guarantees the slice covers every strided index.
        ArrayView3::from_shape(self.layout.shape.strides(self.layout.strides), self.span())
            .unwrap_or_else(|_| unreachable!("layout spans its own shape"))
    }

    fn host_view_mut(&mut self) -> ArrayViewMut3<'_, T> {
        let layout = self.layout;
        ArrayViewMut3::from_shape(layout.shape.strides(layout.strides), self.span_mut())
            .unwrap_or_else(|_| unreachable!("layout spans its own shape"))
    }
}

impl<T: Element> fmt::Debug for Storage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("dtype", &T::DTYPE)
            .field("shape", &self.layout.shape)
            .field("origin", &self.layout.origin)
            .field("device", &self.device.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl<T: Element> DualLocation for Storage<T> {
    fn coherence(&self) -> Coherence {
        self.state
    }

    fn has_device(&self) -> bool {
        self.device.is_some()
    }

    fn transfers(&self) -> TransferStats {
        self.transfers
    }

    fn sync_host(&mut self) -> Result<(), StorageError> {
        if self.state != Coherence::DeviceDirty {
            return Ok(());
        }
        let len = self.layout.span_len();
        let offset = self.offset;
        if let Some(device) = self.device.as_deref() {
            let span = &mut self.data[offset..offset + len];
            device.download(bytemuck::cast_slice_mut(span))?;
            self.transfers.device_to_host += 1;
            tracing::trace!(bytes = device.len_bytes(), "device -> host");
        }
        self.state = Coherence::Clean;
        Ok(())
    }

    fn sync_device(&mut self) -> Result<(), StorageError> {
        if self.device.is_none() {
            return Err(StorageError::DeviceUnavailable(
                "storage has no device copy".into(),
            ));
        }
        if self.state != Coherence::HostDirty {
            return Ok(());
        }
        let len = self.layout.span_len();
        let span = &self.data[self.offset..self.offset + len];
        if let Some(device) = self.device.as_deref_mut() {
            device.upload(bytemuck::cast_slice(span))?;
            self.transfers.host_to_device += 1;
            tracing::trace!(bytes = device.len_bytes(), "host -> device");
        }
        self.state = Coherence::Clean;
        Ok(())
    }

    fn mark_host_written(&mut self) {
        if self.device.is_some() {
            debug_assert_ne!(self.state, Coherence::DeviceDirty, "host written while stale");
            self.state = Coherence::HostDirty;
        }
    }

    fn mark_device_written(&mut self) {
        if self.device.is_some() {
            debug_assert_ne!(self.state, Coherence::HostDirty, "device written while stale");
            self.state = Coherence::DeviceDirty;
        }
    }

    fn device_buffer(&self) -> Option<&dyn DeviceBuffer> {
        self.device.as_deref()
    }

    fn device_buffer_mut(&mut self) -> Option<&mut dyn DeviceBuffer> {
        match self.device.as_deref_mut() {
            Some(buffer) => Some(buffer),
            None => None,
        }
    }
}

impl<T: Element> GridIndex for Storage<T> {
    type Elem = T;

    fn shape(&self) -> [usize; 3] {
        self.layout.shape
    }

    fn get(&mut self, idx: [usize; 3]) -> Result<T, StorageError> {
        self.sync_host()?;
        assert!(self.layout.contains(idx), "index {:?} outside shape {:?}", idx, self.layout.shape);
        Ok(self.data[self.offset + self.layout.linear(idx)])
    }

    fn set(&mut self, idx: [usize; 3], value: T) -> Result<(), StorageError> {
        self.sync_host()?;
        assert!(self.layout.contains(idx), "index {:?} outside shape {:?}", idx, self.layout.shape);
        let at = self.offset + self.layout.linear(idx);
        self.data[at] = value;
        self.mark_host_written();
        Ok(())
    }

    fn fill(&mut self, value: T) -> Result<(), StorageError> {
        self.sync_host()?;
        self.span_mut().fill(value);
        self.mark_host_written();
        Ok(())
    }

    fn view(&mut self) -> Result<ArrayView3<'_, T>, StorageError> {
        self.sync_host()?;
        Ok(self.host_view())
    }

    fn view_mut(&mut self) -> Result<ArrayViewMut3<'_, T>, StorageError> {
        self.sync_host()?;
        self.mark_host_written();
        Ok(self.host_view_mut())
    }
}

impl<T: Element> FieldStorage for Storage<T> {
    fn dtype(&self) -> DType {
        T::DTYPE
    }

    fn shape(&self) -> [usize; 3] {
        self.layout.shape
    }

    fn origin(&self) -> [usize; 3] {
        self.layout.origin
    }

    fn strides(&self) -> [usize; 3] {
        self.layout.strides
    }

    #[inline]
    fn load(&self, idx: [usize; 3]) -> f64 {
        self.data[self.offset + self.layout.linear(idx)].to_f64()
    }

    #[inline]
    fn store(&mut self, idx: [usize; 3], value: f64) {
        let at = self.offset + self.layout.linear(idx);
        self.data[at] = T::from_f64(value);
    }

    fn read_region(&self, start: [usize; 3], extent: [usize; 3]) -> Array3<f64> {
        self.host_view()
            .slice(s![
                start[0]..start[0] + extent[0],
                start[1]..start[1] + extent[1],
                start[2]..start[2] + extent[2]
            ])
            .mapv(T::to_f64)
    }

    fn write_region(&mut self, start: [usize; 3], values: ArrayView3<'_, f64>) {
        let (a, b, c) = values.dim();
        let mut view = self.host_view_mut();
        let target = view.slice_mut(s![
            start[0]..start[0] + a,
            start[1]..start[1] + b,
            start[2]..start[2] + c
        ]);
        Zip::from(target)
            .and(&values)
            .par_for_each(|dst, &v| *dst = T::from_f64(v));
    }

    fn host_ptr(&self) -> *const u8 {
        self.span().as_ptr() as *const u8
    }

    fn host_ptr_mut(&mut self) -> *mut u8 {
        self.span_mut().as_mut_ptr() as *mut u8
    }
}
