//! GPU backend: WGSL compute shaders run through wgpu (Metal, Vulkan,
//! DX12). Fields must be `f32`.
//!
//! One device is opened per process and shared by every storage and
//! kernel, so device buffers can be bound to any pipeline.

mod buffer;
pub mod codegen;
mod kernel;

use std::sync::{Arc, OnceLock};

pub use buffer::GpuBuffer;
pub(crate) use kernel::GpuKernel;

use crate::backend::Backend;
use crate::error::StorageError;
use crate::ir::DType;
use crate::storage::DeviceBuffer;

/// The process-wide device.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("adapter", &self.adapter_name)
            .finish_non_exhaustive()
    }
}

/// Try to create a wgpu device and queue.
/// Returns None if no GPU adapter is available.
pub fn try_create_device() -> Option<GpuContext> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;
    let adapter_name = adapter.get_info().name;
    // Ask for what the adapter offers: stencils bind one storage buffer per
    // field and the defaults allow only eight.
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("tessera-gpu"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
        },
        None,
    ))
    .ok()?;
    Some(GpuContext {
        device,
        queue,
        adapter_name,
    })
}

/// The shared device, opened on first use.
pub fn shared_context() -> Option<Arc<GpuContext>> {
    static CONTEXT: OnceLock<Option<Arc<GpuContext>>> = OnceLock::new();
    CONTEXT
        .get_or_init(|| {
            let context = try_create_device().map(Arc::new);
            match &context {
                Some(ctx) => tracing::info!(adapter = %ctx.adapter_name, "opened GPU device"),
                None => tracing::warn!("no GPU adapter available"),
            }
            context
        })
        .clone()
}

/// Allocate a device buffer for a storage used with `backend`.
pub(crate) fn allocate_buffer(
    backend: Backend,
    dtype: DType,
    len_bytes: usize,
) -> Result<Box<dyn DeviceBuffer>, StorageError> {
    if dtype != DType::F32 {
        return Err(StorageError::UnsupportedDType { backend, dtype });
    }
    let context = shared_context()
        .ok_or_else(|| StorageError::DeviceUnavailable("no GPU adapter found".into()))?;
    Ok(Box::new(GpuBuffer::new(context, len_bytes)?))
}
