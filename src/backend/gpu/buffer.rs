use std::any::Any;
use std::sync::Arc;

use crate::error::StorageError;
use crate::storage::DeviceBuffer;

use super::GpuContext;

/// A storage's device copy: one wgpu storage buffer in host layout.
pub struct GpuBuffer {
    context: Arc<GpuContext>,
    buffer: wgpu::Buffer,
    len_bytes: usize,
}

impl GpuBuffer {
    pub fn new(context: Arc<GpuContext>, len_bytes: usize) -> Result<Self, StorageError> {
        let limits = context.device.limits();
        let max = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if len_bytes as u64 > max {
            return Err(StorageError::Layout(format!(
                "{} bytes exceed the device's storage buffer limit of {}",
                len_bytes, max
            )));
        }
        let buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessera_field"),
            size: len_bytes as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(Self {
            context,
            buffer,
            len_bytes,
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("len_bytes", &self.len_bytes)
            .finish()
    }
}

impl DeviceBuffer for GpuBuffer {
    fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    fn upload(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        if bytes.len() != self.len_bytes {
            return Err(StorageError::Transfer(format!(
                "upload of {} bytes into a {}-byte buffer",
                bytes.len(),
                self.len_bytes
            )));
        }
        self.context.queue.write_buffer(&self.buffer, 0, bytes);
        self.context.queue.submit(std::iter::empty());
        Ok(())
    }

    fn download(&self, bytes: &mut [u8]) -> Result<(), StorageError> {
        if bytes.len() != self.len_bytes {
            return Err(StorageError::Transfer(format!(
                "download of a {}-byte buffer into {} bytes",
                self.len_bytes,
                bytes.len()
            )));
        }
        let device = &self.context.device;
        let size = self.len_bytes as u64;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessera_staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tessera_download"),
        });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
        self.context.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        // Blocks until the copy, and every kernel submitted before it, is done.
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| StorageError::Transfer("GPU readback channel closed".into()))?
            .map_err(|e| StorageError::Transfer(format!("GPU readback failed: {}", e)))?;

        {
            let data = slice.get_mapped_range();
            bytes.copy_from_slice(&data);
        }
        staging.unmap();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
