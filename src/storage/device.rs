use std::any::Any;
use std::fmt;

use crate::error::StorageError;

/// Memory that lives on an accelerator. Contents are moved as raw bytes in
/// the host layout, so indexing math is identical on both sides.
pub trait DeviceBuffer: Send + Sync + fmt::Debug {
    fn len_bytes(&self) -> usize;

    /// Copy host bytes to the device. `bytes.len() == self.len_bytes()`.
    fn upload(&mut self, bytes: &[u8]) -> Result<(), StorageError>;

    /// Copy device bytes back into `bytes`, blocking until complete.
    fn download(&self, bytes: &mut [u8]) -> Result<(), StorageError>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A "device" buffer kept in ordinary memory. Used where no accelerator is
/// present, and to observe the coherence protocol in tests.
#[derive(Clone, Debug, Default)]
pub struct HostMirror {
    /// Backing words keep the bytes 8-aligned so typed views never fail.
    words: Vec<u64>,
    len_bytes: usize,
}

impl HostMirror {
    pub fn new(len_bytes: usize) -> Self {
        Self {
            words: vec![0; len_bytes.div_ceil(8)],
            len_bytes,
        }
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len_bytes]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len_bytes]
    }

    /// Device-side contents, typed, in host layout order.
    pub fn as_slice<T: bytemuck::Pod>(&self) -> &[T] {
        bytemuck::cast_slice(self.bytes())
    }

    pub fn as_slice_mut<T: bytemuck::Pod>(&mut self) -> &mut [T] {
        bytemuck::cast_slice_mut(self.bytes_mut())
    }
}

impl DeviceBuffer for HostMirror {
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
        self.bytes_mut().copy_from_slice(bytes);
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
        bytes.copy_from_slice(self.bytes());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
