use serde::Serialize;

use crate::error::StorageError;

use super::DeviceBuffer;

/// Which copy of a dual-location storage holds the latest data.
///
/// ```text
///            write_host            write_device
///   Clean ───────────────► HostDirty      Clean ───────────────► DeviceDirty
///   HostDirty ── read_device (upload) ──► Clean
///   DeviceDirty ── read_host (download) ──► Clean
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Coherence {
    /// Both copies agree (or there is no device copy).
    #[default]
    Clean,
    /// The host copy was written after the last transfer.
    HostDirty,
    /// The device copy was written after the last transfer.
    DeviceDirty,
}

/// Number of copies performed in each direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub host_to_device: usize,
    pub device_to_host: usize,
}

impl TransferStats {
    pub fn total(&self) -> usize {
        self.host_to_device + self.device_to_host
    }
}

/// Capability: a storage that may be mirrored on a device.
///
/// A read on one side first pulls the other side's data if that side is
/// dirty; a write marks its own side dirty and defers the copy until the
/// other side is read. Single writer at a time: the `&mut` receivers make
/// concurrent unsynchronized access impossible from safe code.
pub trait DualLocation {
    fn coherence(&self) -> Coherence;

    fn has_device(&self) -> bool;

    fn transfers(&self) -> TransferStats;

    /// Make the host copy current.
    fn sync_host(&mut self) -> Result<(), StorageError>;

    /// Make the device copy current. Fails if there is no device copy.
    fn sync_device(&mut self) -> Result<(), StorageError>;

    /// Record that the host copy was modified.
    fn mark_host_written(&mut self);

    /// Record that the device copy was modified.
    fn mark_device_written(&mut self);

    fn device_buffer(&self) -> Option<&dyn DeviceBuffer>;

    fn device_buffer_mut(&mut self) -> Option<&mut dyn DeviceBuffer>;
}
