//! # Device Entry Points
//!
//! The surface a character-device driver calls into. Offsets are the file
//! offsets of the device node, i.e. physical addresses.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{error, warn};
use pmem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
use pmem_paging::{PhysMemory, RootTableSource, WalkError};

use crate::config::PmemConfig;
use crate::cursor::{ReadCursor, TransferCursor, WriteCursor};
use crate::error::PmemError;
use crate::mapping::RogueMapper;
use crate::transfer::TransferEngine;
use crate::vm::KernelVm;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("invalid offset {0}")]
    InvalidOffset(i64),
    #[error("I/O error")]
    Io(#[from] PmemError),
    #[error("device is read-only")]
    ReadOnly,
    #[error("device disabled after a failed rogue page release")]
    Suspect,
    #[error("address translation failed")]
    Translation(#[source] WalkError),
    #[error("rogue pages of size {0} are not supported")]
    Unsupported(PageSizeClass),
}

/// Physical memory exposed as a seekable byte device.
pub struct PmemDevice<'a, P: ?Sized, R: ?Sized, V: ?Sized> {
    engine: TransferEngine<'a, P, R, V>,
    config: PmemConfig,
    suspect: AtomicBool,
}

impl<'a, P, R, V> PmemDevice<'a, P, R, V>
where
    P: PhysMemory + ?Sized,
    R: RootTableSource + ?Sized,
    V: KernelVm + ?Sized,
{
    /// # Errors
    /// [`DeviceError::Unsupported`] if the configured page size cannot be
    /// used for rogue mappings.
    pub fn new(
        memory: &'a P,
        root: &'a R,
        vm: &'a V,
        config: PmemConfig,
    ) -> Result<Self, DeviceError> {
        let mapper = RogueMapper::new(memory, root, vm, config.page_size())
            .map_err(|_| DeviceError::Unsupported(config.page_size()))?;
        Ok(Self {
            engine: TransferEngine::new(mapper),
            config,
            suspect: AtomicBool::new(false),
        })
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> PmemConfig {
        self.config
    }

    #[inline]
    #[must_use]
    pub const fn engine(&self) -> &TransferEngine<'a, P, R, V> {
        &self.engine
    }

    /// Set once a rogue page could not be released; never cleared.
    #[inline]
    #[must_use]
    pub fn is_suspect(&self) -> bool {
        self.suspect.load(Ordering::Acquire)
    }

    /// Fill `buf` from physical memory starting at `offset`.
    ///
    /// # Errors
    /// - [`DeviceError::InvalidOffset`] for a negative offset.
    /// - [`DeviceError::Suspect`] after an earlier restoration failure.
    /// - [`DeviceError::Io`] for any failure of the transfer.
    pub fn read(&self, offset: i64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        self.run(&mut ReadCursor::new(offset, buf))
    }

    /// Store `data` to physical memory starting at `offset`.
    ///
    /// # Errors
    /// [`DeviceError::ReadOnly`] unless the device was configured writable;
    /// otherwise as [`read`](Self::read).
    pub fn write(&self, offset: i64, data: &[u8]) -> Result<usize, DeviceError> {
        if !self.config.writable() {
            warn!("Rejecting write of {} bytes at {offset}: device is read-only", data.len());
            return Err(DeviceError::ReadOnly);
        }
        self.run(&mut WriteCursor::new(offset, data))
    }

    /// Physical address `va` translates to under the current root table.
    ///
    /// # Errors
    /// [`DeviceError::Translation`] if `va` is not mapped.
    pub fn translate(&self, va: VirtualAddress) -> Result<PhysicalAddress, DeviceError> {
        self.engine
            .mapper()
            .walker()
            .resolve(va)
            .map_err(DeviceError::Translation)
    }

    fn run<C: TransferCursor>(&self, cursor: &mut C) -> Result<usize, DeviceError> {
        let offset = cursor.offset();
        if offset < 0 {
            return Err(DeviceError::InvalidOffset(offset));
        }
        if self.is_suspect() {
            return Err(DeviceError::Suspect);
        }

        self.engine.transfer(cursor).map_err(|e| {
            if matches!(e, PmemError::RestorationFailure { .. }) {
                error!("Marking pmem device suspect: {e}");
                self.suspect.store(true, Ordering::Release);
            }
            DeviceError::Io(e)
        })
    }
}
