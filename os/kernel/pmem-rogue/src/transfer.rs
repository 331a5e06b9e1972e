//! # Transfer Engine
//!
//! Splits a byte-stream request over physical memory into page-sized pieces.
//! Each piece gets its own rogue mapping, which is destroyed before the next
//! one is created:
//!
//! ```text
//!   offset                                   offset + len
//!     │                                          │
//!  ┌──┼─────────┬────────────┬────────────┬──────┼─────┐
//!  │  ▼  piece 0│   piece 1  │   piece 2  │piece 3     │
//!  └────────────┴────────────┴────────────┴────────────┘
//!   page n       page n+1     page n+2     page n+3
//! ```
//!
//! Whole requests are serialized, so one engine never has two pages diverted
//! at once.
//!
//! The serializing lock is a spinlock, and it stays held across
//! [`KernelVm::reserve_page`] and [`KernelVm::release_page`]. Those hooks must
//! therefore not sleep or block on other threads: an embedder backed by a
//! sleeping allocator has to hand out pages from a pre-reserved pool, or run
//! transfers with preemption disabled.

use log::error;
use pmem_addresses::PhysicalAddress;
use pmem_paging::{PhysMemory, RootTableSource};
use spin::Mutex;

use crate::cursor::TransferCursor;
use crate::error::PmemError;
use crate::mapping::RogueMapper;
use crate::vm::KernelVm;

/// Page-by-page transfers over one [`RogueMapper`].
///
/// Holds a spinlock for the duration of each [`transfer`](Self::transfer),
/// including the [`KernelVm`] reserve and release calls; see the module docs.
pub struct TransferEngine<'a, P: ?Sized, R: ?Sized, V: ?Sized> {
    mapper: RogueMapper<'a, P, R, V>,
    lock: Mutex<()>,
}

impl<'a, P, R, V> TransferEngine<'a, P, R, V>
where
    P: PhysMemory + ?Sized,
    R: RootTableSource + ?Sized,
    V: KernelVm + ?Sized,
{
    #[must_use]
    pub const fn new(mapper: RogueMapper<'a, P, R, V>) -> Self {
        Self {
            mapper,
            lock: Mutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &RogueMapper<'a, P, R, V> {
        &self.mapper
    }

    /// Move `cursor.residual()` bytes starting at `cursor.offset()`.
    ///
    /// Returns the number of bytes moved. Physical ranges are not validated;
    /// that is the caller's job.
    ///
    /// # Errors
    /// - [`PmemError::NegativeOffset`] before any mapping work.
    /// - Any error of [`RogueMapper::create`]; earlier pieces stay transferred.
    /// - [`PmemError::CopyFault`] if the cursor left bytes unmoved.
    /// - [`PmemError::RestorationFailure`] if a rogue page could not be released.
    #[allow(clippy::cast_possible_truncation)]
    pub fn transfer<C: TransferCursor + ?Sized>(&self, cursor: &mut C) -> Result<usize, PmemError> {
        let start = cursor.offset();
        let Ok(mut offset) = u64::try_from(start) else {
            error!("Refusing transfer at negative offset {start}");
            return Err(PmemError::NegativeOffset(start));
        };

        let _serialized = self.lock.lock();
        let page_size = self.mapper.page_size();
        let mut residual = cursor.residual();
        let mut moved = 0;

        while residual > 0 {
            let base = PhysicalAddress::new(offset).align_down(page_size);
            let mut mapping = self.mapper.create(base).inspect_err(|e| {
                error!("Could not acquire a rogue page for {base}: {e}");
            })?;

            let page_offset = (offset - base.as_u64()) as usize;
            let amount = residual.min(page_size.bytes() as usize - page_offset);
            let window = &mut mapping.window()[page_offset..page_offset + amount];

            let left = cursor.move_window(window);
            if left != 0 {
                error!("Copy through rogue page left {left} of {amount} bytes");
                mapping.destroy()?;
                return Err(PmemError::CopyFault {
                    requested: amount,
                    residual: left,
                });
            }

            moved += amount;
            residual = cursor.residual();
            offset += amount as u64;
            mapping.destroy().inspect_err(|e| {
                error!("Could not release a rogue page: {e}");
            })?;
        }

        Ok(moved)
    }
}
