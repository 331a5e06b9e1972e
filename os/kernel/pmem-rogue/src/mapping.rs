//! # Rogue Mappings
//!
//! A rogue mapping borrows one page of kernel virtual memory and repoints the
//! paging entry behind it at an arbitrary physical page:
//!
//! ```text
//!   reserve ─► touch ─► walk to PTE/PDE ─► save original ─► write diverted
//!                                                               │
//!                                                            invlpg
//!                                                               │
//!   release ◄── invlpg ◄── write original ◄──── (use window) ◄──┘
//! ```
//!
//! While a [`RogueMapping`] is live exactly one paging entry is diverted. The
//! original value is restored before the page goes back to the allocator, on
//! every path: explicit [`destroy`](RogueMapping::destroy) or drop.
//!
//! In 4 KiB mode the diverted PTE has its global flag cleared, so the stale
//! translation cannot outlive a CR3 switch. In 2 MiB mode the PDE is diverted
//! as is, apart from its frame.

use log::{debug, error, warn};
use pmem_addresses::{PageSizeClass, PhysicalAddress, VirtualAddress};
use pmem_paging::{Pd, PdEntry, PhysMemory, Pt, PtEntry, RootTableSource, TableWalker, write_entry};

use crate::error::PmemError;
use crate::vm::KernelVm;

/// Creates rogue mappings of a fixed page size.
pub struct RogueMapper<'a, P: ?Sized, R: ?Sized, V: ?Sized> {
    walker: TableWalker<'a, P, R>,
    vm: &'a V,
    page_size: PageSizeClass,
}

impl<'a, P, R, V> RogueMapper<'a, P, R, V>
where
    P: PhysMemory + ?Sized,
    R: RootTableSource + ?Sized,
    V: KernelVm + ?Sized,
{
    /// # Errors
    /// [`PmemError::UnsupportedPageSize`] for anything but 4 KiB and 2 MiB.
    pub fn new(
        memory: &'a P,
        root: &'a R,
        vm: &'a V,
        page_size: PageSizeClass,
    ) -> Result<Self, PmemError> {
        if page_size == PageSizeClass::Size1G {
            return Err(PmemError::UnsupportedPageSize(page_size));
        }

        Ok(Self {
            walker: TableWalker::new(memory, root),
            vm,
            page_size,
        })
    }

    #[inline]
    #[must_use]
    pub const fn page_size(&self) -> PageSizeClass {
        self.page_size
    }

    #[inline]
    #[must_use]
    pub const fn walker(&self) -> &TableWalker<'a, P, R> {
        &self.walker
    }

    /// Map the page containing `target` at a fresh virtual page.
    ///
    /// `target` is aligned down to the configured page size.
    ///
    /// # Errors
    /// - [`PmemError::AddressOutOfRange`] if `target` has bits above 51 set;
    ///   nothing was changed.
    /// - [`PmemError::ResourceExhaustion`] if no page could be reserved;
    ///   nothing was changed.
    /// - [`PmemError::Walk`] if the reserved page has no present PTE (or PDE
    ///   in 2 MiB mode); the page has been released again.
    /// - [`PmemError::NotLargePage`] in 2 MiB mode if the PDE is a table
    ///   pointer; the page has been released again.
    pub fn create(&self, target: PhysicalAddress) -> Result<RogueMapping<'a, P, V>, PmemError> {
        if !target.is_addressable() {
            error!("Refusing to map {target}: no paging entry can hold its frame");
            return Err(PmemError::AddressOutOfRange(target));
        }
        let target = target.align_down(self.page_size);

        let va = self.vm.reserve_page(self.page_size).map_err(|e| {
            error!("Could not reserve a rogue page: {e}");
            PmemError::ResourceExhaustion(e)
        })?;
        let reservation = Reservation {
            vm: self.vm,
            va,
            size: self.page_size,
        };

        // SAFETY: `va` was just reserved and is not diverted yet.
        unsafe { self.vm.touch(va) };

        let (entry_address, original, diverted) = match self.page_size {
            PageSizeClass::Size4K => {
                let pte = self.walker.pte(va).inspect_err(|e| {
                    error!("Could not find the PTE for rogue page {va}: {e}");
                })?;
                let diverted: PtEntry = pte.entry.with_frame_base(target).with_global(false);
                (pte.address, pte.entry.into_bits(), diverted.into_bits())
            }
            PageSizeClass::Size2M => {
                let pde = self.walker.pde(va).inspect_err(|e| {
                    error!("Could not find the PDE for rogue page {va}: {e}");
                })?;
                if !pde.entry.is_large() {
                    error!("PDE of rogue page {va} was reserved for a 2M page but PS is clear");
                    return Err(PmemError::NotLargePage(va));
                }
                let diverted: PdEntry = pde.entry.with_frame_base(target);
                (pde.address, pde.entry.into_bits(), diverted.into_bits())
            }
            PageSizeClass::Size1G => {
                return Err(PmemError::UnsupportedPageSize(self.page_size));
            }
        };

        let memory = self.walker.memory();
        // SAFETY: `entry_address` came out of a successful walk for `va`, which
        // we own; the stale translation is dropped right after.
        unsafe {
            store_entry(memory, self.page_size, entry_address, diverted);
            self.vm.invalidate(va);
        }
        debug!("Rogue page {va} now maps {target} via entry at {entry_address}");

        let va = reservation.keep();
        Ok(RogueMapping {
            memory,
            vm: self.vm,
            va,
            target,
            entry_address,
            original,
            page_size: self.page_size,
        })
    }
}

/// Write `bits` as the entry that maps a rogue page of `size`: a PTE for
/// 4 KiB pages, a PDE for 2 MiB pages.
///
/// # Safety
/// Same as [`write_entry`].
unsafe fn store_entry<P: PhysMemory + ?Sized>(
    memory: &P,
    size: PageSizeClass,
    at: PhysicalAddress,
    bits: u64,
) {
    unsafe {
        match size {
            PageSizeClass::Size2M => write_entry::<Pd, P>(memory, at, PdEntry::from_bits(bits)),
            _ => write_entry::<Pt, P>(memory, at, PtEntry::from_bits(bits)),
        }
    }
}

/// Releases a reserved page unless kept; covers the early returns of `create`.
struct Reservation<'a, V: KernelVm + ?Sized> {
    vm: &'a V,
    va: VirtualAddress,
    size: PageSizeClass,
}

impl<V: KernelVm + ?Sized> Reservation<'_, V> {
    fn keep(mut self) -> VirtualAddress {
        core::mem::replace(&mut self.va, VirtualAddress::zero())
    }
}

impl<V: KernelVm + ?Sized> Drop for Reservation<'_, V> {
    fn drop(&mut self) {
        if self.va.is_zero() {
            return;
        }
        if let Err(e) = self.vm.release_page(self.va, self.size) {
            error!("Could not release unused rogue page {}: {e}", self.va);
        }
    }
}

/// A live diversion of one virtual page onto a physical page.
///
/// Dropping a live mapping destroys it.
pub struct RogueMapping<'a, P: PhysMemory + ?Sized, V: KernelVm + ?Sized> {
    memory: &'a P,
    vm: &'a V,
    va: VirtualAddress,
    target: PhysicalAddress,
    entry_address: PhysicalAddress,
    original: u64,
    page_size: PageSizeClass,
}

impl<P: PhysMemory + ?Sized, V: KernelVm + ?Sized> RogueMapping<'_, P, V> {
    /// The borrowed virtual page; zero once cleared.
    #[inline]
    #[must_use]
    pub const fn virtual_address(&self) -> VirtualAddress {
        self.va
    }

    /// Physical base of the mapped page.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> PhysicalAddress {
        self.target
    }

    /// Physical address of the diverted PTE or PDE.
    #[inline]
    #[must_use]
    pub const fn entry_address(&self) -> PhysicalAddress {
        self.entry_address
    }

    /// Raw entry value saved before diversion.
    #[inline]
    #[must_use]
    pub const fn original_entry(&self) -> u64 {
        self.original
    }

    #[inline]
    #[must_use]
    pub const fn page_size(&self) -> PageSizeClass {
        self.page_size
    }

    #[inline]
    #[must_use]
    pub const fn is_cleared(&self) -> bool {
        self.va.is_zero()
    }

    /// The whole mapped page; empty once cleared.
    #[allow(clippy::cast_possible_truncation)]
    pub fn window(&mut self) -> &mut [u8] {
        if self.is_cleared() {
            return &mut [];
        }
        // SAFETY: the page stays diverted to `target` until `destroy`, which
        // needs `&mut self` and so cannot run while this borrow lives.
        unsafe { self.vm.window(self.va, self.page_size.bytes() as usize) }
    }

    /// Restore the original entry, then release the page.
    ///
    /// A cleared mapping is left alone. The mapping is cleared even when the
    /// release fails: the entry is already restored, and nothing retries.
    ///
    /// # Errors
    /// [`PmemError::RestorationFailure`] if the page could not be released.
    pub fn destroy(&mut self) -> Result<(), PmemError> {
        if self.is_cleared() {
            return Ok(());
        }

        let va = self.va;
        // SAFETY: `entry_address` is the slot we diverted and `original` is
        // what it held before.
        unsafe {
            store_entry(self.memory, self.page_size, self.entry_address, self.original);
            self.vm.invalidate(va);
        }
        self.va = VirtualAddress::zero();

        self.vm.release_page(va, self.page_size).map_err(|source| {
            error!("Could not free reserved page {va}: {source}");
            PmemError::RestorationFailure { va, source }
        })
    }
}

impl<P: PhysMemory + ?Sized, V: KernelVm + ?Sized> Drop for RogueMapping<'_, P, V> {
    fn drop(&mut self) {
        if self.is_cleared() {
            return;
        }
        warn!("Rogue page {} dropped while live; restoring", self.va);
        if let Err(e) = self.destroy() {
            error!("Restoring rogue page on drop failed: {e}");
        }
    }
}

impl<P: PhysMemory + ?Sized, V: KernelVm + ?Sized> core::fmt::Debug for RogueMapping<'_, P, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RogueMapping")
            .field("va", &self.va)
            .field("target", &self.target)
            .field("entry_address", &self.entry_address)
            .field("original", &format_args!("{:#018X}", self.original))
            .field("page_size", &self.page_size)
            .finish()
    }
}
