//! # Physical Memory Primitives
//!
//! The walker never dereferences a paging structure through a virtual
//! mapping. Every entry is fetched and stored by physical address through a
//! [`PhysMemory`] implementation supplied by the host kernel.

use pmem_addresses::PhysicalAddress;

use crate::entry::PagingEntry;
use crate::level::TableLevel;

/// Size of one paging entry in bytes.
pub const ENTRY_SIZE: u64 = 8;

/// Aligned 64-bit loads and stores at physical addresses.
///
/// Implementations perform each access as a single 8-byte operation on the
/// exact physical address given, without caching values between calls.
pub trait PhysMemory {
    /// Load the 8 bytes at `pa`.
    ///
    /// # Safety
    /// `pa` must be 8-byte aligned and name backed physical memory.
    unsafe fn read_u64(&self, pa: PhysicalAddress) -> u64;

    /// Store `value` at `pa`.
    ///
    /// # Safety
    /// `pa` must be 8-byte aligned, and the caller must own the consequences
    /// of rewriting whatever lives there.
    unsafe fn write_u64(&self, pa: PhysicalAddress, value: u64);
}

impl<T: PhysMemory + ?Sized> PhysMemory for &T {
    #[inline]
    unsafe fn read_u64(&self, pa: PhysicalAddress) -> u64 {
        unsafe { (**self).read_u64(pa) }
    }

    #[inline]
    unsafe fn write_u64(&self, pa: PhysicalAddress, value: u64) {
        unsafe { (**self).write_u64(pa, value) }
    }
}

/// Load a paging entry of level `L` from `pa`.
///
/// # Safety
/// See [`PhysMemory::read_u64`]; `pa` should lie within a table of level `L`.
#[inline]
pub unsafe fn read_entry<L: TableLevel, P: PhysMemory + ?Sized>(
    memory: &P,
    pa: PhysicalAddress,
) -> PagingEntry<L> {
    debug_assert!(pa.as_u64() % ENTRY_SIZE == 0);
    PagingEntry::from_bits(unsafe { memory.read_u64(pa) })
}

/// Store a paging entry of level `L` at `pa`.
///
/// # Safety
/// See [`PhysMemory::write_u64`]. Rewriting a live entry requires the caller
/// to invalidate any cached translation derived from it.
#[inline]
pub unsafe fn write_entry<L: TableLevel, P: PhysMemory + ?Sized>(
    memory: &P,
    pa: PhysicalAddress,
    entry: PagingEntry<L>,
) {
    debug_assert!(pa.as_u64() % ENTRY_SIZE == 0);
    unsafe { memory.write_u64(pa, entry.into_bits()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestMachine;
    use crate::{Pd, PdEntry, Pt, PtEntry};

    #[test]
    fn entries_are_stored_and_loaded_verbatim() {
        let m = TestMachine::new();
        let at = PhysicalAddress::new(0x0020_0018);
        let pte = PtEntry::new_leaf(PhysicalAddress::new(0x0000_0AB0_0000_5000)).with_global(true);

        unsafe { write_entry::<Pt, _>(&m, at, pte) };
        assert_eq!(m.read(at), pte.into_bits());
        assert_eq!(unsafe { read_entry::<Pt, _>(&m, at) }, pte);

        // the level only changes how bits are read back, not what is stored
        let pde: PdEntry = unsafe { read_entry::<Pd, _>(&m, at) };
        assert_eq!(pde.into_bits(), pte.into_bits());
    }
}
