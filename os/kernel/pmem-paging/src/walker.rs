//! # Table Walker
//!
//! Each walk step returns the entry found at its level together with the
//! physical address that entry was read from. Callers that intend to patch
//! an entry need that address; callers that only translate ignore it.
//!
//! Every step re-walks from the root. Nothing is cached between calls, so a
//! walk always observes the tables as they are right now.

use log::{debug, trace};
use pmem_addresses::{PhysicalAddress, VirtualAddress};
use pmem_registers::Cr3;

use crate::access::{PhysMemory, read_entry};
use crate::entry::PagingEntry;
use crate::level::{Pd, Pdpt, Pml4, Pt, TableIndex, TableLevel, TranslationLevel};
use crate::root::{RootTableError, RootTableSource};

/// Why a walk stopped before reaching the requested level.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum WalkError {
    #[error(transparent)]
    RootUnavailable(#[from] RootTableError),
    #[error("{level} {index} for virtual address {va} is not present")]
    NotPresent {
        level: TranslationLevel,
        index: u16,
        va: VirtualAddress,
    },
    #[error("{level} {index} for virtual address {va} maps a large page; no lower table exists")]
    UnexpectedLargePage {
        level: TranslationLevel,
        index: u16,
        va: VirtualAddress,
    },
}

/// An entry and the physical address it lives at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LocatedEntry<L: TableLevel> {
    pub entry: PagingEntry<L>,
    pub address: PhysicalAddress,
    pub index: TableIndex<L>,
}

/// Software page-table walker over physical memory `P`, rooted at `R`.
pub struct TableWalker<'a, P: ?Sized, R: ?Sized> {
    memory: &'a P,
    root: &'a R,
}

impl<P: ?Sized, R: ?Sized> Clone for TableWalker<'_, P, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: ?Sized, R: ?Sized> Copy for TableWalker<'_, P, R> {}

impl<'a, P, R> TableWalker<'a, P, R>
where
    P: PhysMemory + ?Sized,
    R: RootTableSource + ?Sized,
{
    #[inline]
    #[must_use]
    pub const fn new(memory: &'a P, root: &'a R) -> Self {
        Self { memory, root }
    }

    /// The physical memory primitives this walker reads through.
    #[inline]
    #[must_use]
    pub const fn memory(&self) -> &'a P {
        self.memory
    }

    /// PML4 entry for `va`.
    ///
    /// # Errors
    /// - [`WalkError::RootUnavailable`] if the root source fails.
    /// - [`WalkError::NotPresent`] if the PML4E is not present.
    pub fn pml4e(&self, va: VirtualAddress) -> Result<LocatedEntry<Pml4>, WalkError> {
        let cr3 = Cr3::from_bits(self.root.root_table_address()?);
        self.load(cr3.pml4_base(), va)
    }

    /// PDPT entry for `va`.
    ///
    /// # Errors
    /// As [`pml4e`](Self::pml4e), or [`WalkError::NotPresent`] at the PDPTE.
    pub fn pdpte(&self, va: VirtualAddress) -> Result<LocatedEntry<Pdpt>, WalkError> {
        let parent = self.pml4e(va)?;
        self.descend(parent, va)
    }

    /// Page directory entry for `va`.
    ///
    /// # Errors
    /// As [`pdpte`](Self::pdpte); [`WalkError::UnexpectedLargePage`] if the
    /// PDPTE maps a 1 GiB page.
    pub fn pde(&self, va: VirtualAddress) -> Result<LocatedEntry<Pd>, WalkError> {
        let parent = self.pdpte(va)?;
        self.descend(parent, va)
    }

    /// Page table entry for `va`.
    ///
    /// # Errors
    /// As [`pde`](Self::pde); [`WalkError::UnexpectedLargePage`] if the PDE
    /// maps a 2 MiB page.
    pub fn pte(&self, va: VirtualAddress) -> Result<LocatedEntry<Pt>, WalkError> {
        let parent = self.pde(va)?;
        self.descend(parent, va)
    }

    fn descend<Parent: TableLevel, Child: TableLevel>(
        &self,
        parent: LocatedEntry<Parent>,
        va: VirtualAddress,
    ) -> Result<LocatedEntry<Child>, WalkError> {
        if parent.entry.is_large() {
            debug!(
                "{} for vaddr {va} maps a large page, cannot descend to {}",
                Parent::LEVEL,
                Child::LEVEL
            );
            return Err(WalkError::UnexpectedLargePage {
                level: Parent::LEVEL,
                index: parent.index.as_u16(),
                va,
            });
        }

        self.load(parent.entry.frame_base(), va)
    }

    fn load<L: TableLevel>(
        &self,
        table: PhysicalAddress,
        va: VirtualAddress,
    ) -> Result<LocatedEntry<L>, WalkError> {
        let index = TableIndex::<L>::of(va);
        let address = table + index.entry_offset();
        trace!("{} for vaddr {va} is at physical address {address}", L::LEVEL);

        // SAFETY: `table` is the PML4 named by CR3 or the frame of a present
        // non-leaf entry, and `address` is an aligned slot inside it.
        let entry: PagingEntry<L> = unsafe { read_entry(self.memory, address) };
        if !entry.present() {
            debug!("{} {} for vaddr {va} is not present", L::LEVEL, index.as_u16());
            return Err(WalkError::NotPresent {
                level: L::LEVEL,
                index: index.as_u16(),
                va,
            });
        }

        Ok(LocatedEntry {
            entry,
            address,
            index,
        })
    }
}
