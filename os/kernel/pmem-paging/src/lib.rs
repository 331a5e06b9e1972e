//! # Software Page-Table Walker
//!
//! A reimplementation of the x86-64 4-level address translation in software,
//! reading paging structures straight out of physical memory. It does not rely
//! on the page tables themselves being mapped anywhere: every entry is loaded
//! through the [`PhysMemory`] primitives by physical address.
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of page tables,
//! each level containing 512 (2⁹) entries of 8 bytes each.
//!
//! ```text
//!  CR3 → PML4 → PDPT → PD → PT → Physical Page
//!          │      │      │     │
//!          │      │      │     └──► PTE   → maps 4 KiB page
//!          │      │      └────────► PDE   → PS=1 → 2 MiB page
//!          │      └───────────────► PDPTE → PS=1 → 1 GiB page
//!          └──────────────────────► PML4E
//! ```
//!
//! | Level | Table | Entry | Marker |
//! |:------|:------|:------|:-------|
//! | 4 | Page Map Level 4 | PML4E | [`Pml4`] |
//! | 3 | Page Directory Pointer Table | PDPTE | [`Pdpt`] |
//! | 2 | Page Directory | PDE | [`Pd`] |
//! | 1 | Page Table | PTE | [`Pt`] |
//!
//! ## What you get
//! - [`PagingEntry<L>`]: one entry type for all levels, tagged by a level
//!   marker that selects the decode/encode rules.
//! - [`TableWalker`]: the four chained walk steps
//!   ([`pml4e`](TableWalker::pml4e), [`pdpte`](TableWalker::pdpte),
//!   [`pde`](TableWalker::pde), [`pte`](TableWalker::pte)), each yielding the
//!   entry *and its physical address*.
//! - [`TableWalker::resolve`]: virtual-to-physical translation with a 2 MiB
//!   fallback.
//!
//! Nothing here caches translations: the root table address is fetched from
//! the [`RootTableSource`] on every walk.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod access;
mod entry;
mod level;
mod resolve;
mod root;
mod walker;

#[cfg(test)]
mod test_support;

pub use crate::access::{ENTRY_SIZE, PhysMemory, read_entry, write_entry};
pub use crate::entry::{
    EntryKind, HugePageBits, LargePageBits, PagingEntry, PdEntry, PdptEntry, Pml4Entry, PtEntry,
    TableEntryBits,
};
pub use crate::level::{
    Pd, Pdpt, Pml4, Pt, TableIndex, TableLevel, TranslationLevel, VirtualAddressParts,
};
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
pub use crate::root::CurrentCr3;
pub use crate::root::{RootTableError, RootTableSource};
pub use crate::walker::{LocatedEntry, TableWalker, WalkError};

pub use pmem_addresses as addresses;
