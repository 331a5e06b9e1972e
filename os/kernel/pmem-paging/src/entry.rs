//! # Paging Entries
//!
//! An x86-64 paging entry is 64 bits wide at every level, but the meaning of
//! the address field depends on the level and on the `PS` (page size) bit:
//!
//! | Level | `PS=0` | `PS=1` |
//! |:------|:-------|:-------|
//! | PML4E | next table, bits 51:12 | reserved |
//! | PDPTE | next table, bits 51:12 | 1 GiB page, bits 51:30 |
//! | PDE   | next table, bits 51:12 | 2 MiB page, bits 51:21 |
//! | PTE   | 4 KiB page, bits 51:12 | (bit 7 is PAT) |
//!
//! [`PagingEntry<L>`] stores the raw bits and picks the right layout view
//! ([`TableEntryBits`], [`LargePageBits`], [`HugePageBits`]) from its level
//! marker. Rewriting the frame of an entry only ever touches the address
//! field of the active layout; every flag and software-available bit is
//! carried over unchanged.

use bitfield_struct::bitfield;
use core::fmt;
use core::marker::PhantomData;
use pmem_addresses::{PageSizeClass, PhysicalAddress, PhysicalPage, Size1G, Size2M, Size4K};

use crate::level::{Pd, Pdpt, Pml4, Pt, TableLevel, TranslationLevel};

/// Layout of a non-leaf entry at any level, and of a 4 KiB PTE.
#[bitfield(u64)]
pub struct TableEntryBits {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2).
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// Dirty (bit 6); leaf only.
    pub dirty: bool,
    /// Page Size (bit 7) in PDPTEs and PDEs, PAT in PTEs.
    pub page_size: bool,
    /// Global (bit 8); leaf only.
    pub global: bool,
    /// OS-available low (bits 9..11).
    #[bits(3)]
    pub os_available_low: u8,
    /// Physical address bits 51:12.
    #[bits(40)]
    pub frame: u64,
    /// OS-available high (bits 52..58).
    #[bits(7)]
    pub os_available_high: u8,
    /// Protection Key (bits 59..62).
    #[bits(4)]
    pub protection_key: u8,
    /// No-Execute (bit 63).
    pub no_execute: bool,
}

/// Layout of a 2 MiB leaf PDE (`PS=1`).
#[bitfield(u64)]
pub struct LargePageBits {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    /// Page Size (bit 7), always set in this form.
    pub page_size: bool,
    pub global: bool,
    #[bits(3)]
    pub os_available_low: u8,
    /// PAT selector (bit 12).
    pub pat: bool,
    /// Reserved (bits 13..20).
    #[bits(8)]
    __reserved: u8,
    /// Physical address bits 51:21.
    #[bits(31)]
    pub frame: u32,
    #[bits(7)]
    pub os_available_high: u8,
    #[bits(4)]
    pub protection_key: u8,
    pub no_execute: bool,
}

/// Layout of a 1 GiB leaf PDPTE (`PS=1`).
#[bitfield(u64)]
pub struct HugePageBits {
    pub present: bool,
    pub writable: bool,
    pub user: bool,
    pub write_through: bool,
    pub cache_disable: bool,
    pub accessed: bool,
    pub dirty: bool,
    pub page_size: bool,
    pub global: bool,
    #[bits(3)]
    pub os_available_low: u8,
    pub pat: bool,
    /// Reserved (bits 13..29).
    #[bits(17)]
    __reserved: u32,
    /// Physical address bits 51:30.
    #[bits(22)]
    pub frame: u32,
    #[bits(7)]
    pub os_available_high: u8,
    #[bits(4)]
    pub protection_key: u8,
    pub no_execute: bool,
}

const FRAME_MASK_4K: u64 = (1 << 40) - 1;
const FRAME_MASK_2M: u64 = (1 << 31) - 1;
const FRAME_MASK_1G: u64 = (1 << 22) - 1;

/// Decoded role of a present entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    /// Points at the next-level table.
    NextTable(PhysicalPage<Size4K>),
    /// PTE mapping a 4 KiB page.
    Page4K(PhysicalPage<Size4K>),
    /// PDE with `PS=1` mapping a 2 MiB page.
    Page2M(PhysicalPage<Size2M>),
    /// PDPTE with `PS=1` mapping a 1 GiB page.
    Page1G(PhysicalPage<Size1G>),
}

/// A raw paging entry belonging to a table of level `L`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PagingEntry<L: TableLevel> {
    bits: u64,
    _level: PhantomData<L>,
}

pub type Pml4Entry = PagingEntry<Pml4>;
pub type PdptEntry = PagingEntry<Pdpt>;
pub type PdEntry = PagingEntry<Pd>;
pub type PtEntry = PagingEntry<Pt>;

impl<L: TableLevel> PagingEntry<L> {
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            bits,
            _level: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u64 {
        self.bits
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::from_bits(0)
    }

    /// Present, writable entry pointing at the next-level table `next`.
    #[inline]
    #[must_use]
    pub const fn new_table(next: PhysicalPage<Size4K>) -> Self {
        debug_assert!(!matches!(L::LEVEL, TranslationLevel::Pt));
        Self::from_bits(
            TableEntryBits::new()
                .with_present(true)
                .with_writable(true)
                .with_frame(next.frame_number() & FRAME_MASK_4K)
                .into_bits(),
        )
    }

    /// Present, writable leaf mapping the page at `base`.
    ///
    /// Sets `PS=1` at the PDPT and PD levels.
    #[inline]
    #[must_use]
    pub const fn new_leaf(base: PhysicalAddress) -> Self {
        debug_assert!(!matches!(L::LEVEL, TranslationLevel::Pml4));
        Self::from_bits(
            TableEntryBits::new()
                .with_present(true)
                .with_writable(true)
                .with_page_size(L::LEVEL.may_map_large())
                .into_bits(),
        )
        .with_frame_base(base)
    }

    /// View through the common layout; flag bits 0..=8 are valid in every form.
    #[inline]
    #[must_use]
    pub const fn table_bits(self) -> TableEntryBits {
        TableEntryBits::from_bits(self.bits)
    }

    #[inline]
    #[must_use]
    pub const fn present(self) -> bool {
        self.table_bits().present()
    }

    #[inline]
    #[must_use]
    pub const fn global(self) -> bool {
        self.table_bits().global()
    }

    /// `PS=1` at a level where that makes the entry a leaf.
    #[inline]
    #[must_use]
    pub const fn is_large(self) -> bool {
        L::LEVEL.may_map_large() && self.table_bits().page_size()
    }

    /// Size of the page this entry maps, if it is a leaf.
    #[inline]
    #[must_use]
    pub const fn leaf_size(self) -> Option<PageSizeClass> {
        match (L::LEVEL, self.is_large()) {
            (TranslationLevel::Pt, _) => Some(PageSizeClass::Size4K),
            (TranslationLevel::Pd, true) => Some(PageSizeClass::Size2M),
            (TranslationLevel::Pdpt, true) => Some(PageSizeClass::Size1G),
            _ => None,
        }
    }

    /// Number of low address bits not covered by the frame field.
    #[inline]
    const fn frame_shift(self) -> u32 {
        match self.leaf_size() {
            Some(size) => size.shift(),
            None => 12,
        }
    }

    /// Frame number in units of the page size this entry's form addresses.
    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> u64 {
        match self.leaf_size() {
            Some(PageSizeClass::Size2M) => LargePageBits::from_bits(self.bits).frame() as u64,
            Some(PageSizeClass::Size1G) => HugePageBits::from_bits(self.bits).frame() as u64,
            _ => self.table_bits().frame(),
        }
    }

    /// Physical base address stored in the entry.
    #[inline]
    #[must_use]
    pub const fn frame_base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.frame_number() << self.frame_shift())
    }

    /// Replace the address field of the active layout, keeping every other bit.
    ///
    /// `base` is truncated to the alignment of the layout.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_frame_base(self, base: PhysicalAddress) -> Self {
        let frame = base.as_u64() >> self.frame_shift();
        let bits = match self.leaf_size() {
            Some(PageSizeClass::Size2M) => LargePageBits::from_bits(self.bits)
                .with_frame((frame & FRAME_MASK_2M) as u32)
                .into_bits(),
            Some(PageSizeClass::Size1G) => HugePageBits::from_bits(self.bits)
                .with_frame((frame & FRAME_MASK_1G) as u32)
                .into_bits(),
            _ => self
                .table_bits()
                .with_frame(frame & FRAME_MASK_4K)
                .into_bits(),
        };
        Self::from_bits(bits)
    }

    #[inline]
    #[must_use]
    pub const fn with_global(self, global: bool) -> Self {
        Self::from_bits(self.table_bits().with_global(global).into_bits())
    }

    /// Decode a present entry; `None` if not present.
    #[must_use]
    pub const fn kind(self) -> Option<EntryKind> {
        if !self.present() {
            return None;
        }

        let base = self.frame_base();
        Some(match self.leaf_size() {
            Some(PageSizeClass::Size4K) => EntryKind::Page4K(PhysicalPage::from_addr(base)),
            Some(PageSizeClass::Size2M) => EntryKind::Page2M(PhysicalPage::from_addr(base)),
            Some(PageSizeClass::Size1G) => EntryKind::Page1G(PhysicalPage::from_addr(base)),
            None => EntryKind::NextTable(PhysicalPage::from_addr(base)),
        })
    }

    /// Next-level table, if this is a present non-leaf entry.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage<Size4K>> {
        match self.kind() {
            Some(EntryKind::NextTable(page)) => Some(page),
            _ => None,
        }
    }
}

impl<L: TableLevel> Default for PagingEntry<L> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<L: TableLevel> fmt::Debug for PagingEntry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(L::LEVEL.entry_name())
            .field("bits", &format_args!("{:#018X}", self.bits))
            .field("present", &self.present())
            .field("large", &self.is_large())
            .field("global", &self.global())
            .field("frame", &self.frame_base())
            .finish()
    }
}
