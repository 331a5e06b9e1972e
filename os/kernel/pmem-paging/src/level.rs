//! # Paging Levels and Table Indices
//!
//! - [`TranslationLevel`]: runtime tag naming a paging level (used in errors
//!   and log output).
//! - [`Pml4`], [`Pdpt`], [`Pd`], [`Pt`]: compile-time level markers.
//! - [`TableIndex<L>`]: a 9-bit index into a table of level `L`.
//! - [`VirtualAddressParts`]: a virtual address split into its four indices
//!   and the 4 KiB page offset.

use core::fmt;
use core::hash::Hash;
use core::marker::PhantomData;
use pmem_addresses::{PageOffset, Size4K, VirtualAddress};

use crate::ENTRY_SIZE;

/// A paging level, named after the entries it holds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TranslationLevel {
    /// Level 4: Page Map Level 4.
    Pml4,
    /// Level 3: Page Directory Pointer Table.
    Pdpt,
    /// Level 2: Page Directory.
    Pd,
    /// Level 1: Page Table.
    Pt,
}

impl TranslationLevel {
    /// Bit position of the lowest virtual-address bit indexing this level.
    #[inline]
    #[must_use]
    pub const fn index_shift(self) -> u32 {
        match self {
            Self::Pml4 => 39,
            Self::Pdpt => 30,
            Self::Pd => 21,
            Self::Pt => 12,
        }
    }

    /// Whether an entry at this level may map a page directly via `PS=1`.
    #[inline]
    #[must_use]
    pub const fn may_map_large(self) -> bool {
        matches!(self, Self::Pdpt | Self::Pd)
    }

    /// Entry name as printed by the walk diagnostics.
    #[inline]
    #[must_use]
    pub const fn entry_name(self) -> &'static str {
        match self {
            Self::Pml4 => "PML4E",
            Self::Pdpt => "PDPTE",
            Self::Pd => "PDE",
            Self::Pt => "PTE",
        }
    }
}

impl fmt::Display for TranslationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_name())
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Compile-time paging level marker.
pub trait TableLevel:
    sealed::Sealed + Copy + Clone + Eq + PartialEq + Hash + fmt::Debug + 'static
{
    /// Runtime tag for this level.
    const LEVEL: TranslationLevel;
}

macro_rules! level_marker {
    ($(#[$meta:meta])* $name:ident => $level:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub struct $name;
        impl sealed::Sealed for $name {}
        impl TableLevel for $name {
            const LEVEL: TranslationLevel = TranslationLevel::$level;
        }
    };
}

level_marker!(
    /// PML4 (L4) marker.
    Pml4 => Pml4
);
level_marker!(
    /// PDPT (L3) marker.
    Pdpt => Pdpt
);
level_marker!(
    /// Page Directory (L2) marker.
    Pd => Pd
);
level_marker!(
    /// Page Table (L1) marker.
    Pt => Pt
);

/// Index into a 512-entry table of level `L` (`0..512`).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex<L: TableLevel> {
    value: u16,
    _level: PhantomData<L>,
}

impl<L: TableLevel> TableIndex<L> {
    /// Extract the index for level `L` from a virtual address.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn of(va: VirtualAddress) -> Self {
        Self::new(((va.as_u64() >> L::LEVEL.index_shift()) & 0x1FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 512);
        Self {
            value: v,
            _level: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.value
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.value as usize
    }

    /// Byte offset of the indexed entry from the table base.
    #[inline]
    #[must_use]
    pub const fn entry_offset(self) -> u64 {
        self.value as u64 * ENTRY_SIZE
    }
}

impl<L: TableLevel> fmt::Debug for TableIndex<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", L::LEVEL, self.value)
    }
}

/// A virtual address decomposed for the 4-level walk.
///
/// ```rust
/// # use pmem_paging::VirtualAddressParts;
/// # use pmem_paging::addresses::VirtualAddress;
/// let va = VirtualAddress::new(0xFFFF_8000_1234_5678);
/// let parts = VirtualAddressParts::of(va);
/// assert_eq!(parts.pml4.as_u16(), 256);
/// assert_eq!(parts.offset.as_u64(), 0x678);
/// assert_eq!(parts.compose(), va);
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VirtualAddressParts {
    pub pml4: TableIndex<Pml4>,
    pub pdpt: TableIndex<Pdpt>,
    pub pd: TableIndex<Pd>,
    pub pt: TableIndex<Pt>,
    pub offset: PageOffset<Size4K>,
}

impl VirtualAddressParts {
    #[inline]
    #[must_use]
    pub const fn of(va: VirtualAddress) -> Self {
        Self {
            pml4: TableIndex::of(va),
            pdpt: TableIndex::of(va),
            pd: TableIndex::of(va),
            pt: TableIndex::of(va),
            offset: va.offset::<Size4K>(),
        }
    }

    /// Reassemble the canonical virtual address (bit 47 sign-extended).
    #[inline]
    #[must_use]
    pub const fn compose(self) -> VirtualAddress {
        let raw = ((self.pml4.value as u64) << Pml4::LEVEL.index_shift())
            | ((self.pdpt.value as u64) << Pdpt::LEVEL.index_shift())
            | ((self.pd.value as u64) << Pd::LEVEL.index_shift())
            | ((self.pt.value as u64) << Pt::LEVEL.index_shift())
            | self.offset.as_u64();
        VirtualAddress::new(raw).canonical()
    }
}
