//! # Physical and Virtual Address Types
//!
//! Strongly typed wrappers for the raw 64-bit addresses handled by the
//! rogue-page machinery. A paging walk juggles three kinds of numbers at once:
//! virtual addresses being translated, physical addresses of paging entries,
//! and physical frame bases found inside those entries. Mixing them up is the
//! classic way to scribble over the wrong page table, so each gets its own type.
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`VirtualAddress`] | An address in the current (translated) address space. |
//! | [`PhysicalAddress`] | A machine bus address (RAM, MMIO, paging structures). |
//! | [`PhysicalPage<S>`] | A page-aligned physical base of a page of size `S`. |
//! | [`PageOffset<S>`] | The byte offset within a page of size `S`. |
//!
//! ## Page Sizes
//!
//! Compile-time page sizes are marker types implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages, mapped by a PTE
//! - [`Size2M`]: 2 MiB pages, mapped by a PDE with `PS=1`
//! - [`Size1G`]: 1 GiB pages, mapped by a PDPTE with `PS=1`
//!
//! Code that picks its page size at runtime (the rogue mapper does, once, at
//! construction) uses [`PageSizeClass`] instead.
//!
//! ```rust
//! # use pmem_addresses::*;
//! let pa = PhysicalAddress::new(0x0000_0010_2000_0042);
//! let (page, off) = pa.split::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x0000_0010_2000_0000);
//! assert_eq!(off.as_u64(), 0x42);
//! assert_eq!(page.join(off), pa);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod address;
mod page;

pub use crate::address::{PHYSICAL_ADDRESS_BITS, PhysicalAddress, VirtualAddress};
pub use crate::page::{PageOffset, PhysicalPage};

use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page sizes.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;
    /// Runtime counterpart of this marker.
    const CLASS: PageSizeClass;
}

/// 4 KiB page (4096 bytes).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl PageSize for Size4K {
    const SIZE: u64 = 4096;
    const SHIFT: u32 = 12;
    const CLASS: PageSizeClass = PageSizeClass::Size4K;
}

/// 2 MiB page (`2_097_152` bytes).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size2M;
impl sealed::Sealed for Size2M {}
impl PageSize for Size2M {
    const SIZE: u64 = 2 * 1024 * 1024;
    const SHIFT: u32 = 21;
    const CLASS: PageSizeClass = PageSizeClass::Size2M;
}

/// 1 GiB page (`1_073_741_824` bytes).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size1G;
impl sealed::Sealed for Size1G {}
impl PageSize for Size1G {
    const SIZE: u64 = 1024 * 1024 * 1024;
    const SHIFT: u32 = 30;
    const CLASS: PageSizeClass = PageSizeClass::Size1G;
}

/// Page size chosen at runtime.
///
/// The rogue mapper only ever reserves [`Size4K`](PageSizeClass::Size4K) or
/// [`Size2M`](PageSizeClass::Size2M) pages; [`Size1G`](PageSizeClass::Size1G)
/// exists so that decoded paging entries can report what they map.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PageSizeClass {
    /// 4 KiB page backed by a PTE.
    #[default]
    Size4K,
    /// 2 MiB page backed by a PDE with `PS=1`.
    Size2M,
    /// 1 GiB page backed by a PDPTE with `PS=1`.
    Size1G,
}

impl PageSizeClass {
    /// Page size in bytes.
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Size4K => Size4K::SIZE,
            Self::Size2M => Size2M::SIZE,
            Self::Size1G => Size1G::SIZE,
        }
    }

    /// Number of low address bits covered by a page of this size.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Size4K => Size4K::SHIFT,
            Self::Size2M => Size2M::SHIFT,
            Self::Size1G => Size1G::SHIFT,
        }
    }

    /// Mask selecting the in-page offset bits.
    #[inline]
    #[must_use]
    pub const fn offset_mask(self) -> u64 {
        self.bytes() - 1
    }
}

impl fmt::Display for PageSizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Size4K => "4K",
            Self::Size2M => "2M",
            Self::Size1G => "1G",
        })
    }
}

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use pmem_addresses::align_down;
/// assert_eq!(align_down(0x1fff, 4096), 0x1000);
/// assert_eq!(align_down(0x2000, 4096), 0x2000);
/// assert_eq!(align_down(0x0034_5678, 0x20_0000), 0x0020_0000);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    debug_assert!(a.is_power_of_two());
    x & !(a - 1)
}
