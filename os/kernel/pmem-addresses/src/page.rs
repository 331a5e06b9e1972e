use crate::{PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Physical page base for size `S`.
///
/// The low `S::SHIFT` bits of the base are always zero. The *frame number*
/// is the base shifted right by `S::SHIFT`, which is what paging entries
/// store in their address field.
///
/// ```rust
/// # use pmem_addresses::*;
/// let pp = PhysicalAddress::new(0x0000_0008_1234_5678).page::<Size2M>();
/// assert_eq!(pp.base().as_u64(), 0x0000_0008_1220_0000);
/// assert_eq!(pp.frame_number(), 0x0000_0008_1220_0000 >> 21);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

/// The offset within a page of size `S` (`0..S::SIZE`).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageOffset<S: PageSize> {
    value: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// Page containing `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn from_addr(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.as_u64() & !(S::SIZE - 1),
            _size: PhantomData,
        }
    }

    /// Page with the given frame number.
    #[inline]
    #[must_use]
    pub const fn from_frame_number(frame: u64) -> Self {
        Self {
            base: frame << S::SHIFT,
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    #[inline]
    #[must_use]
    pub const fn frame_number(self) -> u64 {
        self.base >> S::SHIFT
    }

    /// Combine with an offset to form a full address.
    #[inline]
    #[must_use]
    pub const fn join(self, off: PageOffset<S>) -> PhysicalAddress {
        PhysicalAddress::new(self.base + off.as_u64())
    }
}

impl<S: PageSize> PageOffset<S> {
    /// Take the low `S::SHIFT` bits of a raw address.
    #[inline]
    #[must_use]
    pub const fn from_addr_bits(addr: u64) -> Self {
        Self {
            value: addr & (S::SIZE - 1),
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.value
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{:?}>({:#018X})", S::CLASS, self.base)
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}/{}", self.base, S::CLASS)
    }
}

impl<S: PageSize> fmt::Debug for PageOffset<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset<{:?}>({:#X})", S::CLASS, self.value)
    }
}

impl<S: PageSize> From<PhysicalPage<S>> for PhysicalAddress {
    fn from(value: PhysicalPage<S>) -> Self {
        value.base()
    }
}
