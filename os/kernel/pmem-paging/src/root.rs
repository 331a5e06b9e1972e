//! # Root Table Source
//!
//! The PML4 base is taken from a CR3 value on every walk. Where that value
//! comes from is the host's business: a fixed value captured at load time
//! (the kernel's own CR3 as published by a metadata provider), or the live
//! register of the executing CPU.

use pmem_registers::Cr3;

/// Failure to obtain the root table address.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RootTableError {
    #[error("root page table address is unavailable")]
    Unavailable,
}

/// Supplies the raw CR3 value whose bits 51:12 locate the PML4.
pub trait RootTableSource {
    /// Raw CR3 value.
    ///
    /// # Errors
    /// [`RootTableError::Unavailable`] if no value can be supplied.
    fn root_table_address(&self) -> Result<u64, RootTableError>;
}

impl<T: RootTableSource + ?Sized> RootTableSource for &T {
    #[inline]
    fn root_table_address(&self) -> Result<u64, RootTableError> {
        (**self).root_table_address()
    }
}

impl RootTableSource for Cr3 {
    #[inline]
    fn root_table_address(&self) -> Result<u64, RootTableError> {
        Ok(self.into_bits())
    }
}

/// Reads CR3 of the executing CPU on every request.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[derive(Debug)]
pub struct CurrentCr3 {
    _private: (),
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl CurrentCr3 {
    /// # Safety
    /// Every call to [`root_table_address`](RootTableSource::root_table_address)
    /// must happen at CPL0.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl RootTableSource for CurrentCr3 {
    fn root_table_address(&self) -> Result<u64, RootTableError> {
        use pmem_registers::LoadRegisterUnsafe;
        // SAFETY: upheld by the contract of `CurrentCr3::new`.
        let cr3 = unsafe { Cr3::load_unsafe() };
        Ok(cr3.into_bits())
    }
}
